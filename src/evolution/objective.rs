use crate::constraints::{ConstraintSet, PenaltyMultipliers};
use crate::portfolio::{Portfolio, PortfolioError};

/// Fitness used by the genetic search, to be minimized:
/// `-sharpe(w) + penalty(w)`.
///
/// Two Sharpe values are mapped before the penalty is applied, and the mapping
/// is part of the ranking contract:
/// - `+inf` (riskless with positive excess return) becomes `-inf`, the best rank there is.
/// - `NaN` becomes `f64::MAX`, so it always ranks last and never poisons a comparison.
#[derive(Debug, Clone)]
pub struct PenalizedSharpe<'a> {
    portfolio: &'a Portfolio,
    constraints: ConstraintSet,
    multipliers: PenaltyMultipliers,
    risk_free_rate: f64,
}

impl<'a> PenalizedSharpe<'a> {
    pub fn new(
        portfolio: &'a Portfolio,
        constraints: ConstraintSet,
        multipliers: PenaltyMultipliers,
        risk_free_rate: f64,
    ) -> Self {
        PenalizedSharpe {
            portfolio,
            constraints,
            multipliers,
            risk_free_rate,
        }
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn compute(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        let sharpe = self.portfolio.sharpe_ratio(weights, self.risk_free_rate)?;
        let penalty = self
            .constraints
            .penalty(weights, self.portfolio.means(), &self.multipliers);
        Ok(rank_fitness(sharpe, penalty))
    }
}

pub fn rank_fitness(sharpe: f64, penalty: f64) -> f64 {
    if sharpe == f64::INFINITY {
        return f64::NEG_INFINITY;
    }
    if sharpe.is_nan() {
        return f64::MAX;
    }
    -sharpe + penalty
}
