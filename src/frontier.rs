use itertools::izip;
use rand::rngs::OsRng;
use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constraints::PenaltyMultipliers;
use crate::consts::TRADING_DAYS_PER_YEAR;
use crate::evolution::portfolio_evolution::{EvolutionError, GeneticConfig, GeneticOptimiser};
use crate::portfolio::{Portfolio, PortfolioPerformance};

fn default_points() -> usize {
    20
}

fn default_max_annual_return() -> f64 {
    0.005 * TRADING_DAYS_PER_YEAR
}

fn default_periods_per_year() -> f64 {
    TRADING_DAYS_PER_YEAR
}

fn default_multipliers() -> PenaltyMultipliers {
    PenaltyMultipliers::frontier_sweep()
}

/// Sweep of target returns traced out by independent optimiser runs.
///
/// Targets are annual figures; each is divided by `periods_per_year` before it
/// reaches the optimiser. `base` supplies everything else; its target, seed and
/// penalty multipliers are overwritten per point by [`FrontierConfig::point_config`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FrontierConfig {
    #[serde(default = "default_points")]
    pub points: usize,
    #[serde(default)]
    pub min_annual_return: f64,
    #[serde(default = "default_max_annual_return")]
    pub max_annual_return: f64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Penalty scaling for every point. Kept out of `base` so a partial `base`
    /// never falls back to the single-run defaults.
    #[serde(default = "default_multipliers")]
    pub multipliers: PenaltyMultipliers,
    #[serde(default)]
    pub base: GeneticConfig,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        FrontierConfig {
            points: default_points(),
            min_annual_return: 0.0,
            max_annual_return: default_max_annual_return(),
            periods_per_year: default_periods_per_year(),
            multipliers: default_multipliers(),
            base: GeneticConfig::default(),
        }
    }
}

impl FrontierConfig {
    /// Per-period target of every point. The first point is left unconstrained.
    pub fn targets(&self) -> Vec<Option<f64>> {
        let step = if self.points > 1 {
            (self.max_annual_return - self.min_annual_return) / (self.points - 1) as f64
        } else {
            0.0
        };
        (0..self.points)
            .map(|i| {
                if i == 0 {
                    None
                } else {
                    Some((self.min_annual_return + i as f64 * step) / self.periods_per_year)
                }
            })
            .collect()
    }

    /// Optimiser settings for one point of the sweep.
    pub fn point_config(&self, target_return: Option<f64>, seed: u64) -> GeneticConfig {
        GeneticConfig {
            target_return,
            seed: Some(seed),
            ..self.base.clone()
        }
        .with_multipliers(self.multipliers)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrontierPoint {
    /// Per-period target, `None` for the unconstrained run.
    pub target_return: Option<f64>,
    pub weights: Vec<f64>,
    pub annualized: PortfolioPerformance,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EfficientFrontier {
    /// Ordered by ascending annualized risk.
    pub points: Vec<FrontierPoint>,
    /// Point with the highest annualized Sharpe ratio.
    pub best_sharpe: Option<FrontierPoint>,
}

impl EfficientFrontier {
    /// `(risk, return)` pairs in frontier order.
    pub fn risk_return_pairs(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.annualized.risk, p.annualized.expected_return))
            .collect()
    }
}

/// Runs one optimiser per target in parallel.
///
/// Point `i` is seeded with `base_seed + i`, where the base seed comes from the
/// base config or, failing that, the OS. A seeded sweep is therefore reproducible
/// regardless of how rayon schedules the points.
pub fn compute_efficient_frontier(
    portfolio: &Portfolio,
    config: &FrontierConfig,
) -> Result<EfficientFrontier, EvolutionError> {
    if config.points == 0 {
        return Err(EvolutionError::BadPopulationParameter(
            "Frontier needs at least one point".into(),
        ));
    }
    if !(config.periods_per_year > 0.0) {
        return Err(EvolutionError::BadPopulationParameter(format!(
            "Periods per year must be positive, got {}",
            config.periods_per_year
        )));
    }

    let base_seed = config.base.seed.unwrap_or_else(|| OsRng.next_u64());
    let targets = config.targets();
    let seeds: Vec<u64> = (0..targets.len() as u64)
        .map(|i| base_seed.wrapping_add(i))
        .collect();

    info!(
        "Computing efficient frontier over {} targets from seed {}",
        targets.len(),
        base_seed
    );

    let weights = izip!(&targets, &seeds)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(&target_return, &seed)| {
            GeneticOptimiser::new(portfolio, config.point_config(target_return, seed))?.optimise()
        })
        .collect::<Result<Vec<Vec<f64>>, EvolutionError>>()?;

    let risk_free_rate = config.base.risk_free_rate;
    let mut points = izip!(targets, weights)
        .map(|(target_return, weights)| -> Result<FrontierPoint, EvolutionError> {
            let annualized = portfolio
                .performance(&weights, risk_free_rate)?
                .annualized(config.periods_per_year);
            Ok(FrontierPoint {
                target_return,
                weights,
                annualized,
            })
        })
        .collect::<Result<Vec<FrontierPoint>, EvolutionError>>()?;

    // first strictly greater Sharpe wins, in target order
    let mut best_sharpe: Option<&FrontierPoint> = None;
    for point in points.iter() {
        if best_sharpe.map_or(true, |best| {
            point.annualized.sharpe_ratio > best.annualized.sharpe_ratio
        }) {
            best_sharpe = Some(point);
        }
    }
    let best_sharpe = best_sharpe.cloned();

    points.sort_by(|a, b| {
        a.annualized
            .risk
            .total_cmp(&b.annualized.risk)
            .then(a.annualized.expected_return.total_cmp(&b.annualized.expected_return))
    });

    if let Some(best) = &best_sharpe {
        info!(
            "Best annualized Sharpe ratio {:.4} at risk {:.4}, return {:.4}",
            best.annualized.sharpe_ratio, best.annualized.risk, best.annualized.expected_return
        );
    }

    Ok(EfficientFrontier {
        points,
        best_sharpe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use pretty_assertions::assert_eq;

    fn scenario_portfolio() -> Portfolio {
        Portfolio::new(
            Matrix::from_rows(vec![
                vec![0.01, 0.02, -0.01],
                vec![0.02, 0.01, 0.00],
                vec![-0.01, 0.03, 0.02],
                vec![0.00, 0.01, 0.01],
            ])
            .unwrap(),
        )
        .unwrap()
    }

    fn small_frontier(seed: u64) -> FrontierConfig {
        FrontierConfig {
            points: 5,
            min_annual_return: 0.0,
            max_annual_return: 0.01 * 252.0,
            periods_per_year: 252.0,
            multipliers: PenaltyMultipliers::frontier_sweep(),
            base: GeneticConfig {
                population_size: 30,
                generations: 20,
                seed: Some(seed),
                ..GeneticConfig::default()
            },
        }
    }

    #[test]
    fn test_default_frontier_config() {
        let config = FrontierConfig::default();
        assert_eq!(config.points, 20);
        assert_eq!(config.multipliers, PenaltyMultipliers::frontier_sweep());
        assert!((config.max_annual_return - 1.26).abs() < 1e-12);
    }

    #[test]
    fn test_partial_base_keeps_sweep_multipliers() {
        let config: FrontierConfig =
            serde_json::from_str(r#"{ "base": { "generations": 50 } }"#).unwrap();
        assert_eq!(config.base.generations, 50);

        let point = config.point_config(Some(0.002), 9);
        assert_eq!(point.multipliers(), PenaltyMultipliers::frontier_sweep());
        assert_eq!(point.generations, 50);
        assert_eq!(point.target_return, Some(0.002));
        assert_eq!(point.seed, Some(9));
    }

    #[test]
    fn test_configured_multipliers_reach_every_point() {
        let config: FrontierConfig = serde_json::from_str(
            r#"{ "multipliers": { "sum": 10.0, "bounds": 20.0, "target_return": 30.0 },
                 "base": { "sum_penalty_multiplier": 1.0 } }"#,
        )
        .unwrap();
        let expected = PenaltyMultipliers {
            sum: 10.0,
            bounds: 20.0,
            target_return: 30.0,
        };
        for (i, target) in config.targets().into_iter().enumerate() {
            assert_eq!(config.point_config(target, i as u64).multipliers(), expected);
        }
    }

    #[test]
    fn test_targets() {
        let targets = small_frontier(0).targets();
        assert_eq!(targets.len(), 5);
        assert_eq!(targets[0], None);
        // annual step of 0.63, brought back to per-period
        for (i, target) in targets.iter().enumerate().skip(1) {
            let expected = i as f64 * 0.0025;
            assert!((target.unwrap() - expected).abs() < 1e-12);
        }

        let single = FrontierConfig {
            points: 1,
            ..FrontierConfig::default()
        };
        assert_eq!(single.targets(), vec![None]);
    }

    #[test]
    fn test_frontier_is_sorted_and_picks_best_sharpe() {
        let portfolio = scenario_portfolio();
        let frontier = compute_efficient_frontier(&portfolio, &small_frontier(17)).unwrap();

        assert_eq!(frontier.points.len(), 5);
        for pair in frontier.points.windows(2) {
            assert!(pair[0].annualized.risk <= pair[1].annualized.risk);
        }

        let best = frontier.best_sharpe.as_ref().unwrap();
        for point in frontier.points.iter() {
            assert!(point.annualized.sharpe_ratio <= best.annualized.sharpe_ratio);
        }
        assert_eq!(frontier.risk_return_pairs().len(), 5);
    }

    #[test]
    fn test_seeded_frontier_is_reproducible() {
        let portfolio = scenario_portfolio();
        let first = compute_efficient_frontier(&portfolio, &small_frontier(3)).unwrap();
        let second = compute_efficient_frontier(&portfolio, &small_frontier(3)).unwrap();
        assert_eq!(first.points, second.points);
        assert_eq!(first.best_sharpe, second.best_sharpe);
    }

    #[test]
    fn test_empty_frontier_is_rejected() {
        let portfolio = scenario_portfolio();
        let config = FrontierConfig {
            points: 0,
            ..small_frontier(1)
        };
        assert!(matches!(
            compute_efficient_frontier(&portfolio, &config),
            Err(EvolutionError::BadPopulationParameter(_))
        ));
    }
}
