//! Constraint rules for weight vectors, exposed at three levels of strictness.
//!
//! Every tier goes through [`ConstraintSet::violations`], so the rules are written once:
//!
//! - [`ConstraintSet::validate`] fails with a [`ValidationError`] on the first violation
//!   beyond [`FLOAT_COMPARISON_EPSILON`].
//! - [`ConstraintSet::is_feasible`] reports the same check as a `bool`.
//! - [`ConstraintSet::penalty`] turns the violation magnitudes into the smooth score the
//!   optimiser adds to its fitness.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{FLOAT_COMPARISON_EPSILON, STRUCTURAL_MISMATCH_PENALTY};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Weights must sum to 1.0. Got sum = {0}")]
    SumNotOne(f64),
    #[error("Weight {weight} at index {index} violates bounds [{lower}, {upper}]")]
    OutOfBounds {
        index: usize,
        weight: f64,
        lower: f64,
        upper: f64,
    },
    #[error("Expected return ({expected}) is below target ({target})")]
    BelowTarget { expected: f64, target: f64 },
    #[error("Weight and return vectors must match in size: {weights} vs {means}")]
    LengthMismatch { weights: usize, means: usize },
}

/// Maps the legacy "lowest representable value" sentinel to an unconstrained target.
pub fn target_from_sentinel(raw: f64) -> Option<f64> {
    if raw.is_nan() || raw <= f64::MIN {
        None
    } else {
        Some(raw)
    }
}

/// Scaling applied to each violation before they are added up.
///
/// These are tuned by hand; a sweep over many targets needs a much stiffer
/// target-return multiplier than a single run to keep points apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyMultipliers {
    pub sum: f64,
    pub bounds: f64,
    pub target_return: f64,
}

impl Default for PenaltyMultipliers {
    fn default() -> Self {
        PenaltyMultipliers {
            sum: 100.0,
            bounds: 100.0,
            target_return: 1000.0,
        }
    }
}

impl PenaltyMultipliers {
    pub fn single_target() -> Self {
        PenaltyMultipliers {
            sum: 1000.0,
            bounds: 1000.0,
            target_return: 5000.0,
        }
    }

    pub fn frontier_sweep() -> Self {
        PenaltyMultipliers {
            sum: 1000.0,
            bounds: 1000.0,
            target_return: 25000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetViolation {
    Unconstrained,
    /// How far the expected return falls short of the target; `0.0` when it is met.
    Shortfall { expected: f64, target: f64, shortfall: f64 },
    LengthMismatch { weights: usize, means: usize },
}

/// Raw violation magnitudes of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintViolations {
    pub sum: f64,
    pub total: f64,
    pub bounds: f64,
    /// Largest single-asset bounds violation and where it happened.
    pub worst_bound: Option<(usize, f64)>,
    pub target: TargetViolation,
}

impl ConstraintViolations {
    pub fn target_penalty(&self) -> f64 {
        match self.target {
            TargetViolation::Unconstrained => 0.0,
            TargetViolation::Shortfall { shortfall, .. } => shortfall,
            TargetViolation::LengthMismatch { .. } => STRUCTURAL_MISMATCH_PENALTY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub target_return: Option<f64>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        ConstraintSet {
            lower: 0.0,
            upper: 1.0,
            target_return: None,
        }
    }
}

impl ConstraintSet {
    pub fn new(lower: f64, upper: f64, target_return: Option<f64>) -> Self {
        ConstraintSet {
            lower,
            upper,
            target_return,
        }
    }

    pub fn violations(&self, weights: &[f64], mean_returns: &[f64]) -> ConstraintViolations {
        let total: f64 = weights.iter().sum();

        let mut bounds = 0.0;
        let mut worst_bound: Option<(usize, f64)> = None;
        for (i, &w) in weights.iter().enumerate() {
            let violation = (self.lower - w).max(0.0) + (w - self.upper).max(0.0);
            bounds += violation;
            if violation > 0.0 && worst_bound.map_or(true, |(_, worst)| violation > worst) {
                worst_bound = Some((i, violation));
            }
        }

        let target = match self.target_return {
            None => TargetViolation::Unconstrained,
            Some(_) if weights.len() != mean_returns.len() => TargetViolation::LengthMismatch {
                weights: weights.len(),
                means: mean_returns.len(),
            },
            Some(target) => {
                let expected: f64 = weights.iter().zip(mean_returns).map(|(w, m)| w * m).sum();
                let shortfall = if expected + FLOAT_COMPARISON_EPSILON < target {
                    target - expected
                } else {
                    0.0
                };
                TargetViolation::Shortfall {
                    expected,
                    target,
                    shortfall,
                }
            }
        };

        ConstraintViolations {
            sum: (total - 1.0).abs(),
            total,
            bounds,
            worst_bound,
            target,
        }
    }

    pub fn validate(&self, weights: &[f64], mean_returns: &[f64]) -> Result<(), ValidationError> {
        let violations = self.violations(weights, mean_returns);

        if violations.sum > FLOAT_COMPARISON_EPSILON {
            return Err(ValidationError::SumNotOne(violations.total));
        }
        if let Some((index, violation)) = violations.worst_bound {
            if violation > FLOAT_COMPARISON_EPSILON {
                return Err(ValidationError::OutOfBounds {
                    index,
                    weight: weights[index],
                    lower: self.lower,
                    upper: self.upper,
                });
            }
        }
        match violations.target {
            TargetViolation::LengthMismatch { weights, means } => {
                Err(ValidationError::LengthMismatch { weights, means })
            }
            TargetViolation::Shortfall {
                expected,
                target,
                shortfall,
            } if shortfall > 0.0 => Err(ValidationError::BelowTarget { expected, target }),
            _ => Ok(()),
        }
    }

    pub fn is_feasible(&self, weights: &[f64], mean_returns: &[f64]) -> bool {
        self.validate(weights, mean_returns).is_ok()
    }

    /// Weighted sum of every violation; zero for a feasible vector.
    pub fn penalty(
        &self,
        weights: &[f64],
        mean_returns: &[f64],
        multipliers: &PenaltyMultipliers,
    ) -> f64 {
        let violations = self.violations(weights, mean_returns);
        violations.sum * multipliers.sum
            + violations.bounds * multipliers.bounds
            + violations.target_penalty() * multipliers.target_return
    }
}

pub fn validate_weights(
    weights: &[f64],
    mean_returns: &[f64],
    target_return: Option<f64>,
) -> Result<(), ValidationError> {
    ConstraintSet::new(0.0, 1.0, target_return).validate(weights, mean_returns)
}

pub fn is_feasible(weights: &[f64], mean_returns: &[f64], target_return: Option<f64>) -> bool {
    ConstraintSet::new(0.0, 1.0, target_return).is_feasible(weights, mean_returns)
}

/// Penalty with unit multipliers and long-only bounds.
pub fn constraint_penalty(weights: &[f64], mean_returns: &[f64], target_return: Option<f64>) -> f64 {
    let unit = PenaltyMultipliers {
        sum: 1.0,
        bounds: 1.0,
        target_return: 1.0,
    };
    ConstraintSet::new(0.0, 1.0, target_return).penalty(weights, mean_returns, &unit)
}
