//! Small numeric helpers shared by the constraint layer and the optimiser.
use rand::distributions::Uniform;
use rand::Rng;
use thiserror::Error;

use crate::consts::{FLOAT_COMPARISON_EPSILON, NORMALIZATION_EPSILON};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("Weight vector size must be greater than zero")]
    Empty,
    #[error("Cannot normalize weights: sum ({0}) is approximately zero")]
    DegenerateSum(f64),
    #[error("Vector sizes must match: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}

/// Draws `n` uniform weights in `[0, 1)` and scales them to sum to one.
///
/// Falls back to equal weights in the (practically unreachable) case where the
/// draw sums to zero.
pub fn random_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Vec<f64>, WeightError> {
    if n == 0 {
        return Err(WeightError::Empty);
    }

    let uniform = Uniform::new(0., 1.);
    let mut weights: Vec<f64> = (0..n).map(|_| rng.sample(uniform)).collect();
    let magnitude = weights.iter().sum::<f64>();

    if magnitude < NORMALIZATION_EPSILON {
        weights.iter_mut().for_each(|w| *w = 1.0 / n as f64);
    } else {
        weights.iter_mut().for_each(|w| *w /= magnitude);
    }
    Ok(weights)
}

pub fn dot_product(a: &[f64], b: &[f64]) -> Result<f64, WeightError> {
    if a.len() != b.len() {
        return Err(WeightError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

pub fn clip(weights: &mut [f64], lower: f64, upper: f64) {
    weights.iter_mut().for_each(|w| *w = w.clamp(lower, upper));
}

/// Rescales `weights` in place so they sum to one.
pub fn normalize(weights: &mut [f64]) -> Result<(), WeightError> {
    let total: f64 = weights.iter().sum();
    if total < NORMALIZATION_EPSILON {
        return Err(WeightError::DegenerateSum(total));
    }
    weights.iter_mut().for_each(|w| *w /= total);
    Ok(())
}

pub fn almost_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < FLOAT_COMPARISON_EPSILON
}
