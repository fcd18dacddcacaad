use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::RISK_EPSILON;
use crate::matrix::{Matrix, MatrixError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Weight vector size mismatch for {operation}. Expected {expected}, got {found}.")]
    Dimension {
        operation: &'static str,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Per-period (or annualized) summary of a weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
}

impl PortfolioPerformance {
    /// Scales per-period figures: return by `P`, risk and Sharpe by `sqrt(P)`.
    pub fn annualized(&self, periods_per_year: f64) -> PortfolioPerformance {
        let root = periods_per_year.sqrt();
        PortfolioPerformance {
            expected_return: self.expected_return * periods_per_year,
            risk: self.risk * root,
            sharpe_ratio: self.sharpe_ratio * root,
        }
    }
}

/// Statistical model of a set of assets built from historical returns.
///
/// Rows of the returns matrix are time periods, columns are assets. The mean
/// vector and the covariance matrix are derived once here and never change, so
/// a `Portfolio` can be shared read-only between any number of optimisers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    returns: Matrix,
    covariance: Matrix,
    means: Vec<f64>,
}

impl Portfolio {
    pub fn new(returns: Matrix) -> Result<Self, PortfolioError> {
        if returns.num_rows() < 2 {
            return Err(PortfolioError::InvalidArgument(format!(
                "returns matrix needs at least 2 rows of data, got {}",
                returns.num_rows()
            )));
        }
        if returns.num_cols() == 0 {
            return Err(PortfolioError::InvalidArgument(
                "returns matrix needs at least 1 asset column".into(),
            ));
        }

        let means = returns.mean_per_column();
        let covariance = returns.covariance_matrix()?;
        Ok(Portfolio {
            returns,
            covariance,
            means,
        })
    }

    /// Skips the estimation step so tests can pin down an exact covariance.
    #[cfg(test)]
    pub(crate) fn from_moments(means: Vec<f64>, covariance: Matrix) -> Self {
        Portfolio {
            returns: Matrix::empty(),
            covariance,
            means,
        }
    }

    pub fn num_assets(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    pub fn returns(&self) -> &Matrix {
        &self.returns
    }

    /// Inverse of the covariance matrix. Fails when the covariance is not positive-definite,
    /// e.g. when two assets are perfectly collinear.
    pub fn inverse_covariance(&self) -> Result<Matrix, PortfolioError> {
        Ok(self.covariance.inverse()?)
    }

    fn check_size(&self, weights: &[f64], operation: &'static str) -> Result<(), PortfolioError> {
        if weights.len() != self.num_assets() {
            return Err(PortfolioError::Dimension {
                operation,
                expected: self.num_assets(),
                found: weights.len(),
            });
        }
        Ok(())
    }

    pub fn portfolio_return(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        self.check_size(weights, "portfolio return")?;
        Ok(weights.iter().zip(&self.means).map(|(w, m)| w * m).sum())
    }

    pub fn excess_return(&self, weights: &[f64], risk_free: f64) -> Result<f64, PortfolioError> {
        Ok(self.portfolio_return(weights)? - risk_free)
    }

    /// `w^T * Cov * w`, summed explicitly over every pair of assets.
    pub fn portfolio_variance(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        self.check_size(weights, "portfolio variance")?;

        let n = self.num_assets();
        let mut variance = 0.0;
        for i in 0..n {
            for j in 0..n {
                variance += weights[i] * weights[j] * self.covariance[(i, j)];
            }
        }
        Ok(variance)
    }

    /// Standard deviation of the portfolio. Round-off can push the variance of a
    /// near-riskless portfolio slightly below zero, so it is floored first.
    pub fn portfolio_risk(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        Ok(self.portfolio_variance(weights)?.max(0.0).sqrt())
    }

    /// `(return - risk_free) / risk`.
    ///
    /// A riskless portfolio scores `+inf` when its excess return is positive and
    /// exactly `0.0` otherwise.
    pub fn sharpe_ratio(&self, weights: &[f64], risk_free: f64) -> Result<f64, PortfolioError> {
        let excess = self.excess_return(weights, risk_free)?;
        let risk = self.portfolio_risk(weights)?;

        if risk < RISK_EPSILON {
            if excess > RISK_EPSILON {
                return Ok(f64::INFINITY);
            }
            return Ok(0.0);
        }
        Ok(excess / risk)
    }

    pub fn performance(
        &self,
        weights: &[f64],
        risk_free: f64,
    ) -> Result<PortfolioPerformance, PortfolioError> {
        Ok(PortfolioPerformance {
            expected_return: self.portfolio_return(weights)?,
            risk: self.portfolio_risk(weights)?,
            sharpe_ratio: self.sharpe_ratio(weights, risk_free)?,
        })
    }
}
