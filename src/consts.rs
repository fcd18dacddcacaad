/// Tolerance used by the strict constraint validators and the target-return shortfall test.
pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-8;

/// Below this, a portfolio's risk is treated as zero when computing the Sharpe ratio.
pub const RISK_EPSILON: f64 = 1e-12;

/// A weight vector whose sum falls below this cannot be renormalized.
pub const NORMALIZATION_EPSILON: f64 = 1e-12;

/// Standard deviation of the gaussian noise added to a mutated gene.
pub const PERTURBATION: f64 = 0.05;

pub const TOURNAMENT_SIZE: usize = 3;

/// One elite is kept for every `ELITISM_DIVISOR` individuals in the population.
pub const ELITISM_DIVISOR: usize = 20;

/// Flat target-return penalty applied when weights and mean returns differ in length.
pub const STRUCTURAL_MISMATCH_PENALTY: f64 = 100.0;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
