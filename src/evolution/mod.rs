pub mod objective;
pub mod portfolio_evolution;
