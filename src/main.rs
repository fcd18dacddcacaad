use std::fs;
use std::path::{Path, PathBuf};

use aegis_sharpe::constraints::PenaltyMultipliers;
use aegis_sharpe::consts::TRADING_DAYS_PER_YEAR;
use aegis_sharpe::evolution::portfolio_evolution::{EvolutionResult, GeneticConfig, GeneticOptimiser};
use aegis_sharpe::frontier::{compute_efficient_frontier, EfficientFrontier, FrontierConfig};
use aegis_sharpe::portfolio::{Portfolio, PortfolioPerformance};
use aegis_sharpe::returns::{load_returns_csv, PriceTable, ReturnsTable};
use anyhow::{bail, Context};
use clap::Parser;
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "aegis-sharpe")]
#[command(about = "Penalized Sharpe ratio portfolio optimisation with a genetic algorithm")]
struct Cli {
    /// CSV of per-period returns, `Date,<tickers...>`
    #[arg(long, conflicts_with = "prices")]
    returns: Option<PathBuf>,

    /// CSV of prices, `Date,<tickers...>`; log returns are derived from it
    #[arg(long)]
    prices: Option<PathBuf>,

    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Minimum annual expected return for the main run
    #[arg(long)]
    target_annual_return: Option<f64>,

    /// Annual risk-free rate, overrides the configured per-period rate
    #[arg(long)]
    annual_risk_free_rate: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Also sweep target returns to trace the efficient frontier
    #[arg(long)]
    frontier: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct RunConfig {
    #[serde(default)]
    optimiser: GeneticConfig,
    #[serde(default)]
    frontier: FrontierConfig,
}

#[derive(Serialize, Debug)]
struct OptimisedPortfolio<'a> {
    tickers: &'a [String],
    annualized: PortfolioPerformance,
    evolution: &'a EvolutionResult,
}

/// Targets `annual` for the main run. The stiffer single-target penalties are
/// only swapped in while the configured multipliers are still the defaults.
fn with_annual_target(config: GeneticConfig, annual: f64) -> GeneticConfig {
    let targeted = GeneticConfig {
        target_return: Some(annual / TRADING_DAYS_PER_YEAR),
        ..config
    };
    let configured = targeted.multipliers();
    if configured == PenaltyMultipliers::default() {
        return targeted.with_multipliers(PenaltyMultipliers::single_target());
    }
    warn!(
        "Keeping configured penalty multipliers {:?} for target {}, single-target preset is {:?}",
        configured,
        annual,
        PenaltyMultipliers::single_target()
    );
    targeted
}

fn load_run_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
}

fn load_returns(cli: &Cli) -> anyhow::Result<ReturnsTable> {
    match (&cli.returns, &cli.prices) {
        (Some(path), _) => load_returns_csv(path)
            .with_context(|| format!("failed to load returns: {}", path.display())),
        (None, Some(path)) => {
            let prices = PriceTable::from_csv(path)
                .with_context(|| format!("failed to load prices: {}", path.display()))?;
            let returns = prices.log_returns();
            returns.write_csv(cli.output_dir.join("daily_returns.csv"))?;
            Ok(returns)
        }
        (None, None) => bail!("either --returns or --prices is required"),
    }
}

fn write_portfolio_csv(
    path: &Path,
    tickers: &[String],
    weights: &[f64],
    annualized: &PortfolioPerformance,
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Metric", "Value"])?;
    writer.write_record(["Expected Return", format!("{:.8}", annualized.expected_return).as_str()])?;
    writer.write_record(["Portfolio Std Dev", format!("{:.8}", annualized.risk).as_str()])?;
    writer.write_record(["Sharpe Ratio", format!("{:.8}", annualized.sharpe_ratio).as_str()])?;
    for (i, weight) in weights.iter().enumerate() {
        let label = tickers
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("Asset {}", i));
        writer.write_record([format!("Weight {}", label), format!("{:.8}", weight)])?;
    }
    writer.flush()?;
    info!("Portfolio details saved to {}", path.display());
    Ok(())
}

fn write_frontier_csv(path: &Path, frontier: &EfficientFrontier) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Risk", "Return"])?;
    for (risk, ret) in frontier.risk_return_pairs() {
        writer.write_record([format!("{:.8}", risk), format!("{:.8}", ret)])?;
    }
    writer.flush()?;
    info!("Frontier data saved to {}", path.display());
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut run = load_run_config(cli.config.as_deref())?;

    if let Some(seed) = cli.seed {
        run.optimiser.seed = Some(seed);
        run.frontier.base.seed = Some(seed);
    }
    if let Some(annual) = cli.annual_risk_free_rate {
        run.optimiser.risk_free_rate = annual / TRADING_DAYS_PER_YEAR;
        run.frontier.base.risk_free_rate = annual / run.frontier.periods_per_year;
    }
    if let Some(annual) = cli.target_annual_return {
        if annual < -1.0 {
            bail!("target annual return must be at least -1.0, got {}", annual);
        }
        run.optimiser = with_annual_target(run.optimiser, annual);
    }

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;

    let table = load_returns(&cli)?;
    let portfolio = Portfolio::new(table.to_matrix()?)?;
    info!(
        "Loaded {} periods of returns for {} assets",
        portfolio.returns().num_rows(),
        portfolio.num_assets()
    );

    let mut optimiser = GeneticOptimiser::new(&portfolio, run.optimiser.clone())?;
    let result = optimiser.optimise_with_report()?;
    let annualized = portfolio
        .performance(&result.best_weights, run.optimiser.risk_free_rate)?
        .annualized(TRADING_DAYS_PER_YEAR);
    info!(
        "Optimised portfolio: return {:.4}, risk {:.4}, Sharpe {:.4}",
        annualized.expected_return, annualized.risk, annualized.sharpe_ratio
    );

    write_portfolio_csv(
        &cli.output_dir.join("optimised_portfolio.csv"),
        &table.tickers,
        &result.best_weights,
        &annualized,
    )?;
    write_json(
        &cli.output_dir.join("optimised_portfolio.json"),
        &OptimisedPortfolio {
            tickers: &table.tickers,
            annualized,
            evolution: &result,
        },
    )?;

    if cli.frontier {
        let frontier = compute_efficient_frontier(&portfolio, &run.frontier)?;
        write_frontier_csv(&cli.output_dir.join("efficient_frontier.csv"), &frontier)?;
        write_json(&cli.output_dir.join("efficient_frontier.json"), &frontier)?;

        if let Some(best) = &frontier.best_sharpe {
            write_portfolio_csv(
                &cli.output_dir.join("best_sharpe_portfolio.csv"),
                &table.tickers,
                &best.weights,
                &best.annualized,
            )?;
        }
    }

    info!("Optimisation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_annual_target_uses_single_target_preset_by_default() {
        let config = with_annual_target(GeneticConfig::default(), 0.252);
        assert_eq!(config.multipliers(), PenaltyMultipliers::single_target());
        assert!((config.target_return.unwrap() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_annual_target_keeps_configured_multipliers() {
        let run: RunConfig = serde_json::from_str(
            r#"{ "optimiser": { "target_return_penalty_multiplier": 42000.0 } }"#,
        )
        .unwrap();
        let config = with_annual_target(run.optimiser, 0.1);
        assert_eq!(
            config.multipliers(),
            PenaltyMultipliers {
                sum: 100.0,
                bounds: 100.0,
                target_return: 42000.0,
            }
        );
        assert!(config.target_return.is_some());
    }
}
