use aegis_sharpe::constraints::{ConstraintSet, PenaltyMultipliers};
use aegis_sharpe::evolution::portfolio_evolution::{GeneticConfig, GeneticOptimiser};
use aegis_sharpe::frontier::{compute_efficient_frontier, FrontierConfig};
use aegis_sharpe::matrix::Matrix;
use aegis_sharpe::portfolio::Portfolio;
use pretty_assertions::assert_eq;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn scenario_portfolio() -> Portfolio {
    let returns = Matrix::from_rows(vec![
        vec![0.01, 0.02, -0.01],
        vec![0.02, 0.01, 0.00],
        vec![-0.01, 0.03, 0.02],
        vec![0.00, 0.01, 0.01],
    ])
    .unwrap();
    Portfolio::new(returns).unwrap()
}

/// Five assets over twelve periods with mixed correlation.
fn wider_portfolio() -> Portfolio {
    let returns = Matrix::from_rows(vec![
        vec![0.012, -0.004, 0.007, 0.001, 0.020],
        vec![-0.008, 0.006, 0.003, 0.002, -0.015],
        vec![0.015, 0.001, -0.002, 0.001, 0.030],
        vec![0.004, 0.009, 0.005, 0.002, -0.010],
        vec![-0.011, -0.002, 0.008, 0.001, 0.025],
        vec![0.009, 0.004, -0.004, 0.002, -0.020],
        vec![0.006, -0.007, 0.006, 0.001, 0.010],
        vec![-0.003, 0.011, 0.002, 0.002, 0.005],
        vec![0.010, 0.002, -0.001, 0.001, -0.005],
        vec![0.002, 0.005, 0.004, 0.002, 0.015],
        vec![-0.006, 0.003, 0.007, 0.001, -0.012],
        vec![0.011, -0.001, 0.001, 0.002, 0.018],
    ])
    .unwrap();
    Portfolio::new(returns).unwrap()
}

// ---------------------------------------------------------------------------
// Single optimiser runs
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_weights_are_feasible() {
    let portfolio = scenario_portfolio();
    let config = GeneticConfig {
        population_size: 100,
        generations: 200,
        seed: Some(2024),
        ..GeneticConfig::default()
    };
    let weights = GeneticOptimiser::new(&portfolio, config)
        .unwrap()
        .optimise()
        .unwrap();

    let sum: f64 = weights.iter().sum();
    assert!((sum - 1.0).abs() < 1e-9, "Weights should sum to 1. Got {}", sum);
    assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    assert!(ConstraintSet::default().is_feasible(&weights, portfolio.means()));
}

#[test]
fn test_optimiser_beats_equal_weights() {
    let portfolio = wider_portfolio();
    let config = GeneticConfig {
        population_size: 120,
        generations: 150,
        seed: Some(11),
        ..GeneticConfig::default()
    };
    let mut optimiser = GeneticOptimiser::new(&portfolio, config).unwrap();
    let result = optimiser.optimise_with_report().unwrap();

    let equal = vec![0.2; 5];
    let equal_fitness = optimiser.fitness(&equal).unwrap();
    assert!(
        result.best_fitness <= equal_fitness,
        "Expected {} <= {}",
        result.best_fitness,
        equal_fitness
    );
    assert!(result.best_weights.iter().all(|&w| w >= 0.0));
}

#[test]
fn test_target_return_is_met() {
    let portfolio = scenario_portfolio();
    let target = 0.01;
    let config = GeneticConfig {
        population_size: 100,
        generations: 300,
        target_return: Some(target),
        seed: Some(77),
        ..GeneticConfig::default()
    }
    .with_multipliers(PenaltyMultipliers::single_target());

    let weights = GeneticOptimiser::new(&portfolio, config)
        .unwrap()
        .optimise()
        .unwrap();
    let expected = portfolio.portfolio_return(&weights).unwrap();
    assert!(
        expected >= target - 2e-3,
        "Expected return {} is too far below target {}",
        expected,
        target
    );
}

#[test]
fn test_seeded_runs_agree_across_optimisers() {
    let portfolio = wider_portfolio();
    let config = GeneticConfig {
        population_size: 50,
        generations: 40,
        seed: Some(8),
        ..GeneticConfig::default()
    };
    let first = GeneticOptimiser::new(&portfolio, config.clone())
        .unwrap()
        .optimise()
        .unwrap();
    let second = GeneticOptimiser::new(&portfolio, config)
        .unwrap()
        .optimise()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_shared_portfolio_across_threads() {
    let portfolio = wider_portfolio();
    let results: Vec<Vec<f64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..3u64)
            .map(|seed| {
                let portfolio = &portfolio;
                scope.spawn(move || {
                    let config = GeneticConfig {
                        population_size: 40,
                        generations: 25,
                        seed: Some(seed),
                        ..GeneticConfig::default()
                    };
                    GeneticOptimiser::new(portfolio, config)
                        .unwrap()
                        .optimise()
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for weights in results {
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

// ---------------------------------------------------------------------------
// Frontier
// ---------------------------------------------------------------------------

#[test]
fn test_frontier_best_sharpe_is_maximal() {
    let portfolio = wider_portfolio();
    let mut config = FrontierConfig {
        points: 6,
        max_annual_return: 0.004 * 252.0,
        ..FrontierConfig::default()
    };
    config.base.population_size = 40;
    config.base.generations = 40;
    config.base.seed = Some(5);

    let frontier = compute_efficient_frontier(&portfolio, &config).unwrap();
    assert_eq!(frontier.points.len(), 6);

    let best = frontier.best_sharpe.unwrap();
    let max_sharpe = frontier
        .points
        .iter()
        .map(|p| p.annualized.sharpe_ratio)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(best.annualized.sharpe_ratio, max_sharpe);

    let pairs = frontier
        .points
        .iter()
        .map(|p| p.annualized.risk)
        .collect::<Vec<_>>();
    assert!(pairs.windows(2).all(|w| w[0] <= w[1]));
}
