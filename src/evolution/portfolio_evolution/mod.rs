use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constraints::{target_from_sentinel, ConstraintSet, PenaltyMultipliers};
use crate::consts::PERTURBATION;
use crate::evolution::objective::PenalizedSharpe;
use crate::portfolio::{Portfolio, PortfolioError};
use crate::weights::WeightError;

use self::operators::{crossover, elite_count, initialize_population, mutate, tournament_selection};

pub mod operators;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvolutionError {
    #[error("Invalid population parameters were passed: {0}")]
    BadPopulationParameter(String),
    #[error(transparent)]
    Weights(#[from] WeightError),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
}

fn default_population_size() -> usize {
    100
}

fn default_generations() -> usize {
    1000
}

fn default_mutation_rate() -> f64 {
    0.05
}

fn default_crossover_rate() -> f64 {
    0.7
}

fn default_upper_bound() -> f64 {
    1.0
}

fn default_sum_penalty_multiplier() -> f64 {
    PenaltyMultipliers::default().sum
}

fn default_bounds_penalty_multiplier() -> f64 {
    PenaltyMultipliers::default().bounds
}

fn default_target_return_penalty_multiplier() -> f64 {
    PenaltyMultipliers::default().target_return
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneticConfig {
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default)]
    pub lower_bound: f64,
    #[serde(default = "default_upper_bound")]
    pub upper_bound: f64,
    /// Minimum per-period expected return. `None` leaves the return unconstrained.
    #[serde(default)]
    pub target_return: Option<f64>,
    #[serde(default = "default_sum_penalty_multiplier")]
    pub sum_penalty_multiplier: f64,
    #[serde(default = "default_bounds_penalty_multiplier")]
    pub bounds_penalty_multiplier: f64,
    #[serde(default = "default_target_return_penalty_multiplier")]
    pub target_return_penalty_multiplier: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Generations between two progress reports; defaults to a tenth of the run.
    #[serde(default)]
    pub generation_check_interval: Option<usize>,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        GeneticConfig {
            population_size: default_population_size(),
            generations: default_generations(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            lower_bound: 0.0,
            upper_bound: default_upper_bound(),
            target_return: None,
            sum_penalty_multiplier: default_sum_penalty_multiplier(),
            bounds_penalty_multiplier: default_bounds_penalty_multiplier(),
            target_return_penalty_multiplier: default_target_return_penalty_multiplier(),
            risk_free_rate: 0.0,
            seed: None,
            generation_check_interval: None,
        }
    }
}

impl GeneticConfig {
    pub fn constraints(&self) -> ConstraintSet {
        ConstraintSet::new(
            self.lower_bound,
            self.upper_bound,
            self.target_return.and_then(target_from_sentinel),
        )
    }

    pub fn multipliers(&self) -> PenaltyMultipliers {
        PenaltyMultipliers {
            sum: self.sum_penalty_multiplier,
            bounds: self.bounds_penalty_multiplier,
            target_return: self.target_return_penalty_multiplier,
        }
    }

    pub fn with_multipliers(mut self, multipliers: PenaltyMultipliers) -> Self {
        self.sum_penalty_multiplier = multipliers.sum;
        self.bounds_penalty_multiplier = multipliers.bounds;
        self.target_return_penalty_multiplier = multipliers.target_return;
        self
    }

    pub fn check_interval(&self) -> usize {
        self.generation_check_interval
            .unwrap_or(self.generations / 10)
            .max(1)
    }

    /// Whether the 0-based `generation` gets an `info!` progress report: the first,
    /// the last, and every `check_interval`-th generation counting from one.
    pub fn reports_progress(&self, generation: usize) -> bool {
        generation == 0
            || generation + 1 == self.generations
            || (generation + 1) % self.check_interval() == 0
    }

    fn validate(&self) -> Result<(), EvolutionError> {
        let bad = |reason: String| -> Result<(), EvolutionError> {
            Err(EvolutionError::BadPopulationParameter(reason))
        };

        if self.population_size == 0 {
            return bad("Population size cannot be zero".into());
        }
        if self.generations == 0 {
            return bad("Generations cannot be zero".into());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return bad(format!("Mutation rate {} is outside [0, 1]", self.mutation_rate));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return bad(format!("Crossover rate {} is outside [0, 1]", self.crossover_rate));
        }
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return bad(format!(
                "Weight bounds must be finite, got [{}, {}]",
                self.lower_bound, self.upper_bound
            ));
        }
        if self.lower_bound > self.upper_bound {
            return bad(format!(
                "Lower bound {} is above upper bound {}",
                self.lower_bound, self.upper_bound
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EvolutionResult {
    pub best_weights: Vec<f64>,
    pub best_fitness: f64,
    /// Running best after each generation. Never increases.
    pub best_fitness_per_generation: Vec<f64>,
    /// Best fitness found within each generation alone.
    pub generation_best_fitness: Vec<f64>,
    /// Seed the run was started from, when known.
    pub seed: Option<u64>,
}

/// Single-objective genetic search for the weight vector with the best
/// penalized Sharpe ratio.
///
/// The optimiser owns its random source and only borrows the [`Portfolio`], so
/// any number of optimisers can search the same asset universe side by side.
pub struct GeneticOptimiser<'a> {
    objective: PenalizedSharpe<'a>,
    config: GeneticConfig,
    num_assets: usize,
    rng: ChaCha20Rng,
    noise: Normal<f64>,
    seed: Option<u64>,
}

impl<'a> GeneticOptimiser<'a> {
    pub fn new(portfolio: &'a Portfolio, config: GeneticConfig) -> Result<Self, EvolutionError> {
        let seed = config.seed.unwrap_or_else(|| OsRng.next_u64());
        let mut optimiser =
            GeneticOptimiser::with_rng(portfolio, config, ChaCha20Rng::seed_from_u64(seed))?;
        optimiser.seed = Some(seed);
        Ok(optimiser)
    }

    /// Builds an optimiser around an already-positioned random source. The
    /// configured seed is ignored.
    pub fn with_rng(
        portfolio: &'a Portfolio,
        config: GeneticConfig,
        rng: ChaCha20Rng,
    ) -> Result<Self, EvolutionError> {
        config.validate()?;
        if portfolio.num_assets() == 0 {
            return Err(EvolutionError::BadPopulationParameter(
                "Assets under management cannot be zero".into(),
            ));
        }
        if elite_count(config.population_size) == 0 {
            warn!(
                "Elite population size rounded to 0 for a population of {}, no individual survives a generation unchanged.",
                config.population_size
            );
        }

        let noise = Normal::new(0.0, PERTURBATION)
            .map_err(|e| EvolutionError::BadPopulationParameter(e.to_string()))?;
        let objective = PenalizedSharpe::new(
            portfolio,
            config.constraints(),
            config.multipliers(),
            config.risk_free_rate,
        );

        Ok(GeneticOptimiser {
            objective,
            num_assets: portfolio.num_assets(),
            config,
            rng,
            noise,
            seed: None,
        })
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Restarts the random source so the next run replays from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
        self.seed = Some(seed);
    }

    pub fn fitness(&self, weights: &[f64]) -> Result<f64, EvolutionError> {
        Ok(self.objective.compute(weights)?)
    }

    pub fn optimise(&mut self) -> Result<Vec<f64>, EvolutionError> {
        Ok(self.optimise_with_report()?.best_weights)
    }

    pub fn optimise_with_report(&mut self) -> Result<EvolutionResult, EvolutionError> {
        let population_size = self.config.population_size;
        let generations = self.config.generations;
        let elites = elite_count(population_size);
        let constraints = *self.objective.constraints();

        let mut population = initialize_population(
            population_size,
            self.num_assets,
            constraints.lower,
            constraints.upper,
            &mut self.rng,
        )?;

        let mut best: Option<(Vec<f64>, f64)> = None;
        let mut best_fitness_per_generation = Vec::with_capacity(generations);
        let mut generation_best_fitness = Vec::with_capacity(generations);

        for generation in 0..generations {
            let fitnesses = population
                .iter()
                .map(|weights| self.objective.compute(weights))
                .collect::<Result<Vec<f64>, PortfolioError>>()?;

            let mut ranking: Vec<usize> = (0..population_size).collect();
            ranking.sort_by(|&a, &b| fitnesses[a].total_cmp(&fitnesses[b]));

            let generation_best = fitnesses[ranking[0]];
            let improved = best
                .as_ref()
                .map_or(true, |(_, best_fitness)| generation_best < *best_fitness);
            if improved {
                best = Some((population[ranking[0]].clone(), generation_best));
            }
            let running_best = best.as_ref().map_or(generation_best, |(_, f)| *f);

            best_fitness_per_generation.push(running_best);
            generation_best_fitness.push(generation_best);

            let is_last = generation + 1 == generations;
            if self.config.reports_progress(generation) {
                info!(
                    generation,
                    best_fitness = running_best,
                    generation_best,
                    "Generation {}/{} evaluated",
                    generation + 1,
                    generations
                );
            } else {
                debug!(generation, best_fitness = running_best, generation_best);
            }
            if is_last {
                break;
            }

            let mut next_generation = Vec::with_capacity(population_size);
            next_generation.extend(ranking.iter().take(elites).map(|&i| population[i].clone()));

            while next_generation.len() < population_size {
                let parent_1 = tournament_selection(&fitnesses, &mut self.rng);
                let parent_2 = tournament_selection(&fitnesses, &mut self.rng);

                let (mut child_1, mut child_2) = crossover(
                    &population[parent_1],
                    &population[parent_2],
                    self.config.crossover_rate,
                    &mut self.rng,
                )?;
                for child in [&mut child_1, &mut child_2] {
                    mutate(
                        child,
                        self.config.mutation_rate,
                        &self.noise,
                        constraints.lower,
                        constraints.upper,
                        &mut self.rng,
                    )?;
                }

                next_generation.push(child_1);
                if next_generation.len() < population_size {
                    next_generation.push(child_2);
                }
            }
            population = next_generation;
        }

        let (best_weights, _) = best.ok_or_else(|| {
            EvolutionError::BadPopulationParameter("No generation was evaluated".into())
        })?;
        let best_fitness = self.objective.compute(&best_weights)?;

        Ok(EvolutionResult {
            best_weights,
            best_fitness,
            best_fitness_per_generation,
            generation_best_fitness,
            seed: self.seed,
        })
    }
}
