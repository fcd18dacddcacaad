use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::consts::{ELITISM_DIVISOR, TOURNAMENT_SIZE};
use crate::weights::{clip, normalize, random_weights, WeightError};

pub fn elite_count(population_size: usize) -> usize {
    population_size / ELITISM_DIVISOR
}

/// Uniform draws, clipped to the bounds and renormalized.
pub fn initialize_population<R: Rng + ?Sized>(
    population_size: usize,
    assets_under_management: usize,
    lower: f64,
    upper: f64,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>, WeightError> {
    (0..population_size)
        .map(|_| {
            let mut weights = random_weights(assets_under_management, rng)?;
            clip(&mut weights, lower, upper);
            normalize(&mut weights)?;
            Ok(weights)
        })
        .collect()
}

/// Draws `TOURNAMENT_SIZE` contestants uniformly (with replacement) and returns the
/// index of the one with the lowest fitness. Ties keep the earliest draw.
pub fn tournament_selection<R: Rng + ?Sized>(fitnesses: &[f64], rng: &mut R) -> usize {
    let mut best_idx = rng.gen_range(0..fitnesses.len());
    for _ in 1..TOURNAMENT_SIZE {
        let contestant = rng.gen_range(0..fitnesses.len());
        if fitnesses[contestant] < fitnesses[best_idx] {
            best_idx = contestant;
        }
    }
    best_idx
}

/// Uniform crossover: each gene is swapped between the children with probability
/// `crossover_rate`. Both children are renormalized since swapping breaks the sum.
pub fn crossover<R: Rng + ?Sized>(
    parent_1: &[f64],
    parent_2: &[f64],
    crossover_rate: f64,
    rng: &mut R,
) -> Result<(Vec<f64>, Vec<f64>), WeightError> {
    let mut child_1 = parent_1.to_vec();
    let mut child_2 = parent_2.to_vec();

    for (gene_1, gene_2) in child_1.iter_mut().zip(child_2.iter_mut()) {
        if rng.gen_bool(crossover_rate) {
            std::mem::swap(gene_1, gene_2);
        }
    }

    normalize(&mut child_1)?;
    normalize(&mut child_2)?;
    Ok((child_1, child_2))
}

/// Gaussian perturbation of each gene with probability `mutation_rate`.
///
/// Untouched vectors are left exactly as they were; a mutated one is clipped to the
/// bounds and renormalized.
pub fn mutate<R: Rng + ?Sized>(
    weights: &mut [f64],
    mutation_rate: f64,
    noise: &Normal<f64>,
    lower: f64,
    upper: f64,
    rng: &mut R,
) -> Result<(), WeightError> {
    let mut mutated = false;

    for weight in weights.iter_mut() {
        if rng.gen::<f64>() < mutation_rate {
            *weight += noise.sample(rng);
            mutated = true;
        }
    }

    if mutated {
        clip(weights, lower, upper);
        normalize(weights)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PERTURBATION;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn noise() -> Normal<f64> {
        Normal::new(0.0, PERTURBATION).unwrap()
    }

    #[test]
    fn test_elite_count() {
        assert_eq!(elite_count(19), 0);
        assert_eq!(elite_count(20), 1);
        assert_eq!(elite_count(100), 5);
        assert_eq!(elite_count(119), 5);
    }

    #[test]
    fn test_initialize_population_respects_bounds() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let population = initialize_population(25, 4, 0.0, 1.0, &mut rng).unwrap();
        assert_eq!(population.len(), 25);
        for weights in population.iter() {
            assert_eq!(weights.len(), 4);
            let sum: f64 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "Weights should sum to 1. Got {}", sum);
            assert!(weights.iter().all(|&w| w >= 0.0));
        }

        assert_eq!(
            initialize_population(3, 0, 0.0, 1.0, &mut rng),
            Err(WeightError::Empty)
        );
    }

    #[test]
    fn test_initialize_population_with_empty_bounds_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let result = initialize_population(3, 4, 0.0, 0.0, &mut rng);
        assert!(matches!(result, Err(WeightError::DegenerateSum(_))));
    }

    #[test]
    fn test_tournament_favours_low_fitness() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let fitnesses = [0.0, 1.0, 2.0];
        let mut wins = [0usize; 3];
        for _ in 0..300 {
            wins[tournament_selection(&fitnesses, &mut rng)] += 1;
        }
        // the worst individual only wins when it is drawn three times in a row
        assert!(wins[0] > wins[1]);
        assert!(wins[1] > wins[2]);

        assert_eq!(tournament_selection(&[5.0], &mut rng), 0);
    }

    #[test]
    fn test_crossover_extremes() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let parent_1 = [0.5, 0.5, 0.0];
        let parent_2 = [0.0, 0.25, 0.75];

        let (child_1, child_2) = crossover(&parent_1, &parent_2, 0.0, &mut rng).unwrap();
        assert_eq!(child_1, parent_1.to_vec());
        assert_eq!(child_2, parent_2.to_vec());

        let (child_1, child_2) = crossover(&parent_1, &parent_2, 1.0, &mut rng).unwrap();
        assert_eq!(child_1, parent_2.to_vec());
        assert_eq!(child_2, parent_1.to_vec());
    }

    #[test]
    fn test_crossover_renormalizes_children() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let parent_1 = [0.7, 0.1, 0.1, 0.1];
        let parent_2 = [0.1, 0.1, 0.1, 0.7];
        for _ in 0..50 {
            let (child_1, child_2) = crossover(&parent_1, &parent_2, 0.5, &mut rng).unwrap();
            for child in [child_1, child_2] {
                let sum: f64 = child.iter().sum();
                assert!((sum - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_crossover_of_empty_children_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let result = crossover(&[0.0, 0.0], &[0.0, 0.0], 0.5, &mut rng);
        assert!(matches!(result, Err(WeightError::DegenerateSum(_))));
    }

    #[test]
    fn test_mutate_without_mutation_leaves_weights_alone() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        // deliberately unnormalized: a no-op mutation must not renormalize
        let mut weights = vec![0.2, 0.2, 0.2];
        mutate(&mut weights, 0.0, &noise(), 0.0, 1.0, &mut rng).unwrap();
        assert_eq!(weights, vec![0.2, 0.2, 0.2]);
    }

    #[test]
    fn test_mutate_clips_and_renormalizes() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let original = vec![0.25, 0.25, 0.25, 0.25];
        let mut weights = original.clone();
        mutate(&mut weights, 1.0, &noise(), 0.0, 1.0, &mut rng).unwrap();

        assert_ne!(weights, original);
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_mutate_into_zero_bounds_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut weights = vec![0.5, 0.5];
        let result = mutate(&mut weights, 1.0, &noise(), 0.0, 0.0, &mut rng);
        assert!(matches!(result, Err(WeightError::DegenerateSum(_))));
    }
}
