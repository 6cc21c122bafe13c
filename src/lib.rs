//! # CGP Search
//!
//! Cartesian Genetic Programming for neural architecture search.
//!
//! A genotype is a fixed grid of function genes (each naming a network cell
//! such as a 3x3 convolution or a pooling layer) plus output genes. Only the
//! genes reachable backwards from the outputs are expressed. A (1 + λ)
//! evolution strategy mutates the best genotype found so far and hands every
//! child to an external evaluator that builds and trains the model.
//!
//! ## Features
//!
//! - **Acyclic by construction**: every connection is drawn from the gene's
//!   legal range (earlier columns within `level_back`, or external inputs),
//!   so no genotype this crate produces can contain a cycle
//! - **Forced mutation**: children are mutated until their expressed network
//!   differs from the parent's, so no evaluation is spent on a clone
//! - **Pareto ranking**: fast non-dominated sort over (score, structural cost)
//! - **Pluggable evaluation**: [`FitnessEvaluator`] owns model building,
//!   training and the comparison direction; children can be evaluated
//!   concurrently with the `parallel` feature
//! - **Checkpoints**: the best genotype is persisted as JSON and can be
//!   resumed from
//!
//! ## Quick Start
//!
//! ```rust
//! use cgp_search::{
//!     Cgp, CgpConfig, Evaluation, EvaluationError, FitnessEvaluator, Individual, RunOptions,
//! };
//!
//! // Prefers small networks that still use several cells.
//! struct Compact;
//!
//! impl FitnessEvaluator for Compact {
//!     fn evaluate(
//!         &self,
//!         individual: &Individual,
//!         _child_index: usize,
//!         _generation: usize,
//!     ) -> Result<Evaluation, EvaluationError> {
//!         let cells = individual.active_network().num_functions() as f64;
//!         Ok(Evaluation::new(1.0 / (1.0 + (cells - 4.0).abs()), cells, 0.0))
//!     }
//!
//!     fn is_better(&self, incumbent: f64, candidate: f64) -> bool {
//!         candidate > incumbent
//!     }
//! }
//!
//! let options = RunOptions {
//!     children: 4,
//!     generations: 20,
//!     seed: Some(42),
//!     ..Default::default()
//! };
//! let mut cgp = Cgp::new(CgpConfig::default(), options).unwrap();
//! let summary = cgp.run(&Compact);
//!
//! let best = cgp.parent().unwrap();
//! assert_eq!(best.fitness, summary.best);
//! println!("{} active genes", best.num_active_nodes());
//! ```
//!
//! ## Genotype Layout
//!
//! Connection ids live in one space: `0..num_inputs` are the external
//! inputs and `num_inputs + p` is the gene at position `p`. Genes are stored
//! column-major, so the gene at position `p` sits in column `p / rows`.
//! Output genes follow the grid and behave like one extra column.

pub mod checkpoint;
pub mod config;
pub mod evaluator;
pub mod evolution;
pub mod function;
pub mod gene;
pub mod genome;
pub mod mutation;
pub mod pareto;
pub mod reachability;
pub mod topology;

// Re-exports for convenience
pub use checkpoint::CheckpointError;
pub use config::{CgpConfig, ConfigError};
pub use evaluator::{ArtifactStore, Direction, Evaluation, EvaluationError, FitnessEvaluator};
pub use evolution::{Cgp, CgpError, GenerationReport, Improvement, RunOptions, RunSummary};
pub use function::Primitive;
pub use gene::Gene;
pub use genome::{Artifact, Fitness, GenotypeError, Individual};
pub use mutation::{MutationReport, MAX_FORCED_ROUNDS};
pub use pareto::{dominates, fast_non_dominated_sort, rank, Objectives};
pub use reachability::{mark_active, ActiveKind, ActiveNetwork, ActiveNode};
pub use topology::{is_legal, legal_range};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    #[test]
    fn test_config_json_roundtrip() {
        let config = CgpConfig::new(
            3,
            4,
            2,
            vec!["conv_32_3x3", "max_pool_2x2", "sum"],
            &[1, 1, 2],
            0.15,
        )
        .unwrap();

        let json = serde_json::to_string(&config).expect("Serialization failed");
        let restored = CgpConfig::from_json(&json).expect("Deserialization failed");
        assert_eq!(config, restored);
    }

    #[test]
    fn test_spawned_genotype_is_consistent() {
        let config = Arc::new(CgpConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let individual = Individual::spawn(Arc::clone(&config), &mut rng);

        individual.validate().unwrap();
        assert_eq!(individual.active, mark_active(&config, &individual.genes));

        let network = individual.active_network();
        assert_eq!(
            network.nodes.len(),
            config.num_inputs + individual.num_active_nodes()
        );
    }
}
