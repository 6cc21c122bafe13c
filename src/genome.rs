//! CGP genotype: a fixed grid of genes plus outputs, the derived active mask,
//! and the fitness assigned by an external evaluator.

use std::any::Any;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::CgpConfig;
use crate::gene::Gene;
use crate::reachability::{mark_active_into, ActiveNetwork};
use crate::topology::legal_range;

/// Opaque handle produced by the evaluator (typically the realized model).
pub type Artifact = Arc<dyn Any + Send + Sync>;

/// Objective values assigned by external evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    /// Quality score; the comparator decides which direction is better.
    pub score: f64,
    /// Structural cost such as the parameter count of the realized model.
    pub structural_cost: f64,
    /// Raw accuracy reported alongside the score.
    pub accuracy: f64,
}

impl Fitness {
    /// Sentinel reported for genotypes that failed to decode or train.
    ///
    /// Finite on purpose so it survives a JSON checkpoint.
    pub const WORST: Self = Self {
        score: f64::MIN,
        structural_cost: f64::MAX,
        accuracy: f64::MIN,
    };

    #[must_use]
    pub fn new(score: f64, structural_cost: f64, accuracy: f64) -> Self {
        Self {
            score,
            structural_cost,
            accuracy,
        }
    }

    /// Whether the score may take part in selection (strictly positive).
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.score > 0.0
    }
}

/// Structural problems found by [`Individual::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenotypeError {
    #[error("expected {expected} genes, found {found}")]
    GeneCount { expected: usize, found: usize },
    #[error("active mask has {found} entries for {expected} genes")]
    MaskLength { expected: usize, found: usize },
    #[error("gene {position} has the wrong kind for its position")]
    MisplacedGene { position: usize },
    #[error("gene {position} selects unknown function {function}")]
    UnknownFunction { position: usize, function: usize },
    #[error("gene {position} has arity {found}, its function declares {expected}")]
    ArityMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },
    #[error("gene {position} has {found} connection slots, expected {expected}")]
    SlotCount {
        position: usize,
        expected: usize,
        found: usize,
    },
    #[error("gene {position} connects to {id}, outside its legal range")]
    IllegalConnection { position: usize, id: usize },
}

/// A CGP individual.
///
/// `genes` holds `num_nodes` function genes in column-major grid order
/// followed by `num_outputs` output genes. `active` is only meaningful after
/// [`mark_active`](Self::mark_active) ran on the current genes; every
/// operation in this crate that changes genes recomputes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    /// Configuration shared by every individual of a run.
    pub config: Arc<CgpConfig>,
    /// Genes in grid order, outputs last. Empty until spawned.
    pub genes: Vec<Gene>,
    /// Which genes influence at least one output.
    pub active: Vec<bool>,
    /// Set by evaluation, cleared when the genes change.
    pub fitness: Option<Fitness>,
    /// Evaluation by-product; never persisted.
    #[serde(skip)]
    pub artifact: Option<Artifact>,
}

impl Individual {
    /// Create an individual without genes.
    ///
    /// The first [`mutate`](Self::mutate) call initializes it randomly.
    #[must_use]
    pub fn new(config: Arc<CgpConfig>) -> Self {
        Self {
            config,
            genes: Vec::new(),
            active: Vec::new(),
            fitness: None,
            artifact: None,
        }
    }

    /// Create an individual with random genes.
    #[must_use]
    pub fn spawn<R: Rng>(config: Arc<CgpConfig>, rng: &mut R) -> Self {
        let mut individual = Self::new(config);
        individual.init_genes(rng);
        individual
    }

    /// Replace all genes with random ones and recompute the active mask.
    ///
    /// Every connection slot, including slots beyond the selected function's
    /// arity, is drawn from the gene's legal range.
    pub fn init_genes<R: Rng>(&mut self, rng: &mut R) {
        let config = Arc::clone(&self.config);
        let num_nodes = config.num_nodes();
        let max_arity = config.max_arity();

        self.genes = (0..config.num_genes())
            .map(|position| {
                let range = legal_range(&config, position);
                if position < num_nodes {
                    let function = rng.random_range(0..config.num_functions());
                    let connections = (0..max_arity)
                        .map(|_| rng.random_range(range.clone()))
                        .collect();
                    Gene::function(function, config.functions[function].arity, connections)
                } else {
                    Gene::output(rng.random_range(range))
                }
            })
            .collect();

        self.active = vec![false; self.genes.len()];
        self.mark_active();
        self.clear_fitness();
    }

    /// Whether the individual holds genes.
    #[inline]
    #[must_use]
    pub fn is_spawned(&self) -> bool {
        !self.genes.is_empty()
    }

    /// Recompute the active mask from the current genes.
    pub fn mark_active(&mut self) {
        self.active.resize(self.genes.len(), false);
        mark_active_into(&self.config, &self.genes, &mut self.active);
    }

    /// Number of active genes, outputs included.
    #[must_use]
    pub fn num_active_nodes(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Decode the expressed genes into a dense network description.
    #[must_use]
    pub fn active_network(&self) -> ActiveNetwork {
        ActiveNetwork::decode(&self.config, &self.genes, &self.active)
    }

    /// Score of the last evaluation, if any.
    #[inline]
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        self.fitness.map(|f| f.score)
    }

    /// Record the outcome of an evaluation.
    pub fn set_fitness(&mut self, fitness: Fitness, artifact: Option<Artifact>) {
        self.fitness = Some(fitness);
        self.artifact = artifact;
    }

    /// Forget the fitness and artifact of a previous evaluation.
    pub fn clear_fitness(&mut self) {
        self.fitness = None;
        self.artifact = None;
    }

    /// Borrow the evaluation artifact as a concrete type.
    #[must_use]
    pub fn artifact<T: Any>(&self) -> Option<&T> {
        self.artifact.as_deref()?.downcast_ref::<T>()
    }

    /// Check the genes against the configuration.
    ///
    /// Used on genotypes that did not come from this crate's own
    /// initialization and mutation (e.g. checkpoints).
    ///
    /// # Errors
    ///
    /// Returns the first structural violation found.
    pub fn validate(&self) -> Result<(), GenotypeError> {
        let config = &self.config;
        let num_nodes = config.num_nodes();
        let max_arity = config.max_arity();

        if self.genes.len() != config.num_genes() {
            return Err(GenotypeError::GeneCount {
                expected: config.num_genes(),
                found: self.genes.len(),
            });
        }
        if self.active.len() != self.genes.len() {
            return Err(GenotypeError::MaskLength {
                expected: self.genes.len(),
                found: self.active.len(),
            });
        }

        for (position, gene) in self.genes.iter().enumerate() {
            match gene {
                Gene::Function {
                    function,
                    arity,
                    connections,
                } => {
                    if position >= num_nodes {
                        return Err(GenotypeError::MisplacedGene { position });
                    }
                    let Some(primitive) = config.functions.get(*function) else {
                        return Err(GenotypeError::UnknownFunction {
                            position,
                            function: *function,
                        });
                    };
                    if *arity != primitive.arity {
                        return Err(GenotypeError::ArityMismatch {
                            position,
                            expected: primitive.arity,
                            found: *arity,
                        });
                    }
                    if connections.len() != max_arity {
                        return Err(GenotypeError::SlotCount {
                            position,
                            expected: max_arity,
                            found: connections.len(),
                        });
                    }
                }
                Gene::Output { .. } => {
                    if position < num_nodes {
                        return Err(GenotypeError::MisplacedGene { position });
                    }
                }
            }

            let range = legal_range(config, position);
            if let Some(&id) = gene.slots().iter().find(|id| !range.contains(id)) {
                return Err(GenotypeError::IllegalConnection { position, id });
            }
        }

        Ok(())
    }
}
