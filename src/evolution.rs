//! The (1 + λ) search loop.
//!
//! One parent produces `children` mutated clones per generation. Every child
//! is evaluated, then children replace the parent greedily in child-index
//! order whenever the evaluator's comparator prefers them.
//!
//! ```text
//! Bootstrap -> GenerateChildren -> AwaitEvaluation -> Select -> Advance
//!                    ^                                            |
//!                    +--------------------------------------------+
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{self, CheckpointError};
use crate::config::{CgpConfig, ConfigError};
use crate::evaluator::{EvaluationError, FitnessEvaluator};
use crate::genome::{Fitness, GenotypeError, Individual};
use crate::pareto::fast_non_dominated_sort;

/// Errors raised while setting up a search.
///
/// A running search never fails: evaluation errors become the evaluator's
/// worst fitness and checkpoint write errors are logged.
#[derive(Debug, thiserror::Error)]
pub enum CgpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("At least one child per generation is required")]
    NoChildren,
    #[error("Parent was built for a different configuration")]
    ParentConfigMismatch,
    #[error("Parent genotype is invalid: {0}")]
    InvalidParent(#[from] GenotypeError),
}

/// Run-level options of the search loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Children bred from the parent each generation.
    pub children: usize,
    /// Generations performed by one [`Cgp::run`] call.
    pub generations: usize,
    /// Repeat mutation until each child's phenotype differs from the parent's.
    pub force_mutation: bool,
    /// Seed of the loop's generator; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Write the parent here whenever it is replaced.
    pub save_best: Option<PathBuf>,
    /// Evaluate the children of a generation concurrently. Only honored
    /// with the `parallel` feature.
    pub parallel_evaluation: bool,
    /// Extra forced mutations granted to a child whose genotype the
    /// evaluator could not realize.
    pub max_remutations: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            children: 2,
            generations: 10,
            force_mutation: true,
            seed: None,
            save_best: None,
            parallel_evaluation: false,
            max_remutations: 3,
        }
    }
}

/// A parent replacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub generation: usize,
    pub child_index: usize,
    pub score: f64,
}

/// Outcome of one generation.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generation: usize,
    /// Fitness of every child, in child-index order.
    pub fitness: Vec<Fitness>,
    /// Pareto fronts over `fitness`, as positions into it.
    pub fronts: Vec<Vec<usize>>,
    /// Replacements made this generation, in the order they happened.
    pub improvements: Vec<Improvement>,
    /// Checkpoint writes that failed this generation.
    pub failed_saves: usize,
}

/// Outcome of [`Cgp::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Generations performed by this call.
    pub generations: usize,
    /// Every parent replacement made by this call.
    pub improvements: Vec<Improvement>,
    /// Fitness of the final parent.
    pub best: Option<Fitness>,
    /// Checkpoint writes that failed during this call.
    pub failed_saves: usize,
}

/// Search driver owning the parent and the loop's random state.
#[derive(Debug)]
pub struct Cgp {
    config: Arc<CgpConfig>,
    options: RunOptions,
    rng: ChaCha8Rng,
    parent: Option<Individual>,
    generation: usize,
}

impl Cgp {
    /// Create a driver without a parent.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or zero children.
    pub fn new(config: CgpConfig, options: RunOptions) -> Result<Self, CgpError> {
        config.validate()?;
        if options.children == 0 {
            return Err(CgpError::NoChildren);
        }

        let seed = options.seed.unwrap_or_else(rand::random);
        debug!("search seed {seed}");

        Ok(Self {
            config: Arc::new(config),
            options,
            rng: ChaCha8Rng::seed_from_u64(seed),
            parent: None,
            generation: 0,
        })
    }

    /// Start from `parent` instead of a random genotype.
    ///
    /// A parent without fitness is replaced by a fresh random one when the
    /// search starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent's configuration differs from the
    /// driver's or its genes break the topology rules.
    pub fn with_parent(mut self, mut parent: Individual) -> Result<Self, CgpError> {
        if *parent.config != *self.config {
            return Err(CgpError::ParentConfigMismatch);
        }
        parent.config = Arc::clone(&self.config);
        if parent.is_spawned() {
            parent.validate()?;
            parent.mark_active();
        }
        self.parent = Some(parent);
        Ok(self)
    }

    /// Resume from a checkpoint written by an earlier run.
    ///
    /// A missing file starts fresh. An unreadable or incompatible checkpoint
    /// is logged and ignored.
    #[must_use]
    pub fn with_checkpoint<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        match checkpoint::load(path, &self.config) {
            Ok(Some(parent)) => {
                info!(
                    "Resuming from {} with score {:?}",
                    path.display(),
                    parent.score()
                );
                self.parent = Some(parent);
            }
            Ok(None) => info!("No checkpoint at {}, starting fresh", path.display()),
            Err(err) => warn!("Ignoring checkpoint {}: {err}", path.display()),
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Arc<CgpConfig> {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// The current parent, if the search has one yet.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&Individual> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn into_parent(self) -> Option<Individual> {
        self.parent
    }

    /// Generations completed so far (0 right after bootstrap).
    #[inline]
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Run `options.generations` generations and return what changed.
    ///
    /// The final parent stays available through [`parent`](Self::parent).
    pub fn run<E: FitnessEvaluator + ?Sized>(&mut self, evaluator: &E) -> RunSummary {
        self.bootstrap(evaluator);

        let mut improvements = Vec::new();
        let mut failed_saves = 0;
        for _ in 0..self.options.generations {
            let report = self.step(evaluator);
            improvements.extend(report.improvements);
            failed_saves += report.failed_saves;
        }

        let summary = RunSummary {
            generations: self.options.generations,
            improvements,
            best: self.parent.as_ref().and_then(|p| p.fitness),
            failed_saves,
        };
        info!(
            "Search finished after {} generations with {} improvements, best {:?}",
            summary.generations,
            summary.improvements.len(),
            summary.best.map(|f| f.score)
        );
        summary
    }

    /// Perform a single generation.
    ///
    /// A failed checkpoint write is logged and counted in
    /// [`GenerationReport::failed_saves`]; selection continues regardless.
    pub fn step<E: FitnessEvaluator + ?Sized>(&mut self, evaluator: &E) -> GenerationReport {
        let num_children = self.options.children;
        let generation = self.generation + 1;

        let parent = self.bootstrap(evaluator);
        let mut children: Vec<Individual> = (0..num_children).map(|_| parent.clone()).collect();
        let seeds: Vec<u64> = (0..num_children).map(|_| self.rng.random()).collect();

        self.evaluate_children(evaluator, &mut children, &seeds, generation);

        let fitness: Vec<Fitness> = children
            .iter()
            .map(|child| child.fitness.unwrap_or_else(|| evaluator.worst()))
            .collect();
        let fronts = fast_non_dominated_sort(&fitness);
        if let Some(front) = fronts.first() {
            let members: Vec<usize> = front.iter().map(|&i| i + 1).collect();
            debug!(
                "Generation {generation}: {} fronts, non-dominated children {members:?}",
                fronts.len()
            );
        }

        let (improvements, failed_saves) = self.select(evaluator, children, generation);
        self.generation = generation;

        info!(
            "Generation {generation}: parent score {:?}, {} improvements",
            self.parent.as_ref().and_then(Individual::score),
            improvements.len()
        );

        GenerationReport {
            generation,
            fitness,
            fronts,
            improvements,
            failed_saves,
        }
    }

    /// Make sure an evaluated parent exists and return it.
    fn bootstrap<E: FitnessEvaluator + ?Sized>(&mut self, evaluator: &E) -> &Individual {
        let parent = match self.parent.take() {
            Some(parent) if parent.fitness.is_some() => parent,
            _ => {
                let mut parent = Individual::spawn(Arc::clone(&self.config), &mut self.rng);
                evaluate_candidate(
                    evaluator,
                    &mut parent,
                    0,
                    0,
                    self.options.max_remutations,
                    &mut self.rng,
                );
                info!("Initial parent score {:?}", parent.score());
                parent
            }
        };
        self.parent.insert(parent)
    }

    #[cfg(feature = "parallel")]
    fn evaluate_children<E: FitnessEvaluator + ?Sized>(
        &self,
        evaluator: &E,
        children: &mut [Individual],
        seeds: &[u64],
        generation: usize,
    ) {
        if !self.options.parallel_evaluation {
            self.evaluate_sequential(evaluator, children, seeds, generation);
            return;
        }

        let options = &self.options;
        children
            .par_iter_mut()
            .zip(seeds.par_iter())
            .enumerate()
            .for_each(|(i, (child, &seed))| {
                breed(evaluator, child, i + 1, generation, options, seed);
            });
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_children<E: FitnessEvaluator + ?Sized>(
        &self,
        evaluator: &E,
        children: &mut [Individual],
        seeds: &[u64],
        generation: usize,
    ) {
        self.evaluate_sequential(evaluator, children, seeds, generation);
    }

    fn evaluate_sequential<E: FitnessEvaluator + ?Sized>(
        &self,
        evaluator: &E,
        children: &mut [Individual],
        seeds: &[u64],
        generation: usize,
    ) {
        for (i, (child, &seed)) in children.iter_mut().zip(seeds).enumerate() {
            breed(evaluator, child, i + 1, generation, &self.options, seed);
        }
    }

    /// Greedy replacement in child-index order. Returns the replacements
    /// and the number of checkpoint writes that failed.
    fn select<E: FitnessEvaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        children: Vec<Individual>,
        generation: usize,
    ) -> (Vec<Improvement>, usize) {
        let mut improvements = Vec::new();
        let mut failed_saves = 0;

        for (i, child) in children.into_iter().enumerate() {
            let child_index = i + 1;
            let Some(fitness) = child.fitness.filter(Fitness::is_valid) else {
                continue;
            };
            let incumbent = self
                .parent
                .as_ref()
                .and_then(Individual::score)
                .unwrap_or_else(|| evaluator.worst().score);
            if !evaluator.is_better(incumbent, fitness.score) {
                continue;
            }

            info!(
                "Generation {generation}: child {child_index} replaces parent ({incumbent:.4} -> {:.4})",
                fitness.score
            );
            self.parent = Some(child);
            evaluator.improved(child_index, fitness.score);
            improvements.push(Improvement {
                generation,
                child_index,
                score: fitness.score,
            });
            if let Err(err) = self.save_parent() {
                warn!("Generation {generation}: failed to save parent: {err}");
                failed_saves += 1;
            }
        }

        (improvements, failed_saves)
    }

    fn save_parent(&self) -> Result<(), CheckpointError> {
        let (Some(path), Some(parent)) = (&self.options.save_best, &self.parent) else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        checkpoint::save(path, parent)?;
        debug!("Saved parent to {}", path.display());
        Ok(())
    }
}

/// Mutate and evaluate one child with its own generator.
fn breed<E: FitnessEvaluator + ?Sized>(
    evaluator: &E,
    child: &mut Individual,
    child_index: usize,
    generation: usize,
    options: &RunOptions,
    seed: u64,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let report = child.mutate(&mut rng, options.force_mutation);
    if options.force_mutation && !report.phenotype_changed {
        warn!(
            "Child {child_index}: phenotype unchanged after {} mutation rounds",
            report.rounds
        );
    }
    evaluate_candidate(
        evaluator,
        child,
        child_index,
        generation,
        options.max_remutations,
        &mut rng,
    );
}

/// Evaluate `candidate`, remutating it while the evaluator reports it
/// undecodable and the remutation budget lasts.
fn evaluate_candidate<E: FitnessEvaluator + ?Sized, R: Rng>(
    evaluator: &E,
    candidate: &mut Individual,
    child_index: usize,
    generation: usize,
    max_remutations: usize,
    rng: &mut R,
) {
    let mut remutations = 0;
    loop {
        match evaluator.evaluate(candidate, child_index, generation) {
            Ok(evaluation) => {
                debug!(
                    "Generation {generation}, child {child_index}: score {:.4}, cost {:.1}, {} active genes",
                    evaluation.fitness.score,
                    evaluation.fitness.structural_cost,
                    candidate.num_active_nodes()
                );
                candidate.set_fitness(evaluation.fitness, evaluation.artifact);
                return;
            }
            Err(EvaluationError::Undecodable(reason)) if remutations < max_remutations => {
                remutations += 1;
                debug!("Child {child_index} undecodable ({reason}), remutation {remutations}");
                candidate.mutate(rng, true);
            }
            Err(err) => {
                warn!("Generation {generation}, child {child_index}: {err}");
                candidate.set_fitness(evaluator.worst(), None);
                return;
            }
        }
    }
}
