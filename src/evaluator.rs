//! The fitness-evaluation boundary.
//!
//! Turning an active network into a model and training it is outside this
//! crate. The search loop talks to that collaborator through
//! [`FitnessEvaluator`]: one call per candidate, a comparator that owns the
//! objective direction, and a notification when the parent is replaced.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::genome::{Artifact, Fitness, Individual};

/// Result of evaluating one individual.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub fitness: Fitness,
    pub artifact: Option<Artifact>,
}

impl Evaluation {
    #[must_use]
    pub fn new(score: f64, structural_cost: f64, accuracy: f64) -> Self {
        Self {
            fitness: Fitness::new(score, structural_cost, accuracy),
            artifact: None,
        }
    }

    /// Attach the realized model (or any other by-product).
    #[must_use]
    pub fn with_artifact<A: Any + Send + Sync>(mut self, artifact: A) -> Self {
        self.artifact = Some(Arc::new(artifact));
        self
    }

    /// The worst-case sentinel for a candidate that could not be evaluated.
    #[must_use]
    pub fn failure() -> Self {
        Self {
            fitness: Fitness::WORST,
            artifact: None,
        }
    }
}

/// Recoverable evaluation failures.
///
/// These never abort a run: the loop records the evaluator's
/// [`worst`](FitnessEvaluator::worst) fitness instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// The active network could not be realized as a model. The loop may
    /// remutate the candidate and try again.
    #[error("genotype cannot be realized as a model: {0}")]
    Undecodable(String),
    /// Building succeeded but training or scoring failed.
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Evaluates candidates for the search loop.
///
/// Calls for the children of one generation may run concurrently, each with
/// a distinct `child_index`, so evaluators must be [`Send`] and [`Sync`].
/// Shared mutable state (e.g. an [`ArtifactStore`]) must synchronize itself
/// and must not hold its lock across a training run.
pub trait FitnessEvaluator: Send + Sync {
    /// Evaluate `individual`.
    ///
    /// `child_index` is 0 for the bootstrap parent and 1-based for children;
    /// `generation` is 0 for the bootstrap and counts up from 1.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] for candidates that could not be built
    /// or trained.
    fn evaluate(
        &self,
        individual: &Individual,
        child_index: usize,
        generation: usize,
    ) -> Result<Evaluation, EvaluationError>;

    /// Whether `candidate` is strictly better than `incumbent`.
    fn is_better(&self, incumbent: f64, candidate: f64) -> bool;

    /// Fitness recorded for candidates whose evaluation returned an error.
    ///
    /// The default suits maximizing evaluators; minimizing ones should
    /// return a score their comparator never prefers.
    fn worst(&self) -> Fitness {
        Fitness::WORST
    }

    /// Called after the child at `child_index` replaced the parent.
    fn improved(&self, _child_index: usize, _score: f64) {}
}

/// Objective direction for the common comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Higher scores win (accuracy, mean IoU).
    #[default]
    Maximize,
    /// Lower scores win (loss, error rate).
    Minimize,
}

impl Direction {
    /// Strict improvement test. NaN never improves.
    #[inline]
    #[must_use]
    pub fn is_better(self, incumbent: f64, candidate: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// Artifacts keyed by child index, shared between concurrent evaluations.
///
/// Each operation takes the lock once for the single read or insert it
/// performs.
#[derive(Debug)]
pub struct ArtifactStore<A> {
    entries: Mutex<HashMap<usize, A>>,
}

impl<A> Default for ArtifactStore<A> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<A> ArtifactStore<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the artifact for `child_index`, returning the one it replaced.
    pub fn insert(&self, child_index: usize, artifact: A) -> Option<A> {
        self.lock().insert(child_index, artifact)
    }

    /// Remove and return the artifact for `child_index`.
    pub fn take(&self, child_index: usize) -> Option<A> {
        self.lock().remove(&child_index)
    }

    /// Clone out the artifact for `child_index`.
    #[must_use]
    pub fn get(&self, child_index: usize) -> Option<A>
    where
        A: Clone,
    {
        self.lock().get(&child_index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic in another evaluation thread leaves the map itself intact.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, A>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction() {
        assert!(Direction::Maximize.is_better(0.5, 0.6));
        assert!(!Direction::Maximize.is_better(0.6, 0.6));
        assert!(Direction::Minimize.is_better(0.5, 0.4));
        assert!(!Direction::Minimize.is_better(0.5, f64::NAN));
        assert!(!Direction::Maximize.is_better(0.5, f64::NAN));
    }

    #[test]
    fn test_failure_is_worst() {
        let eval = Evaluation::failure();
        assert_eq!(eval.fitness, Fitness::WORST);
        assert!(!eval.fitness.is_valid());
        assert!(eval.artifact.is_none());
    }

    #[test]
    fn test_with_artifact() {
        let eval = Evaluation::new(0.8, 1000.0, 0.8).with_artifact(vec![1u8, 2, 3]);
        let artifact = eval.artifact.unwrap();
        assert_eq!(artifact.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_artifact_store() {
        let store = ArtifactStore::new();
        assert!(store.is_empty());
        assert_eq!(store.insert(1, "a".to_string()), None);
        assert_eq!(store.insert(1, "b".to_string()), Some("a".to_string()));
        store.insert(2, "c".to_string());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1), Some("b".to_string()));
        assert_eq!(store.take(2), Some("c".to_string()));
        assert_eq!(store.take(2), None);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_artifact_store_concurrent_inserts() {
        let store = Arc::new(ArtifactStore::new());
        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.insert(i, i * 10);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        assert_eq!(store.get(3), Some(30));
    }
}
