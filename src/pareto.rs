//! Pareto ranking over (score, structural cost).
//!
//! Implements the fast non-dominated sort of NSGA-II for two fixed
//! objectives: score is maximized, structural cost is minimized. The search
//! loop only uses it for reporting; replacement is decided by the
//! evaluator's comparator.

use crate::genome::{Fitness, Individual};

/// Anything that can be placed in objective space.
pub trait Objectives {
    /// Higher is better.
    fn score(&self) -> f64;
    /// Lower is better.
    fn structural_cost(&self) -> f64;
}

impl Objectives for Fitness {
    fn score(&self) -> f64 {
        self.score
    }

    fn structural_cost(&self) -> f64 {
        self.structural_cost
    }
}

/// Unevaluated individuals rank as [`Fitness::WORST`].
impl Objectives for Individual {
    fn score(&self) -> f64 {
        self.fitness.unwrap_or(Fitness::WORST).score
    }

    fn structural_cost(&self) -> f64 {
        self.fitness.unwrap_or(Fitness::WORST).structural_cost
    }
}

impl<T: Objectives + ?Sized> Objectives for &T {
    fn score(&self) -> f64 {
        (**self).score()
    }

    fn structural_cost(&self) -> f64 {
        (**self).structural_cost()
    }
}

/// Whether `p` dominates `q`: no worse on both objectives, strictly better
/// on at least one. Comparisons involving NaN never dominate.
#[inline]
#[must_use]
pub fn dominates<T: Objectives + ?Sized>(p: &T, q: &T) -> bool {
    let (ps, pc) = (p.score(), p.structural_cost());
    let (qs, qc) = (q.score(), q.structural_cost());
    (ps >= qs && pc < qc) || (ps > qs && pc <= qc)
}

/// Partition `population` into Pareto fronts of indices.
///
/// Front 0 holds the non-dominated individuals. Every index appears in
/// exactly one front and indices within a front keep population order.
/// Individuals with identical objectives never dominate each other and end
/// up in the same front.
#[must_use]
pub fn fast_non_dominated_sort<T: Objectives>(population: &[T]) -> Vec<Vec<usize>> {
    let n = population.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();

    let mut current = Vec::new();
    for p in 0..n {
        for q in 0..n {
            if p == q {
                continue;
            }
            if dominates(&population[p], &population[q]) {
                dominated[p].push(q);
            } else if dominates(&population[q], &population[p]) {
                domination_count[p] += 1;
            }
        }
        if domination_count[p] == 0 {
            current.push(p);
        }
    }

    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Partition `population` into Pareto fronts of references.
#[must_use]
pub fn rank<T: Objectives>(population: &[T]) -> Vec<Vec<&T>> {
    fast_non_dominated_sort(population)
        .into_iter()
        .map(|front| front.into_iter().map(|i| &population[i]).collect())
        .collect()
}
