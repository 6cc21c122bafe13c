//! Grid topology rules.
//!
//! Every connection a gene may hold is decided here. Nodes only read from
//! external inputs or from nodes in strictly earlier columns, at most
//! `level_back` columns away, so any genotype built or mutated through
//! [`legal_range`] is acyclic without runtime checks. Output genes sit in a
//! virtual column `cols` after the grid.

use std::collections::VecDeque;
use std::ops::Range;

use crate::config::CgpConfig;
use crate::gene::Gene;

/// Column of a gene position. Output genes are clamped to `cols`.
#[inline]
#[must_use]
pub fn column(config: &CgpConfig, position: usize) -> usize {
    (position / config.rows).min(config.cols)
}

/// Half-open range of connection ids legal for the gene at `position`.
///
/// External inputs are part of the range only for columns `< level_back`.
#[inline]
#[must_use]
pub fn legal_range(config: &CgpConfig, position: usize) -> Range<usize> {
    let col = column(config, position);
    let max_id = col * config.rows + config.num_inputs;
    let min_id = match col.checked_sub(config.level_back) {
        Some(first) => first * config.rows + config.num_inputs,
        None => 0,
    };
    min_id..max_id
}

/// Whether `id` is a legal connection for the gene at `position`.
#[inline]
#[must_use]
pub fn is_legal(config: &CgpConfig, position: usize, id: usize) -> bool {
    legal_range(config, position).contains(&id)
}

/// Detect a cycle among the used connections using Kahn's algorithm.
///
/// A verification helper for tests and hand-built gene sequences. Genotypes
/// that pass [`Individual::validate`](crate::Individual::validate) only hold
/// connections from their legal ranges and cannot contain a cycle.
#[must_use]
pub fn has_cycle(genes: &[Gene], num_inputs: usize) -> bool {
    let n = genes.len();
    let mut in_degree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (idx, gene) in genes.iter().enumerate() {
        for &id in gene.inputs() {
            let Some(source) = id.checked_sub(num_inputs) else {
                continue;
            };
            if source < n {
                successors[source].push(idx);
                in_degree[idx] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&idx| in_degree[idx] == 0).collect();
    let mut processed = 0;
    while let Some(u) = queue.pop_front() {
        processed += 1;
        for &v in &successors[u] {
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    processed != n
}
