//! Reachability analysis and active-network decoding.
//!
//! Only genes that feed at least one output are ever realized as a model.
//! [`mark_active`] finds them with a backward depth-first walk from the
//! output genes; [`ActiveNetwork`] compacts them into a dense node list the
//! model builder can consume directly.

use serde::{Deserialize, Serialize};

use crate::config::CgpConfig;
use crate::gene::Gene;

/// Compute the active mask of a gene sequence.
#[must_use]
pub fn mark_active(config: &CgpConfig, genes: &[Gene]) -> Vec<bool> {
    let mut active = vec![false; genes.len()];
    mark_active_into(config, genes, &mut active);
    active
}

/// Recompute `active` in place.
///
/// Iterative DFS with the mask doubling as the visited set, so each active
/// gene is expanded exactly once per call.
pub fn mark_active_into(config: &CgpConfig, genes: &[Gene], active: &mut [bool]) {
    debug_assert_eq!(genes.len(), active.len());
    active.fill(false);

    let num_inputs = config.num_inputs;
    let mut stack: Vec<usize> = Vec::with_capacity(genes.len());

    for output in config.num_nodes()..genes.len() {
        stack.push(output);
        while let Some(node) = stack.pop() {
            if active[node] {
                continue;
            }
            active[node] = true;

            for &id in genes[node].inputs() {
                if id >= num_inputs {
                    stack.push(id - num_inputs);
                }
            }
        }
    }
}

/// Role of a node in a decoded network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveKind {
    /// External input `index`.
    Input(usize),
    /// A function gene calling the named primitive.
    Function { function: usize, name: String },
    /// An output gene.
    Output(usize),
}

/// One node of the decoded network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveNode {
    pub kind: ActiveKind,
    /// Position of the originating gene, `None` for external inputs.
    pub position: Option<usize>,
    /// Dense ids of the nodes feeding this one.
    pub inputs: Vec<usize>,
}

/// The expressed part of a genotype with dense node ids.
///
/// Nodes are ordered inputs first, then active genes in grid order, so a
/// node's dense id is its index in [`nodes`](Self::nodes) and every node only
/// reads from lower ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveNetwork {
    pub nodes: Vec<ActiveNode>,
}

impl ActiveNetwork {
    /// Decode the active genes of a genotype.
    #[must_use]
    pub fn decode(config: &CgpConfig, genes: &[Gene], active: &[bool]) -> Self {
        let num_inputs = config.num_inputs;

        // dense[id] for every id in the unified connection space.
        let mut dense = Vec::with_capacity(num_inputs + genes.len());
        dense.extend(0..num_inputs);
        let mut next = num_inputs;
        for &is_active in active {
            dense.push(next);
            if is_active {
                next += 1;
            }
        }

        let mut nodes: Vec<ActiveNode> = (0..num_inputs)
            .map(|i| ActiveNode {
                kind: ActiveKind::Input(i),
                position: None,
                inputs: Vec::new(),
            })
            .collect();

        let mut output_index = 0;
        for (position, gene) in genes.iter().enumerate() {
            if !active[position] {
                continue;
            }
            let kind = match gene {
                Gene::Function { function, .. } => ActiveKind::Function {
                    function: *function,
                    name: config.functions[*function].name.clone(),
                },
                Gene::Output { .. } => {
                    output_index += 1;
                    ActiveKind::Output(output_index - 1)
                }
            };
            nodes.push(ActiveNode {
                kind,
                position: Some(position),
                inputs: gene.inputs().iter().map(|&id| dense[id]).collect(),
            });
        }

        Self { nodes }
    }

    /// Number of function nodes in the network.
    #[must_use]
    pub fn num_functions(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, ActiveKind::Function { .. }))
            .count()
    }

    /// Dense ids of the output nodes, in output order.
    #[must_use]
    pub fn output_ids(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, ActiveKind::Output(_)))
            .map(|(id, _)| id)
            .collect()
    }
}
