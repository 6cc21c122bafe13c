//! Gene types for CGP genotypes.
//!
//! A genotype is a flat sequence of [`Gene`]s: `rows * cols` function genes in
//! column-major grid order followed by the output genes. Connections address a
//! unified id space where `0..num_inputs` are the external inputs and
//! `num_inputs + i` is the output of grid node `i`.

use serde::{Deserialize, Serialize};

/// One cell of the genotype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gene {
    /// A call site of a primitive from the function set.
    Function {
        /// Index into the configured function set.
        function: usize,
        /// Number of leading `connections` the selected primitive consumes.
        arity: usize,
        /// Fixed-capacity connection array (`max_arity` slots). Slots past
        /// `arity` are unused but kept in range so a later function change
        /// can expose them.
        connections: Vec<usize>,
    },
    /// An output selector reading a single upstream value.
    Output {
        /// Id of the input or node feeding this output.
        connection: usize,
    },
}

impl Gene {
    /// Create a function gene.
    #[must_use]
    pub fn function(function: usize, arity: usize, connections: Vec<usize>) -> Self {
        debug_assert!(arity <= connections.len());
        Self::Function {
            function,
            arity,
            connections,
        }
    }

    /// Create an output gene.
    #[must_use]
    pub fn output(connection: usize) -> Self {
        Self::Output { connection }
    }

    #[inline]
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output { .. })
    }

    /// Selected function index, `None` for output genes.
    #[inline]
    #[must_use]
    pub fn function_index(&self) -> Option<usize> {
        match self {
            Self::Function { function, .. } => Some(*function),
            Self::Output { .. } => None,
        }
    }

    /// Number of connections actually read by this gene.
    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Function { arity, .. } => *arity,
            Self::Output { .. } => 1,
        }
    }

    /// The connections this gene reads (the first `arity` slots).
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[usize] {
        match self {
            Self::Function {
                arity, connections, ..
            } => &connections[..*arity],
            Self::Output { connection } => std::slice::from_ref(connection),
        }
    }

    /// Every connection slot, used or not.
    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[usize] {
        match self {
            Self::Function { connections, .. } => connections,
            Self::Output { connection } => std::slice::from_ref(connection),
        }
    }

    /// Mutable access to every connection slot.
    #[inline]
    pub fn slots_mut(&mut self) -> &mut [usize] {
        match self {
            Self::Function { connections, .. } => connections,
            Self::Output { connection } => std::slice::from_mut(connection),
        }
    }
}
