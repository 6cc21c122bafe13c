//! Primitive functions available to function genes.
//!
//! The search never executes a primitive itself. A [`Primitive`] is only a
//! name the model-building collaborator understands plus the number of inputs
//! it consumes, which is all the genotype needs to size and constrain its
//! connections.

use serde::{Deserialize, Serialize};

/// A named operation a function gene can select, with its declared arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Primitive {
    /// Identifier handed to the model builder (e.g. `"conv_64_3x3"`).
    pub name: String,
    /// Number of inputs the primitive consumes. Must be at least 1.
    pub arity: usize,
}

impl Primitive {
    /// Create a primitive with an explicit arity.
    #[must_use]
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    /// A single-input primitive (convolutions, pooling, activations).
    #[must_use]
    pub fn unary(name: impl Into<String>) -> Self {
        Self::new(name, 1)
    }

    /// A two-input primitive (element-wise sum, concatenation).
    #[must_use]
    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, 2)
    }

    /// Build a function set from parallel name and arity lists.
    ///
    /// Returns `None` when the lists differ in length; arity validation is
    /// left to [`CgpConfig::validate`](crate::CgpConfig::validate).
    #[must_use]
    pub fn zip<S: Into<String>>(names: Vec<S>, arities: &[usize]) -> Option<Vec<Self>> {
        if names.len() != arities.len() {
            return None;
        }
        Some(
            names
                .into_iter()
                .zip(arities)
                .map(|(name, &arity)| Self::new(name, arity))
                .collect(),
        )
    }

    /// Convolutional cell primitives for image classifiers.
    ///
    /// Merge operations (`sum`, `concat`) are binary; the collaborator is
    /// expected to reconcile spatial and channel shapes of their inputs.
    #[must_use]
    pub fn conv_cells() -> Vec<Self> {
        vec![
            Self::unary("conv_32_3x3"),
            Self::unary("conv_64_3x3"),
            Self::unary("conv_128_3x3"),
            Self::unary("conv_64_5x5"),
            Self::unary("max_pool_2x2"),
            Self::unary("avg_pool_2x2"),
            Self::binary("sum"),
            Self::binary("concat"),
        ]
    }

    /// Depthwise-separable primitives for compact mobile networks.
    #[must_use]
    pub fn mobile_cells() -> Vec<Self> {
        vec![
            Self::unary("depthwise_conv_3x3"),
            Self::unary("pointwise_conv_64"),
            Self::unary("pointwise_conv_128"),
            Self::unary("channel_shuffle"),
            Self::unary("max_pool_2x2"),
            Self::binary("sum"),
            Self::binary("concat"),
        ]
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// Largest arity in a function set, or 0 for an empty set.
#[inline]
#[must_use]
pub fn max_arity(functions: &[Primitive]) -> usize {
    functions.iter().map(|f| f.arity).max().unwrap_or(0)
}
