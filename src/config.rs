//! Grid and function-set configuration for a CGP run.

use serde::{Deserialize, Serialize};

use crate::function::{max_arity, Primitive};

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Function set must contain at least one primitive")]
    EmptyFunctionSet,
    #[error("Function list has {functions} entries but arity list has {arities}")]
    ArityMismatch { functions: usize, arities: usize },
    #[error("Function {0:?} declares zero inputs")]
    ZeroArity(String),
    #[error("Grid dimensions must be non-zero (rows={rows}, cols={cols})")]
    InvalidGrid { rows: usize, cols: usize },
    #[error("Level-back must be at least 1")]
    InvalidLevelBack,
    #[error("Mutation rate must be in (0, 1], got {0}")]
    InvalidMutationRate(f32),
    #[error("Graph must have at least one external input")]
    NoInputs,
    #[error("Graph must have at least one output")]
    NoOutputs,
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for genotype layout and mutation.
///
/// Shared by reference (`Arc`) between every individual of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgpConfig {
    /// Number of rows of the node grid.
    pub rows: usize,
    /// Number of columns of the node grid.
    pub cols: usize,
    /// Maximum number of columns a connection may reach backwards.
    pub level_back: usize,
    /// Primitives a function gene may select, in index order.
    pub functions: Vec<Primitive>,
    /// External inputs feeding the graph.
    pub num_inputs: usize,
    /// Output genes placed after the grid.
    pub num_outputs: usize,
    /// Fraction of genes perturbed per mutation call.
    pub mutation_rate: f32,
}

impl Default for CgpConfig {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 10,
            level_back: 5,
            functions: Primitive::conv_cells(),
            num_inputs: 1,
            num_outputs: 1,
            mutation_rate: 0.1,
        }
    }
}

impl CgpConfig {
    /// Build a configuration from parallel function-name and arity lists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ArityMismatch`] when the lists differ in length,
    /// or any other [`ConfigError`] raised by [`validate`](Self::validate).
    pub fn new<S: Into<String>>(
        rows: usize,
        cols: usize,
        level_back: usize,
        functions: Vec<S>,
        arities: &[usize],
        mutation_rate: f32,
    ) -> Result<Self, ConfigError> {
        let names = functions.len();
        let functions = Primitive::zip(functions, arities).ok_or(ConfigError::ArityMismatch {
            functions: names,
            arities: arities.len(),
        })?;

        let config = Self {
            rows,
            cols,
            level_back,
            functions,
            mutation_rate,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input, otherwise any error
    /// raised by [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// A small grid with the convolutional cell preset, handy for tests.
    #[must_use]
    pub fn small(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            level_back: cols,
            mutation_rate: 0.2,
            ..Default::default()
        }
    }

    /// Check every structural invariant of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::InvalidGrid {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.level_back == 0 {
            return Err(ConfigError::InvalidLevelBack);
        }
        if self.functions.is_empty() {
            return Err(ConfigError::EmptyFunctionSet);
        }
        if let Some(f) = self.functions.iter().find(|f| f.arity == 0) {
            return Err(ConfigError::ZeroArity(f.name.clone()));
        }
        if !(self.mutation_rate > 0.0 && self.mutation_rate <= 1.0) {
            return Err(ConfigError::InvalidMutationRate(self.mutation_rate));
        }
        if self.num_inputs == 0 {
            return Err(ConfigError::NoInputs);
        }
        if self.num_outputs == 0 {
            return Err(ConfigError::NoOutputs);
        }
        Ok(())
    }

    /// Number of function genes on the grid.
    #[inline]
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.rows * self.cols
    }

    /// Total number of genes (grid nodes plus outputs).
    #[inline]
    #[must_use]
    pub fn num_genes(&self) -> usize {
        self.num_nodes() + self.num_outputs
    }

    /// Capacity of every function gene's connection array.
    #[inline]
    #[must_use]
    pub fn max_arity(&self) -> usize {
        max_arity(&self.functions)
    }

    /// Number of primitives in the function set.
    #[inline]
    #[must_use]
    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }
}
