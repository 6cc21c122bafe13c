//! JSON persistence of the best individual.
//!
//! A checkpoint holds the genes, active mask, configuration and fitness of
//! one individual. Evaluation artifacts are never written.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CgpConfig, ConfigError};
use crate::genome::{GenotypeError, Individual};

/// Errors reading or writing a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checkpoint is not valid JSON for an individual: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Checkpoint configuration is invalid: {0}")]
    Config(#[from] ConfigError),
    #[error("Checkpoint was written for a different configuration")]
    ConfigMismatch,
    #[error("Checkpoint genotype is invalid: {0}")]
    Genotype(#[from] GenotypeError),
}

/// Write `individual` to `path` as pretty-printed JSON.
///
/// The parent directory must already exist.
///
/// # Errors
///
/// Returns [`CheckpointError::Io`] if the file cannot be written.
pub fn save<P: AsRef<Path>>(path: P, individual: &Individual) -> Result<(), CheckpointError> {
    let json = serde_json::to_string_pretty(individual)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read an individual written by [`save`].
///
/// Returns `Ok(None)` if nothing exists at `path`. The loaded individual
/// shares `config` and has its active mask recomputed from its genes.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, if its
/// configuration differs from `config`, or if its genes violate the
/// configuration's topology rules.
pub fn load<P: AsRef<Path>>(
    path: P,
    config: &Arc<CgpConfig>,
) -> Result<Option<Individual>, CheckpointError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut individual: Individual = serde_json::from_str(&content)?;
    individual.config.validate()?;
    if *individual.config != **config {
        return Err(CheckpointError::ConfigMismatch);
    }
    individual.config = Arc::clone(config);

    // Stored masks are not trusted; only their length is checked.
    individual.validate()?;
    individual.mark_active();

    Ok(Some(individual))
}
