use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::crgms::CrgmsError;
use crate::core::io::tables::TableError;
use crate::core::models::ensemble::InvalidStateError;

/// Reasons an ensemble cannot be normalized into probabilities.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DegenerateEnsembleError {
    #[error("the ensemble contains no microstates")]
    Empty,
    #[error("the partition value is zero (all microstates have zero occupancy or underflow)")]
    ZeroPartition,
    #[error("the partition value is not finite ({0}); check the energy reference")]
    NonFinitePartition(f64),
}

/// A correlation that is undefined for the given residue.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InsufficientDataError {
    #[error("residue {residue} has only one possible state")]
    SingleState { residue: String },
    #[error("{quantity} of residue {residue} does not vary across the ensemble")]
    NoVariance {
        residue: String,
        quantity: String,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Format(#[from] CrgmsError),

    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Degenerate ensemble: {0}")]
    DegenerateEnsemble(#[from] DegenerateEnsembleError),

    #[error("Insufficient data: {0}")]
    InsufficientData(#[from] InsufficientDataError),

    #[error("Consistency check '{check}' failed: {detail}")]
    Consistency { check: &'static str, detail: String },

    #[error("Table output failed: {0}")]
    Table(#[from] TableError),
}
