use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EkfError {
    #[error("Dimension mismatch: {0}")]
    Dimension(#[from] DimensionMismatch),
    #[error("Singular matrix: {0}")]
    Singular(#[from] SingularMatrixError),
}

/// A runtime-sized buffer did not match the compile-time shape it was meant for.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("expected {expected} elements, found {found}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub found: usize,
}

/// The pivot chosen at elimination step `step` was too small to divide by.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("pivot at elimination step {step} is below the tolerance")]
pub struct SingularMatrixError {
    pub step: usize,
}
