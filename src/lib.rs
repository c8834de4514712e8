#![no_std]

// Logging macros for either defmt or log
#[macro_use]
mod logging;

pub mod errors;
pub mod estimators;
pub mod types;
pub mod utils;

pub use errors::{DimensionMismatch, EkfError, SingularMatrixError};
pub use estimators::extended_kalman::{Ekf, ExtendedKalman};
pub use estimators::linear_kalman::{LinearMeasurement, LinearProcess};
pub use estimators::{MeasurementModel, ProcessModel};
pub use types::config::EkfConfig;
pub use utils::matrix::{Matrix, Vector, DEFAULT_PIVOT_TOLERANCE};

// Re-exported for implementors
pub use nalgebra;
pub use num_traits;
