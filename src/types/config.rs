use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::utils::matrix::{default_pivot_tolerance, Matrix, Vector};

/// Initial conditions and noise parameters of an `N`-state, `M`-measurement filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Float + Deserialize<'de>"
))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EkfConfig<T, const N: usize, const M: usize> {
    /// Initial state estimate
    pub state: Vector<T, N>,
    /// Initial state covariance
    pub covariance: Matrix<T, N, N>,
    /// Process noise covariance, `Q`
    pub process_noise: Matrix<T, N, N>,
    /// Measurement noise covariance, `R`
    pub measurement_noise: Matrix<T, M, M>,
    /// Relative pivot threshold for inverting the innovation covariance
    #[serde(default = "default_pivot_tolerance")]
    pub pivot_tolerance: T,
}

impl<T: Float, const N: usize, const M: usize> EkfConfig<T, N, M> {
    pub fn new() -> Self {
        Self {
            state: Vector::zeros(),
            covariance: Matrix::zeros(),
            process_noise: Matrix::zeros(),
            measurement_noise: Matrix::zeros(),
            pivot_tolerance: default_pivot_tolerance(),
        }
    }

    pub fn with_state(mut self, state: Vector<T, N>) -> Self {
        self.state = state;
        self
    }

    pub fn with_covariance(mut self, covariance: Matrix<T, N, N>) -> Self {
        self.covariance = covariance;
        self
    }

    pub fn with_process_noise(mut self, process_noise: Matrix<T, N, N>) -> Self {
        self.process_noise = process_noise;
        self
    }

    pub fn with_measurement_noise(mut self, measurement_noise: Matrix<T, M, M>) -> Self {
        self.measurement_noise = measurement_noise;
        self
    }

    pub fn with_pivot_tolerance(mut self, pivot_tolerance: T) -> Self {
        self.pivot_tolerance = pivot_tolerance;
        self
    }
}

impl<T: Float, const N: usize, const M: usize> Default for EkfConfig<T, N, M> {
    fn default() -> Self {
        Self::new()
    }
}
