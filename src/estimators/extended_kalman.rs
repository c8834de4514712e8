#![allow(non_snake_case)]

use num_traits::Float;

use super::{MeasurementModel, ProcessModel};
use crate::errors::{DimensionMismatch, EkfError, SingularMatrixError};
use crate::types::config::EkfConfig;
use crate::utils::matrix::{default_pivot_tolerance, Matrix, Vector};

/// Extended `N`-state, `M`-measurement Kalman filter.
///
/// The filter owns its process and measurement models and runs one full
/// predict-and-correct cycle every time [`update`](Self::update) is called:
///
/// 1. `Xp = f(X)`, the one step projection and linearization point
/// 2. `fy = df/dX`, evaluated by the process model
/// 3. `gXp = g(Xp)` and `H = dg/dX` at `Xp`
/// 4. `Pp = fy P fy' + Q`
/// 5. `G = Pp H' inv(H Pp H' + R)`
/// 6. `X = Xp + G (Z - gXp)`
/// 7. `P = (I - G H) Pp`
pub struct ExtendedKalman<T, Fm, Hm, const N: usize, const M: usize> {
    /// Process model, returns `f(x)` and its jacobian.
    process: Fm,

    /// Measurement model, returns `g(x)` and its jacobian.
    measurement: Hm,

    /// State estimate.
    x: Vector<T, N>,

    /// State covariance.
    P: Matrix<T, N, N>,

    /// Process noise covariance matrix.
    Q: Matrix<T, N, N>,

    /// Measurement noise covariance matrix.
    R: Matrix<T, M, M>,

    /// Kalman gain from the last successful update.
    G: Matrix<T, N, M>,

    /// Innovation `Z - g(Xp)` from the last successful update.
    y: Vector<T, M>,

    pivot_tolerance: T,
}

/// Double precision filter, the common case.
pub type Ekf<Fm, Hm, const N: usize, const M: usize> = ExtendedKalman<f64, Fm, Hm, N, M>;

impl<T, Fm, Hm, const N: usize, const M: usize> ExtendedKalman<T, Fm, Hm, N, M>
where
    T: Float,
    Fm: ProcessModel<T, N>,
    Hm: MeasurementModel<T, N, M>,
{
    /// Create a filter with zero state, covariance and noise matrices. These
    /// should be set before the first call to [`update`](Self::update).
    pub fn new(process: Fm, measurement: Hm) -> Self {
        const { assert!(N > 0 && M > 0, "Filter dimensions must be positive") };

        Self {
            process,
            measurement,
            x: Vector::zeros(),
            P: Matrix::zeros(),
            Q: Matrix::zeros(),
            R: Matrix::zeros(),
            G: Matrix::zeros(),
            y: Vector::zeros(),
            pivot_tolerance: default_pivot_tolerance(),
        }
    }

    /// Create a filter with initial values taken from `config`.
    pub fn from_config(process: Fm, measurement: Hm, config: &EkfConfig<T, N, M>) -> Self {
        let mut filter = Self::new(process, measurement);
        filter.x = config.state;
        filter.P = config.covariance;
        filter.Q = config.process_noise;
        filter.R = config.measurement_noise;
        filter.pivot_tolerance = config.pivot_tolerance;
        filter
    }

    /// Fuse the measurement `z` into the estimate and return the a posteriori
    /// state and covariance.
    ///
    /// If the innovation covariance cannot be inverted, the error is returned
    /// and the state, covariance and gain are left as they were.
    pub fn update(
        &mut self,
        z: &Vector<T, M>,
    ) -> Result<(Vector<T, N>, Matrix<T, N, N>), SingularMatrixError> {
        // 1, 2
        let (Xp, fy) = self.process.transition(&self.x);

        // 3
        let (gXp, H) = self.measurement.measure(&Xp);

        // 4
        let Pp = fy * self.P * fy.transpose() + self.Q;

        // 5
        let Ht = H.transpose();
        let S = H * Pp * Ht + self.R;
        let S_inv = match S.try_inverse_with(self.pivot_tolerance) {
            Ok(inv) => inv,
            Err(error) => {
                warn!("Innovation covariance is singular: {}", error);
                return Err(error);
            }
        };
        let G = Pp * Ht * S_inv;

        // 6
        let y = *z - gXp;
        self.x = Xp + G * y;

        // 7
        self.P = (Matrix::<T, N, N>::identity() - G * H) * Pp;

        self.G = G;
        self.y = y;

        trace!("Fused {}-dimensional measurement into {} states", M, N);

        Ok((self.x, self.P))
    }

    /// Same as [`update`](Self::update), but takes the measurement as a slice
    /// whose length must be exactly `M`.
    pub fn update_from_slice(
        &mut self,
        z: &[T],
    ) -> Result<(Vector<T, N>, Matrix<T, N, N>), EkfError> {
        let z = Vector::from_row_slice(z)?;
        Ok(self.update(&z)?)
    }

    /// Propagate the estimate one step without a measurement, committing
    /// `X = f(X)` and `P = fy P fy' + Q`.
    ///
    /// Useful for time steps where no measurement is available, or one was
    /// dropped after a failed [`update`](Self::update).
    pub fn predict(&mut self) -> (Vector<T, N>, Matrix<T, N, N>) {
        let (Xp, fy) = self.process.transition(&self.x);
        self.P = fy * self.P * fy.transpose() + self.Q;
        self.x = Xp;
        (self.x, self.P)
    }

    /// Get state vector `x`.
    pub fn get_state(&self) -> &Vector<T, N> {
        &self.x
    }

    /// Get state covariance `P`.
    pub fn get_covariance(&self) -> &Matrix<T, N, N> {
        &self.P
    }

    /// Kalman gain of the last successful update, zero before the first.
    pub fn get_gain(&self) -> &Matrix<T, N, M> {
        &self.G
    }

    /// Innovation `Z - g(Xp)` of the last successful update.
    pub fn get_innovation(&self) -> &Vector<T, M> {
        &self.y
    }

    pub fn get_process_noise(&self) -> &Matrix<T, N, N> {
        &self.Q
    }

    pub fn get_measurement_noise(&self) -> &Matrix<T, M, M> {
        &self.R
    }

    pub fn get_pivot_tolerance(&self) -> T {
        self.pivot_tolerance
    }

    pub fn set_state(&mut self, x: Vector<T, N>) {
        self.x = x;
    }

    pub fn set_state_from_slice(&mut self, x: &[T]) -> Result<(), DimensionMismatch> {
        self.x = Vector::from_row_slice(x)?;
        Ok(())
    }

    pub fn set_covariance(&mut self, P: Matrix<T, N, N>) {
        self.P = P;
    }

    pub fn set_process_noise(&mut self, Q: Matrix<T, N, N>) {
        self.Q = Q;
    }

    pub fn set_measurement_noise(&mut self, R: Matrix<T, M, M>) {
        self.R = R;
    }

    pub fn set_pivot_tolerance(&mut self, tolerance: T) {
        self.pivot_tolerance = tolerance;
    }

    pub fn process_model(&self) -> &Fm {
        &self.process
    }

    pub fn process_model_mut(&mut self) -> &mut Fm {
        &mut self.process
    }

    pub fn measurement_model(&self) -> &Hm {
        &self.measurement
    }

    pub fn measurement_model_mut(&mut self) -> &mut Hm {
        &mut self.measurement
    }
}

impl<Fm, Hm, const N: usize, const M: usize> ExtendedKalman<f64, Fm, Hm, N, M> {
    /// Log state, covariance and gain at debug level.
    pub fn dump(&self) {
        self.x.dump("X");
        self.P.dump("P");
        self.G.dump("G");
    }
}
