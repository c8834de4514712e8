pub mod extended_kalman;
pub mod linear_kalman;

use crate::utils::matrix::{Matrix, Vector};

/// State-transition model `x[k+1] = f(x[k])` of an `N`-dimensional system.
pub trait ProcessModel<T, const N: usize> {
    /// Project the state one step ahead. Returns the predicted state and the
    /// jacobian of `f`, which is used as the linearization of the dynamics.
    fn transition(&mut self, x: &Vector<T, N>) -> (Vector<T, N>, Matrix<T, N, N>);
}

/// Measurement model `z[k] = g(x[k])` mapping `N` states to `M` measurements.
pub trait MeasurementModel<T, const N: usize, const M: usize> {
    /// Returns the predicted measurement `g(x)` and the jacobian of `g` at `x`.
    fn measure(&mut self, x: &Vector<T, N>) -> (Vector<T, M>, Matrix<T, M, N>);
}

impl<T, F, const N: usize> ProcessModel<T, N> for F
where
    F: FnMut(&Vector<T, N>) -> (Vector<T, N>, Matrix<T, N, N>),
{
    fn transition(&mut self, x: &Vector<T, N>) -> (Vector<T, N>, Matrix<T, N, N>) {
        self(x)
    }
}

impl<T, F, const N: usize, const M: usize> MeasurementModel<T, N, M> for F
where
    F: FnMut(&Vector<T, N>) -> (Vector<T, M>, Matrix<T, M, N>),
{
    fn measure(&mut self, x: &Vector<T, N>) -> (Vector<T, M>, Matrix<T, M, N>) {
        self(x)
    }
}
