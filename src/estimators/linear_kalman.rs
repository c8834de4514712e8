#![allow(non_snake_case)]

use num_traits::Float;

use super::{MeasurementModel, ProcessModel};
use crate::utils::matrix::{Matrix, Vector};

/// Linear state-space model `x[k+1] = F x[k]`. Used as the process model, it
/// turns the extended filter into the ordinary linear Kalman filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearProcess<T, const N: usize> {
    /// Model propagation matrix
    pub F: Matrix<T, N, N>,
}

/// Linear output model `z[k] = H x[k]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearMeasurement<T, const N: usize, const M: usize> {
    /// Output matrix
    pub H: Matrix<T, M, N>,
}

impl<T, const N: usize> LinearProcess<T, N> {
    pub const fn new(F: Matrix<T, N, N>) -> Self {
        Self { F }
    }
}

impl<T, const N: usize, const M: usize> LinearMeasurement<T, N, M> {
    pub const fn new(H: Matrix<T, M, N>) -> Self {
        Self { H }
    }
}

impl<T: Float, const N: usize> ProcessModel<T, N> for LinearProcess<T, N> {
    fn transition(&mut self, x: &Vector<T, N>) -> (Vector<T, N>, Matrix<T, N, N>) {
        (self.F * *x, self.F)
    }
}

impl<T: Float, const N: usize, const M: usize> MeasurementModel<T, N, M>
    for LinearMeasurement<T, N, M>
{
    fn measure(&mut self, x: &Vector<T, N>) -> (Vector<T, M>, Matrix<T, M, N>) {
        (self.H * *x, self.H)
    }
}
