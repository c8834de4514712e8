use core::fmt;
use core::marker::PhantomData;
use core::ops::{Add, AddAssign, Index, IndexMut, Mul, Sub, SubAssign};

use approx::{AbsDiffEq, RelativeEq};
use nalgebra::{SMatrix, Scalar};
use num_traits::Float;
use serde::{de, ser::SerializeTuple, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{DimensionMismatch, SingularMatrixError};

/// Relative pivot threshold used by [`Matrix::try_inverse`]. A pivot is
/// rejected when its magnitude is not above this times the largest
/// magnitude in the matrix being inverted.
///
/// The threshold scales with the largest element, so a well conditioned
/// matrix whose entries span many orders of magnitude, such as an innovation
/// covariance mixing measurements in different units, may need a smaller
/// tolerance passed to [`Matrix::try_inverse_with`].
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-12;

pub(crate) fn default_pivot_tolerance<T: Float>() -> T {
    T::from(DEFAULT_PIVOT_TOLERANCE).unwrap_or_else(T::epsilon)
}

/// Dense `R`x`C` matrix stored as a single contiguous row-major buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Matrix<T, const R: usize, const C: usize> {
    data: [[T; C]; R],
}

pub type Vector<T, const R: usize> = Matrix<T, R, 1>;

pub type Matrix2<T> = Matrix<T, 2, 2>;
pub type Matrix3<T> = Matrix<T, 3, 3>;

pub type Vector1<T> = Vector<T, 1>;
pub type Vector2<T> = Vector<T, 2>;
pub type Vector3<T> = Vector<T, 3>;

macro_rules! impl_vec {
    ($type:ident: $($arg:ident),+) => {
        impl <T> $type<T> {
            pub const fn new($($arg: T),+) -> Self {
                Self { data: [$([$arg]),+] }
            }
        }
    };
}

impl_vec!(Vector1: v1);
impl_vec!(Vector2: v1, v2);
impl_vec!(Vector3: v1, v2, v3);

impl<T, const R: usize, const C: usize> Matrix<T, R, C> {
    /// Build a matrix from an array of rows.
    pub const fn from_rows(data: [[T; C]; R]) -> Self {
        Self { data }
    }

    pub fn from_fn(mut f: impl FnMut(usize, usize) -> T) -> Self {
        Self {
            data: core::array::from_fn(|i| core::array::from_fn(|j| f(i, j))),
        }
    }

    pub const fn shape(&self) -> (usize, usize) {
        (R, C)
    }

    /// Row-major view of all elements.
    pub fn as_slice(&self) -> &[T] {
        self.data.as_flattened()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_flattened_mut()
    }
}

impl<T, const R: usize> Vector<T, R> {
    pub fn from_array(values: [T; R]) -> Self {
        Self {
            data: values.map(|v| [v]),
        }
    }
}

impl<T: Float, const R: usize, const C: usize> Matrix<T, R, C> {
    pub fn zeros() -> Self {
        Self {
            data: [[T::zero(); C]; R],
        }
    }

    /// Build a matrix from a row-major slice. The slice length must be exactly `R * C`.
    pub fn from_row_slice(slice: &[T]) -> Result<Self, DimensionMismatch> {
        if slice.len() != R * C {
            return Err(DimensionMismatch {
                expected: R * C,
                found: slice.len(),
            });
        }
        Ok(Self::from_fn(|i, j| slice[i * C + j]))
    }

    pub fn transpose(&self) -> Matrix<T, C, R> {
        Matrix::from_fn(|i, j| self.data[j][i])
    }

    pub fn scale(&self, factor: T) -> Self {
        Self::from_fn(|i, j| self.data[i][j] * factor)
    }

    /// Largest absolute value of any element.
    pub fn max_abs(&self) -> T {
        self.as_slice()
            .iter()
            .fold(T::zero(), |acc, value| acc.max(value.abs()))
    }
}

impl<T: Float, const N: usize> Matrix<T, N, N> {
    pub fn identity() -> Self {
        Self::from_fn(|i, j| if i == j { T::one() } else { T::zero() })
    }

    pub fn from_diagonal(diagonal: &Vector<T, N>) -> Self {
        Self::from_fn(|i, j| if i == j { diagonal.data[i][0] } else { T::zero() })
    }

    pub fn diagonal(&self) -> Vector<T, N> {
        Vector::from_fn(|i, _| self.data[i][i])
    }

    pub fn is_symmetric(&self, epsilon: T) -> bool {
        (0..N).all(|i| (0..i).all(|j| (self.data[i][j] - self.data[j][i]).abs() <= epsilon))
    }

    /// Invert the matrix using the default relative pivot tolerance.
    pub fn try_inverse(&self) -> Result<Self, SingularMatrixError> {
        self.try_inverse_with(default_pivot_tolerance())
    }

    /// Gauss-Jordan inversion with full pivoting.
    ///
    /// Every elimination step picks the largest remaining element over all rows
    /// and columns which have not yet been pivoted on, swaps it onto the diagonal,
    /// and the column permutation is unwound once elimination is done. The step
    /// fails if the pivot magnitude is not above `tolerance` times the largest
    /// magnitude in `self`. `self` is left untouched either way.
    pub fn try_inverse_with(&self, tolerance: T) -> Result<Self, SingularMatrixError> {
        let mut a = self.data;
        let threshold = tolerance * self.max_abs();

        let mut pivoted = [false; N];
        let mut row_index = [0usize; N];
        let mut col_index = [0usize; N];

        for step in 0..N {
            let mut largest = T::zero();
            let mut best: Option<(usize, usize)> = None;
            for j in (0..N).filter(|&j| !pivoted[j]) {
                for k in (0..N).filter(|&k| !pivoted[k]) {
                    let value = a[j][k].abs();
                    if best.is_none() || value > largest {
                        largest = value;
                        best = Some((j, k));
                    }
                }
            }

            let Some((irow, icol)) = best else {
                return Err(SingularMatrixError { step });
            };

            pivoted[icol] = true;
            if irow != icol {
                a.swap(irow, icol);
            }
            row_index[step] = irow;
            col_index[step] = icol;

            // Also rejects NaN pivots
            let pivot = a[icol][icol];
            if !(pivot.abs() > threshold) {
                return Err(SingularMatrixError { step });
            }

            let pivot_inv = T::one() / pivot;
            a[icol][icol] = T::one();
            for value in a[icol].iter_mut() {
                *value = *value * pivot_inv;
            }

            let pivot_row = a[icol];
            for (r, row) in a.iter_mut().enumerate() {
                if r == icol {
                    continue;
                }
                let factor = row[icol];
                row[icol] = T::zero();
                for (value, p) in row.iter_mut().zip(pivot_row.iter()) {
                    *value = *value - *p * factor;
                }
            }
        }

        // Undo the column interchanges in reverse order
        for step in (0..N).rev() {
            if row_index[step] != col_index[step] {
                for row in a.iter_mut() {
                    row.swap(row_index[step], col_index[step]);
                }
            }
        }

        Ok(Self { data: a })
    }
}

impl<const R: usize, const C: usize> Matrix<f64, R, C> {
    /// Log every row of the matrix at debug level.
    pub fn dump(&self, label: &str) {
        for (i, row) in self.data.iter().enumerate() {
            debug!("{}[{}]: {:?}", label, i, row.as_slice());
        }
    }
}

impl<T: Float, const R: usize, const C: usize> Default for Matrix<T, R, C> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<T, const R: usize, const C: usize> Index<(usize, usize)> for Matrix<T, R, C> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[row][col]
    }
}

impl<T, const R: usize, const C: usize> IndexMut<(usize, usize)> for Matrix<T, R, C> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        &mut self.data[row][col]
    }
}

impl<T, const R: usize> Index<usize> for Vector<T, R> {
    type Output = T;

    fn index(&self, row: usize) -> &Self::Output {
        &self.data[row][0]
    }
}

impl<T, const R: usize> IndexMut<usize> for Vector<T, R> {
    fn index_mut(&mut self, row: usize) -> &mut Self::Output {
        &mut self.data[row][0]
    }
}

impl<T: Float, const R: usize, const C: usize, const K: usize> Mul<Matrix<T, C, K>>
    for Matrix<T, R, C>
{
    type Output = Matrix<T, R, K>;

    fn mul(self, rhs: Matrix<T, C, K>) -> Self::Output {
        Matrix::from_fn(|i, j| {
            (0..C).fold(T::zero(), |acc, k| acc + self.data[i][k] * rhs.data[k][j])
        })
    }
}

impl<T: Float, const R: usize, const C: usize> AddAssign for Matrix<T, R, C> {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.as_mut_slice().iter_mut().zip(rhs.as_slice()) {
            *a = *a + *b;
        }
    }
}

impl<T: Float, const R: usize, const C: usize> SubAssign for Matrix<T, R, C> {
    fn sub_assign(&mut self, rhs: Self) {
        for (a, b) in self.as_mut_slice().iter_mut().zip(rhs.as_slice()) {
            *a = *a - *b;
        }
    }
}

impl<T: Float, const R: usize, const C: usize> Add for Matrix<T, R, C> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Float, const R: usize, const C: usize> Sub for Matrix<T, R, C> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= rhs;
        self
    }
}

// nalgebra interop

impl<T: Scalar, const R: usize, const C: usize> From<SMatrix<T, R, C>> for Matrix<T, R, C> {
    fn from(value: SMatrix<T, R, C>) -> Self {
        Self::from_fn(|i, j| value[(i, j)].clone())
    }
}

impl<T: Scalar, const R: usize, const C: usize> Matrix<T, R, C> {
    pub fn to_nalgebra(&self) -> SMatrix<T, R, C> {
        SMatrix::from_fn(|i, j| self.data[i][j].clone())
    }
}

// approx comparisons, element-wise

impl<T: AbsDiffEq, const R: usize, const C: usize> AbsDiffEq for Matrix<T, R, C>
where
    T::Epsilon: Copy,
{
    type Epsilon = T::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        T::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.as_slice()
            .iter()
            .zip(other.as_slice())
            .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

impl<T: RelativeEq, const R: usize, const C: usize> RelativeEq for Matrix<T, R, C>
where
    T::Epsilon: Copy,
{
    fn default_max_relative() -> Self::Epsilon {
        T::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.as_slice()
            .iter()
            .zip(other.as_slice())
            .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}

// serde, as a fixed-length row-major tuple

impl<T: Serialize, const R: usize, const C: usize> Serialize for Matrix<T, R, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(R * C)?;
        for value in self.as_slice() {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }
}

struct MatrixVisitor<T, const R: usize, const C: usize>(PhantomData<T>);

impl<'de, T, const R: usize, const C: usize> de::Visitor<'de> for MatrixVisitor<T, R, C>
where
    T: Float + Deserialize<'de>,
{
    type Value = Matrix<T, R, C>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a row-major sequence of {} elements", R * C)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut matrix = Matrix::zeros();
        for (idx, slot) in matrix.as_mut_slice().iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(idx, &self))?;
        }
        Ok(matrix)
    }
}

impl<'de, T, const R: usize, const C: usize> Deserialize<'de> for Matrix<T, R, C>
where
    T: Float + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(R * C, MatrixVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// Deterministic, diagonally dominant test matrix.
    fn well_conditioned<const N: usize>(seed: u64) -> Matrix<f64, N, N> {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        };
        let mut m = Matrix::from_fn(|_, _| next());
        for i in 0..N {
            m[(i, i)] += N as f64 + 1.0;
        }
        m
    }

    #[test]
    fn test_multiply() {
        let a = Matrix::from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = Matrix::from_rows([[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]]);
        let c = a * b;
        assert_eq!(c, Matrix::from_rows([[58.0, 64.0], [139.0, 154.0]]));
    }

    #[test]
    fn test_transpose() {
        let a = Matrix::from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let t = a.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t, Matrix::from_rows([[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]));
        assert_eq!(t.transpose(), a);
    }

    #[test]
    fn test_add_in_place() {
        let mut a = Matrix::from_rows([[1.0, 2.0], [3.0, 4.0]]);
        a += Matrix::from_rows([[0.5, -2.0], [1.0, 0.0]]);
        assert_eq!(a, Matrix::from_rows([[1.5, 0.0], [4.0, 4.0]]));
    }

    #[test]
    fn test_zeros_and_identity() {
        let z = Matrix::<f64, 2, 3>::zeros();
        assert!(z.as_slice().iter().all(|v| *v == 0.0));
        let i = Matrix3::<f64>::identity();
        let a = well_conditioned::<3>(7);
        assert_eq!(i * a, a);
        assert_eq!(a * i, a);
    }

    #[test]
    fn test_row_major_layout() {
        let a = Matrix::<f64, 2, 3>::from_row_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(a[(0, 2)], 3.0);
        assert_eq!(a[(1, 0)], 4.0);
        assert_eq!(a.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(v, Vector::from_array([1.0, 2.0, 3.0]));
        assert_eq!(v[2], 3.0);
    }

    #[test]
    fn test_from_row_slice_wrong_length() {
        let err = Matrix::<f64, 2, 2>::from_row_slice(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            DimensionMismatch {
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn test_inverse_known() {
        let a = Matrix::from_rows([[4.0, 7.0], [2.0, 6.0]]);
        let inv = a.try_inverse().unwrap();
        let expected = Matrix::from_rows([[0.6, -0.7], [-0.2, 0.4]]);
        assert_relative_eq!(inv, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        // Zero on the diagonal, plain Gauss-Jordan without pivoting divides by zero
        let a = Matrix::from_rows([[0.0, 2.0, 1.0], [1.0, 0.0, 0.0], [3.0, 0.0, 1.0]]);
        let inv = a.try_inverse().unwrap();
        assert_abs_diff_eq!(a * inv, Matrix3::identity(), epsilon = 1e-12);
        assert_abs_diff_eq!(inv * a, Matrix3::identity(), epsilon = 1e-12);

        let swap = Matrix::from_rows([[0.0, 1.0], [1.0, 0.0]]);
        assert_eq!(swap.try_inverse().unwrap(), swap);
    }

    #[test]
    fn test_inverse_round_trip() {
        for seed in 1..20 {
            let a = well_conditioned::<5>(seed);
            let back = a.try_inverse().unwrap().try_inverse().unwrap();
            assert_relative_eq!(back, a, epsilon = 1e-12, max_relative = 1e-9);
        }
        let a = well_conditioned::<1>(3);
        assert_relative_eq!(a.try_inverse().unwrap().try_inverse().unwrap(), a, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_matches_nalgebra() {
        let a = well_conditioned::<4>(42);
        let ours = a.try_inverse().unwrap();
        let theirs: Matrix<f64, 4, 4> = a.to_nalgebra().try_inverse().unwrap().into();
        assert_relative_eq!(ours, theirs, epsilon = 1e-12, max_relative = 1e-9);
    }

    #[test]
    fn test_inverse_singular() {
        let dup = Matrix::from_rows([[1.0, 2.0], [1.0, 2.0]]);
        assert_eq!(dup.try_inverse(), Err(SingularMatrixError { step: 1 }));

        let zero = Matrix3::<f64>::zeros();
        assert_eq!(zero.try_inverse(), Err(SingularMatrixError { step: 0 }));

        // Rank deficient up to floating point noise
        let near = Matrix::from_rows([[1.0, 1.0], [1.0, 1.0 + 1e-15]]);
        assert!(near.try_inverse().is_err());

        let nan = Matrix::from_rows([[f64::NAN, 0.0], [0.0, 1.0]]);
        assert!(nan.try_inverse().is_err());
    }

    #[test]
    fn test_inverse_leaves_input_untouched() {
        let a = Matrix::from_rows([[1.0, 2.0], [2.0, 4.0]]);
        let copy = a;
        let _ = a.try_inverse();
        assert_eq!(a, copy);
    }

    #[test]
    fn test_tolerance_is_relative() {
        // Same conditioning at very different magnitudes
        let small = Matrix::from_rows([[2e-20, 1e-20], [1e-20, 3e-20]]);
        let inv = small.try_inverse().unwrap();
        assert_abs_diff_eq!(small * inv, Matrix2::identity(), epsilon = 1e-9);

        let a = Matrix::from_rows([[1.0, 0.0], [0.0, 1e-6]]);
        assert!(a.try_inverse_with(1e-12).is_ok());
        assert!(a.try_inverse_with(1e-3).is_err());

        // Exactly invertible, but spanning thirteen orders of magnitude
        let wide = Matrix::from_diagonal(&Vector2::new(1e6, 1e-7));
        assert_eq!(wide.try_inverse(), Err(SingularMatrixError { step: 1 }));
        let inv = wide.try_inverse_with(1e-15).unwrap();
        assert_relative_eq!(inv.diagonal(), Vector2::new(1e-6, 1e7), max_relative = 1e-12);
    }

    #[test]
    fn test_diagonal() {
        let d = Vector3::new(1.0, -2.0, 3.0);
        let m = Matrix::from_diagonal(&d);
        assert_eq!(m[(1, 1)], -2.0);
        assert_eq!(m[(0, 1)], 0.0);
        assert_eq!(m.diagonal(), d);
        assert_eq!(Matrix3::<f64>::identity().diagonal(), Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_symmetry_check() {
        let a = well_conditioned::<3>(9);
        let s = a * a.transpose();
        assert!(s.is_symmetric(1e-12));
        assert!(!a.is_symmetric(1e-12));
    }

    #[test]
    fn test_nalgebra_conversion() {
        let a = Matrix::from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let n = a.to_nalgebra();
        assert_eq!(n[(1, 2)], 6.0);
        assert_eq!(Matrix::from(n), a);
    }
}
