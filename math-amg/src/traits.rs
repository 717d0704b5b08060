//! Core traits for the multigrid kernels
//!
//! - [`RealField`]: scalar types the hierarchy is built over
//! - [`LinearOperator`]: matrix-like objects that can perform matrix-vector products
//! - [`Preconditioner`]: approximate inverses, used by Krylov methods

use ndarray::Array1;
use num_traits::{Float, FromPrimitive, NumAssign};
use std::fmt::Debug;

/// Real scalar type for AMG setup and cycling.
///
/// Classical coarsening compares couplings by sign and magnitude, so only
/// ordered fields are supported.
///
/// # Implementations
///
/// Provided for:
/// - `f64` (default for PDE discretizations)
/// - `f32` (for memory-constrained applications)
pub trait RealField:
    Float + NumAssign + FromPrimitive + Send + Sync + Debug + Default + 'static
{
    /// Convert an `f64` constant into this type
    fn real(v: f64) -> Self;

    /// Widen to `f64` for logging and diagnostics
    fn as_f64(self) -> f64;

    /// Check if this is approximately zero
    #[inline]
    fn is_zero_approx(self, tol: Self) -> bool {
        self.abs() < tol
    }
}

impl RealField for f64 {
    #[inline]
    fn real(v: f64) -> Self {
        v
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

impl RealField for f32 {
    #[inline]
    fn real(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

/// Values below this magnitude are treated as zero divisors.
pub const SMALL_REAL: f64 = 1e-20;

/// Trait for linear operators (matrices) that can perform matrix-vector products.
pub trait LinearOperator<T: RealField>: Send + Sync {
    /// Number of rows in the operator
    fn num_rows(&self) -> usize;

    /// Number of columns in the operator
    fn num_cols(&self) -> usize;

    /// Apply the operator: y = A * x
    fn apply(&self, x: &Array1<T>) -> Array1<T>;

    /// Apply the transpose: y = A^T * x
    fn apply_transpose(&self, x: &Array1<T>) -> Array1<T>;

    /// Check if the operator is square
    fn is_square(&self) -> bool {
        self.num_rows() == self.num_cols()
    }
}

/// Trait for preconditioners used in iterative solvers.
///
/// A preconditioner M approximates A^(-1), so that M*A is better conditioned
/// than A alone.
pub trait Preconditioner<T: RealField>: Send + Sync {
    /// Apply the preconditioner: y = M * r
    fn apply(&self, r: &Array1<T>) -> Array1<T>;
}

/// Identity preconditioner (no preconditioning)
#[derive(Clone, Debug, Default)]
pub struct IdentityPreconditioner;

impl<T: RealField> Preconditioner<T> for IdentityPreconditioner {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        r.clone()
    }
}

/// Dot product of two slices
#[inline]
pub(crate) fn dot<T: RealField>(x: &[T], y: &[T]) -> T {
    x.iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (&xi, &yi)| acc + xi * yi)
}

/// Euclidean norm of a slice
#[inline]
pub(crate) fn norm2<T: RealField>(x: &[T]) -> T {
    dot(x, x).sqrt()
}

/// y += alpha * x
#[inline]
pub(crate) fn axpy<T: RealField>(alpha: T, x: &[T], y: &mut [T]) {
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}
