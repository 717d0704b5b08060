//! LU decomposition solver
//!
//! Dense LU factorization with partial pivoting. Used for the local blocks of
//! the Schwarz smoother and for the coarsest level when it is small enough to
//! be handled densely.

use crate::error::{AmgError, Result};
use crate::sparse::CsrMatrix;
use crate::traits::{RealField, SMALL_REAL};
use ndarray::{Array1, Array2};

/// LU factorization result
///
/// Stores L and U factors along with pivot information
#[derive(Debug, Clone)]
pub struct LuFactorization<T: RealField> {
    /// Combined L and U matrices (L is unit lower triangular, stored below diagonal)
    pub lu: Array2<T>,
    /// Row swapped with row `k` at elimination step `k`
    pub pivots: Vec<usize>,
    /// Matrix dimension
    pub n: usize,
}

impl<T: RealField> LuFactorization<T> {
    /// Solve Ax = b using the pre-computed LU factorization
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>> {
        if b.len() != self.n {
            return Err(AmgError::DimensionMismatch {
                expected: self.n,
                got: b.len(),
            });
        }
        let mut x = b.to_vec();
        self.solve_in_place(&mut x);
        Ok(Array1::from_vec(x))
    }

    /// Overwrite `x` (holding the right-hand side) with the solution.
    pub fn solve_in_place(&self, x: &mut [T]) {
        let n = self.n;
        debug_assert_eq!(x.len(), n);

        for (k, &p) in self.pivots.iter().enumerate() {
            if p != k {
                x.swap(k, p);
            }
        }

        // Forward substitution: Ly = Pb
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum;
        }

        // Backward substitution: Ux = y
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum / self.lu[[i, i]];
        }
    }
}

/// Compute LU factorization with partial pivoting
pub fn lu_factorize<T: RealField>(a: &Array2<T>) -> Result<LuFactorization<T>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(AmgError::NonSquareMatrix {
            rows: n,
            cols: a.ncols(),
        });
    }

    let mut lu = a.clone();
    let mut pivots: Vec<usize> = (0..n).collect();
    let tiny = T::real(SMALL_REAL);

    for k in 0..n {
        // Find pivot
        let mut max_val = lu[[k, k]].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = lu[[i, k]].abs();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        if max_val < tiny {
            return Err(AmgError::FactorizationFailed {
                reason: format!("singular pivot in column {k}"),
            });
        }

        if max_row != k {
            for j in 0..n {
                lu.swap([k, j], [max_row, j]);
            }
        }
        pivots[k] = max_row;

        // Compute multipliers and eliminate
        let pivot = lu[[k, k]];
        for i in (k + 1)..n {
            let mult = lu[[i, k]] / pivot;
            lu[[i, k]] = mult;
            if mult.is_zero() {
                continue;
            }
            for j in (k + 1)..n {
                let update = mult * lu[[k, j]];
                lu[[i, j]] -= update;
            }
        }
    }

    Ok(LuFactorization { lu, pivots, n })
}

/// Factorize a sparse matrix through its dense copy.
pub fn lu_factorize_csr<T: RealField>(a: &CsrMatrix<T>) -> Result<LuFactorization<T>> {
    lu_factorize(&a.to_dense())
}

/// Solve Ax = b using LU decomposition
///
/// This is a convenience function that combines factorization and solve.
pub fn lu_solve<T: RealField>(a: &Array2<T>, b: &Array1<T>) -> Result<Array1<T>> {
    let factorization = lu_factorize(a)?;
    factorization.solve(b)
}
