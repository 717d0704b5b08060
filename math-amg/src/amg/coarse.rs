//! Coarsest-level solvers
//!
//! The last level of the hierarchy is solved by a [`CoarseSolver`]. The
//! iterative strategy runs CG on the residual equation; the dense strategy
//! factorizes the (row-sorted) coarsest matrix once with partial pivoting.

use ndarray::Array1;

use super::param::{PRINT_MIN, PRINT_SOME};
use crate::direct::{LuFactorization, lu_factorize_csr};
use crate::error::{AmgError, Result};
use crate::iterative::{CgConfig, cg};
use crate::sparse::CsrMatrix;
use crate::traits::RealField;

/// Solver for `A x = b` on the coarsest level
pub trait CoarseSolver<T: RealField>: std::fmt::Debug + Send + Sync {
    /// Prepare the solver for `a`.
    fn setup(&mut self, a: &CsrMatrix<T>) -> Result<()>;

    /// Overwrite `x` with (an approximation of) `A^{-1} b`.
    ///
    /// `x` holds an initial guess on entry.
    fn solve(&self, b: &[T], x: &mut [T]);

    /// Short name for logs and diagnostics
    fn name(&self) -> &'static str;
}

/// Conjugate gradients to a relative tolerance
#[derive(Debug, Clone)]
pub struct IterativeCoarseSolver<T: RealField> {
    a: Option<CsrMatrix<T>>,
    tol: f64,
    warn: bool,
}

impl<T: RealField> IterativeCoarseSolver<T> {
    /// Solver stopping at relative residual `tol`, silent when it does not converge
    pub fn new(tol: f64) -> Self {
        Self {
            a: None,
            tol,
            warn: false,
        }
    }

    /// Log a warning whenever a solve stops short of the tolerance.
    pub fn with_warnings(mut self, warn: bool) -> Self {
        self.warn = warn;
        self
    }

    /// Iteration cap for an `n`-dimensional problem: max(250, min(n^2, 1000))
    pub fn max_iterations(n: usize) -> usize {
        n.saturating_mul(n).min(1000).max(250)
    }
}

impl<T: RealField> CoarseSolver<T> for IterativeCoarseSolver<T> {
    fn setup(&mut self, a: &CsrMatrix<T>) -> Result<()> {
        a.validate_square()?;
        self.a = Some(a.clone());
        Ok(())
    }

    fn solve(&self, b: &[T], x: &mut [T]) {
        let Some(a) = self.a.as_ref() else {
            return;
        };
        let n = a.num_rows;
        let mut r = vec![T::zero(); n];
        a.residual_into(b, x, &mut r);

        let config = CgConfig {
            max_iterations: Self::max_iterations(n),
            tolerance: self.tol,
            print_interval: 0,
        };
        let solution = cg(a, &Array1::from_vec(r), &config);
        if self.warn && !solution.converged {
            log::warn!(
                "Coarse CG stopped after {} iterations at relative residual {:.3e}",
                solution.iterations,
                solution.residual.as_f64()
            );
        }
        for (xi, &ei) in x.iter_mut().zip(solution.x.iter()) {
            *xi += ei;
        }
    }

    fn name(&self) -> &'static str {
        "cg"
    }
}

/// Dense LU factorization of the coarsest matrix
#[derive(Debug, Clone, Default)]
pub struct DenseLuCoarseSolver<T: RealField> {
    lu: Option<LuFactorization<T>>,
}

impl<T: RealField> DenseLuCoarseSolver<T> {
    /// Create an empty solver; [`CoarseSolver::setup`] factorizes.
    pub fn new() -> Self {
        Self { lu: None }
    }
}

impl<T: RealField> CoarseSolver<T> for DenseLuCoarseSolver<T> {
    fn setup(&mut self, a: &CsrMatrix<T>) -> Result<()> {
        a.validate_square()?;
        let lu = if a.has_sorted_rows() {
            lu_factorize_csr(a)?
        } else {
            let mut sorted = a.clone();
            sorted.sort_rows();
            lu_factorize_csr(&sorted)?
        };
        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&self, b: &[T], x: &mut [T]) {
        if let Some(lu) = &self.lu {
            x.copy_from_slice(b);
            lu.solve_in_place(x);
        }
    }

    fn name(&self) -> &'static str {
        "dense-lu"
    }
}

/// Set up `preferred` on `a`, falling back to CG when that fails.
pub(crate) fn setup_with_fallback<T: RealField>(
    mut preferred: Box<dyn CoarseSolver<T>>,
    a: &CsrMatrix<T>,
    tol: f64,
    print_level: u8,
) -> Result<Box<dyn CoarseSolver<T>>> {
    match preferred.setup(a) {
        Ok(()) => Ok(preferred),
        Err(e @ AmgError::FactorizationFailed { .. }) => {
            if print_level >= PRINT_MIN {
                log::warn!(
                    "Coarse solver {} failed ({e}), falling back to CG",
                    preferred.name()
                );
            }
            let mut fallback =
                IterativeCoarseSolver::new(tol).with_warnings(print_level >= PRINT_SOME);
            fallback.setup(a)?;
            Ok(Box::new(fallback))
        }
        Err(e) => Err(e),
    }
}
