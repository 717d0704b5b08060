//! Solve driver and preconditioner
//!
//! [`amg_solve`] iterates cycles until the relative residual reaches
//! `solve_tol`. [`AmgPreconditioner`] applies a single cycle from a zero guess
//! and plugs into the Krylov solvers of [`crate::iterative`].

use std::sync::Mutex;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::cycle::mg_cycle;
use super::param::{AmgParam, PRINT_MIN, PRINT_SOME};
use super::setup::{AmgDiagnostics, AmgHierarchy};
use crate::error::{AmgError, Result, try_zeroed};
use crate::sparse::CsrMatrix;
use crate::traits::{Preconditioner, RealField, SMALL_REAL, norm2};

/// Outcome of [`amg_solve`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmgSolution {
    /// Cycles performed
    pub iterations: usize,
    /// Final relative residual `||b - A x|| / ||b||`
    pub residual: f64,
    /// Whether `solve_tol` was reached
    pub converged: bool,
}

/// Solve `A x = b` with repeated cycles, starting from the given `x`.
///
/// Stops when `||b - A x|| <= solve_tol * ||b||` (absolute for `b = 0`) or
/// after `maxit` cycles.
pub fn amg_solve<T: RealField>(
    hierarchy: &mut AmgHierarchy<T>,
    param: &AmgParam,
    b: &Array1<T>,
    x: &mut Array1<T>,
) -> Result<AmgSolution> {
    if !hierarchy.is_set_up() {
        return Err(AmgError::NotSetUp);
    }
    let n = hierarchy.level_sizes()[0];
    for len in [b.len(), x.len()] {
        if len != n {
            return Err(AmgError::DimensionMismatch {
                expected: n,
                got: len,
            });
        }
    }

    for (dst, &src) in hierarchy.rhs_mut().iter_mut().zip(b.iter()) {
        *dst = src;
    }
    for (dst, &src) in hierarchy.solution_mut().iter_mut().zip(x.iter()) {
        *dst = src;
    }

    let mut r = try_zeroed(n, T::zero())?;
    let b_norm = b.iter().fold(T::zero(), |acc, &v| acc + v * v).sqrt();
    let scale = if b_norm > T::real(SMALL_REAL) {
        b_norm
    } else {
        T::one()
    };
    let tol = T::real(param.solve_tol);

    let relative_residual = |h: &AmgHierarchy<T>, r: &mut [T]| -> T {
        if let Some(fine) = h.level(0) {
            fine.a.residual_into(&fine.b, &fine.x, r);
        }
        norm2(r) / scale
    };

    let mut residual = relative_residual(hierarchy, &mut r);
    let mut iterations = 0;
    while residual > tol && iterations < param.maxit {
        mg_cycle(hierarchy, param, 0)?;
        iterations += 1;
        let previous = residual;
        residual = relative_residual(hierarchy, &mut r);
        if param.print_level >= PRINT_SOME {
            log::info!(
                "AMG cycle {:4}: relative residual {:.6e}, reduction {:.4}",
                iterations,
                residual.as_f64(),
                (residual / previous).as_f64()
            );
        }
    }

    for (dst, &src) in x.iter_mut().zip(hierarchy.solution()) {
        *dst = src;
    }
    let converged = residual <= tol;
    if !converged && param.print_level >= PRINT_SOME {
        log::warn!(
            "AMG stopped after {} cycles at relative residual {:.3e}",
            iterations,
            residual.as_f64()
        );
    }
    Ok(AmgSolution {
        iterations,
        residual: residual.as_f64(),
        converged,
    })
}

/// One AMG cycle from a zero guess as a preconditioner
///
/// The cycle writes into the hierarchy's level vectors, so the hierarchy sits
/// behind a mutex; concurrent applications are serialized.
#[derive(Debug)]
pub struct AmgPreconditioner<T: RealField> {
    hierarchy: Mutex<AmgHierarchy<T>>,
    param: AmgParam,
    diagnostics: AmgDiagnostics,
}

impl<T: RealField> AmgPreconditioner<T> {
    /// Set up a hierarchy for `matrix`.
    pub fn from_csr(matrix: &CsrMatrix<T>, param: AmgParam) -> Result<Self> {
        let hierarchy = AmgHierarchy::build(matrix.clone(), &param)?;
        Ok(Self::from_hierarchy(hierarchy, param))
    }

    /// Wrap an already set up hierarchy.
    pub fn from_hierarchy(hierarchy: AmgHierarchy<T>, param: AmgParam) -> Self {
        let diagnostics = hierarchy.diagnostics();
        Self {
            hierarchy: Mutex::new(hierarchy),
            param,
            diagnostics,
        }
    }

    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.diagnostics.num_levels
    }

    /// Setup statistics
    pub fn diagnostics(&self) -> &AmgDiagnostics {
        &self.diagnostics
    }

    /// Parameters used for setup and cycling
    pub fn param(&self) -> &AmgParam {
        &self.param
    }
}

impl<T: RealField> Preconditioner<T> for AmgPreconditioner<T> {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        let mut hierarchy = self
            .hierarchy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if r.len() != hierarchy.level_sizes()[0] {
            return r.clone();
        }

        for (dst, &src) in hierarchy.rhs_mut().iter_mut().zip(r.iter()) {
            *dst = src;
        }
        hierarchy.solution_mut().fill(T::zero());
        if let Err(e) = mg_cycle(&mut hierarchy, &self.param, 0) {
            if self.param.print_level >= PRINT_MIN {
                log::warn!("AMG preconditioner skipped: {e}");
            }
            return r.clone();
        }
        Array1::from_iter(hierarchy.solution().iter().copied())
    }
}
