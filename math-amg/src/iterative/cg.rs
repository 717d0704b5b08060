//! CG (Conjugate Gradient) solver
//!
//! The Conjugate Gradient method for symmetric positive definite systems,
//! optionally preconditioned. The coarsest AMG level falls back to it, and
//! with an [`crate::AmgPreconditioner`] it becomes AMG-preconditioned CG.

use crate::traits::{IdentityPreconditioner, LinearOperator, Preconditioner, RealField, dot};
use ndarray::Array1;

/// CG solver configuration
#[derive(Debug, Clone)]
pub struct CgConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative tolerance for convergence
    pub tolerance: f64,
    /// Print progress every N iterations (0 = no output)
    pub print_interval: usize,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-6,
            print_interval: 0,
        }
    }
}

/// CG solver result
#[derive(Debug)]
pub struct CgSolution<T: RealField> {
    /// Solution vector
    pub x: Array1<T>,
    /// Number of iterations
    pub iterations: usize,
    /// Final relative residual
    pub residual: T,
    /// Whether convergence was achieved
    pub converged: bool,
}

/// Solve Ax = b using the Conjugate Gradient method
///
/// Note: This method is only correct for symmetric positive definite matrices.
pub fn cg<T, A>(operator: &A, b: &Array1<T>, config: &CgConfig) -> CgSolution<T>
where
    T: RealField,
    A: LinearOperator<T>,
{
    pcg(operator, &IdentityPreconditioner, b, config)
}

/// Preconditioned Conjugate Gradient starting from a zero guess
///
/// The preconditioner must be symmetric positive definite as well.
pub fn pcg<T, A, P>(operator: &A, precond: &P, b: &Array1<T>, config: &CgConfig) -> CgSolution<T>
where
    T: RealField,
    A: LinearOperator<T>,
    P: Preconditioner<T>,
{
    let n = b.len();
    let mut x = Array1::from_elem(n, T::zero());
    let tiny = T::real(1e-30);

    let b_norm = vector_norm(b);
    if b_norm < T::real(1e-15) {
        return CgSolution {
            x,
            iterations: 0,
            residual: T::zero(),
            converged: true,
        };
    }
    let tolerance = T::real(config.tolerance);

    // Initial residual r = b - Ax = b (since x = 0)
    let mut r = b.clone();
    let mut z = precond.apply(&r);
    let mut p = z.clone();
    let mut rho = inner_product(&r, &z);

    for iter in 0..config.max_iterations {
        // q = A * p
        let q = operator.apply(&p);

        // alpha = rho / (p, q)
        let pq = inner_product(&p, &q);
        if pq.abs() < tiny {
            return CgSolution {
                x,
                iterations: iter,
                residual: vector_norm(&r) / b_norm,
                converged: false,
            };
        }
        let alpha = rho / pq;

        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &q);

        let rel_residual = vector_norm(&r) / b_norm;

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "CG iteration {}: relative residual = {:.6e}",
                iter + 1,
                rel_residual.as_f64()
            );
        }

        if rel_residual < tolerance {
            return CgSolution {
                x,
                iterations: iter + 1,
                residual: rel_residual,
                converged: true,
            };
        }

        z = precond.apply(&r);
        let rho_new = inner_product(&r, &z);
        if rho.abs() < tiny {
            return CgSolution {
                x,
                iterations: iter + 1,
                residual: rel_residual,
                converged: false,
            };
        }

        let beta = rho_new / rho;
        rho = rho_new;

        // p = z + beta * p
        p.zip_mut_with(&z, |pi, &zi| *pi = zi + beta * *pi);
    }

    let rel_residual = vector_norm(&r) / b_norm;
    CgSolution {
        x,
        iterations: config.max_iterations,
        residual: rel_residual,
        converged: false,
    }
}

#[inline]
fn inner_product<T: RealField>(x: &Array1<T>, y: &Array1<T>) -> T {
    match (x.as_slice(), y.as_slice()) {
        (Some(xs), Some(ys)) => dot(xs, ys),
        _ => x
            .iter()
            .zip(y.iter())
            .fold(T::zero(), |acc, (&xi, &yi)| acc + xi * yi),
    }
}

#[inline]
fn vector_norm<T: RealField>(x: &Array1<T>) -> T {
    inner_product(x, x).sqrt()
}
