//! Level smoothers
//!
//! Point smoothers work on `A x = b` in place:
//!
//! - **Jacobi**: `x += w D^{-1} (b - A x)`
//! - **Gauss-Seidel / SOR**: row-by-row updates in a configurable order,
//!   symmetric variants sweep forward then backward
//! - **Polynomial**: Chebyshev acceleration of Jacobi on `[0.3 rho, rho]`,
//!   `rho` a Gershgorin bound of `D^{-1} A`
//! - **l1-Jacobi**: Jacobi scaled by the l1 norm of each row
//!
//! A level can replace the point smoother by an incomplete LU ([`IluData`])
//! or a multiplicative Schwarz smoother ([`SchwarzData`]). Rows with a zero
//! diagonal are never updated.

mod ilu;
mod schwarz;

pub use ilu::IluData;
pub use schwarz::SchwarzData;

use super::coarsening::PointType;
use super::param::{AmgParam, SmoothOrder, SmootherType};
use crate::error::{AmgError, Result, try_zeroed};
use crate::sparse::CsrMatrix;
use crate::traits::{RealField, SMALL_REAL};

/// Which half of the cycle a smoothing call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothPass {
    /// Before restriction
    Pre,
    /// After the coarse correction
    Post,
}

/// Point smoother options taken from [`AmgParam`]
#[derive(Debug, Clone, Copy)]
pub struct SmootherSettings<T: RealField> {
    /// Relaxation method
    pub kind: SmootherType,
    /// Sweep order
    pub order: SmoothOrder,
    /// SOR factor
    pub relaxation: T,
    /// Jacobi damping
    pub jacobi_weight: T,
    /// Chebyshev degree
    pub degree: usize,
}

impl<T: RealField> SmootherSettings<T> {
    /// Extract the smoother options of `param`
    pub fn from_param(param: &AmgParam) -> Self {
        Self {
            kind: param.smoother,
            order: param.smooth_order,
            relaxation: T::real(param.relaxation),
            jacobi_weight: T::real(param.jacobi_weight),
            degree: param.polynomial_degree,
        }
    }
}

/// What a level smooths with
#[derive(Debug, Clone)]
pub enum LocalSmoother<T: RealField> {
    /// Point smoother from [`SmootherSettings`]
    Point,
    /// `x += (LU)^{-1} (b - A x)`
    Ilu(IluData<T>),
    /// Multiplicative Schwarz sweep
    Schwarz(SchwarzData<T>),
}

/// Smoother state of one level
#[derive(Debug, Clone)]
pub struct LevelSmoother<T: RealField> {
    local: LocalSmoother<T>,
    /// Gershgorin bound of `D^{-1} A`
    spectral_bound: T,
    work: Vec<T>,
}

/// Upper bound of the spectrum of `D^{-1} A` by Gershgorin discs
pub fn gershgorin_bound<T: RealField>(a: &CsrMatrix<T>) -> T {
    let tiny = T::real(SMALL_REAL);
    (0..a.num_rows)
        .filter_map(|i| {
            let mut diag = T::zero();
            let mut abs_sum = T::zero();
            for (j, v) in a.row_entries(i) {
                if j == i {
                    diag += v;
                }
                abs_sum += v.abs();
            }
            (diag.abs() > tiny).then(|| abs_sum / diag.abs())
        })
        .fold(T::zero(), |acc, v| acc.max(v))
}

/// Rows with nonzero couplings need a nonzero diagonal; empty rows are skipped
/// by every smoother.
fn check_diagonal<T: RealField>(a: &CsrMatrix<T>) -> Result<()> {
    let tiny = T::real(SMALL_REAL);
    for i in 0..a.num_rows {
        let mut diag = T::zero();
        let mut coupled = false;
        for (j, v) in a.row_entries(i) {
            if j == i {
                diag += v;
            } else if !v.is_zero() {
                coupled = true;
            }
        }
        if coupled && diag.abs() <= tiny {
            return Err(AmgError::ZeroDiagonal { row: i });
        }
    }
    Ok(())
}

impl<T: RealField> LevelSmoother<T> {
    /// Point smoother for `a`
    pub fn point(a: &CsrMatrix<T>) -> Result<Self> {
        Self::with_local(a, LocalSmoother::Point)
    }

    /// Smoother of the given kind for `a`, with scratch space allocated
    ///
    /// Fails with [`AmgError::ZeroDiagonal`] on a coupled row without a diagonal.
    pub fn with_local(a: &CsrMatrix<T>, local: LocalSmoother<T>) -> Result<Self> {
        check_diagonal(a)?;
        let n = a.num_rows;
        Ok(Self {
            local,
            spectral_bound: gershgorin_bound(a),
            work: try_zeroed(2 * n, T::zero())?,
        })
    }

    /// Short name for logs and diagnostics
    pub fn name(&self) -> &'static str {
        match self.local {
            LocalSmoother::Point => "point",
            LocalSmoother::Ilu(_) => "ilu",
            LocalSmoother::Schwarz(_) => "schwarz",
        }
    }

    /// Run `sweeps` smoothing steps on `A x = b`.
    ///
    /// `cfmark` holds the C/F splitting of the level; it may be empty, in
    /// which case C/F ordering falls back to natural ordering.
    #[allow(clippy::too_many_arguments)]
    pub fn smooth(
        &mut self,
        a: &CsrMatrix<T>,
        b: &[T],
        x: &mut [T],
        cfmark: &[PointType],
        settings: &SmootherSettings<T>,
        pass: SmoothPass,
        sweeps: usize,
    ) {
        let n = a.num_rows;
        let (r, d) = self.work.split_at_mut(n);
        for _ in 0..sweeps {
            match &self.local {
                LocalSmoother::Ilu(ilu) => {
                    a.residual_into(b, x, r);
                    ilu.solve_in_place(r);
                    for (xi, &ei) in x.iter_mut().zip(r.iter()) {
                        *xi += ei;
                    }
                }
                LocalSmoother::Schwarz(schwarz) => schwarz.smooth(a, b, x),
                LocalSmoother::Point => match settings.kind {
                    SmootherType::Jacobi => jacobi(a, b, x, settings.jacobi_weight, r),
                    SmootherType::L1Jacobi => l1_jacobi(a, b, x, r),
                    SmootherType::GaussSeidel => {
                        sor_sweep(a, b, x, T::one(), sweep_order(n, cfmark, settings.order, pass))
                    }
                    SmootherType::Sor => sor_sweep(
                        a,
                        b,
                        x,
                        settings.relaxation,
                        sweep_order(n, cfmark, settings.order, pass),
                    ),
                    SmootherType::SymmetricGaussSeidel | SmootherType::Ssor => {
                        let omega = if settings.kind == SmootherType::Ssor {
                            settings.relaxation
                        } else {
                            T::one()
                        };
                        // forward then backward on both passes
                        let order = settings.order;
                        sor_sweep(a, b, x, omega, sweep_order(n, cfmark, order, SmoothPass::Pre));
                        sor_sweep(a, b, x, omega, sweep_order(n, cfmark, order, SmoothPass::Post));
                    }
                    SmootherType::Polynomial => {
                        chebyshev(a, b, x, settings.degree, self.spectral_bound, r, d)
                    }
                },
            }
        }
    }
}

/// Row visiting order of a Gauss-Seidel sweep.
///
/// Natural: ascending before and descending after the coarse correction.
/// C/F: C-points then F-points before, F-points then C-points after. The
/// post-smoothing order is always the exact reverse of the pre-smoothing one.
pub fn sweep_order<'a>(
    n: usize,
    cfmark: &'a [PointType],
    order: SmoothOrder,
    pass: SmoothPass,
) -> Box<dyn Iterator<Item = usize> + 'a> {
    let is_coarse = move |i: &usize| cfmark[*i] == PointType::Coarse;
    let is_fine = move |i: &usize| cfmark[*i] != PointType::Coarse;
    match (order, pass) {
        (SmoothOrder::Cf, SmoothPass::Pre) if cfmark.len() == n => {
            Box::new((0..n).filter(is_coarse).chain((0..n).filter(is_fine)))
        }
        (SmoothOrder::Cf, SmoothPass::Post) if cfmark.len() == n => {
            Box::new((0..n).rev().filter(is_fine).chain((0..n).rev().filter(is_coarse)))
        }
        (_, SmoothPass::Pre) => Box::new(0..n),
        (_, SmoothPass::Post) => Box::new((0..n).rev()),
    }
}

/// One SOR sweep (`omega == 1` is Gauss-Seidel) over the rows in `order`
pub fn sor_sweep<T: RealField>(
    a: &CsrMatrix<T>,
    b: &[T],
    x: &mut [T],
    omega: T,
    order: impl Iterator<Item = usize>,
) {
    let tiny = T::real(SMALL_REAL);
    for i in order {
        let mut sum = b[i];
        let mut diag = T::zero();
        for (j, v) in a.row_entries(i) {
            if j == i {
                diag += v;
            } else {
                sum -= v * x[j];
            }
        }
        if diag.abs() > tiny {
            x[i] = (T::one() - omega) * x[i] + omega * sum / diag;
        }
    }
}

/// Damped Jacobi: x = x + w * D^{-1} * (b - A*x)
pub fn jacobi<T: RealField>(a: &CsrMatrix<T>, b: &[T], x: &mut [T], weight: T, r: &mut [T]) {
    let tiny = T::real(SMALL_REAL);
    a.residual_into(b, x, r);
    for (i, xi) in x.iter_mut().enumerate() {
        let diag = a.diag_index(i).map_or(T::zero(), |idx| a.values[idx]);
        if diag.abs() > tiny {
            *xi += weight * r[i] / diag;
        }
    }
}

/// l1-Jacobi: x = x + D_l1^{-1} * (b - A*x), `D_l1` the row l1 norms
pub fn l1_jacobi<T: RealField>(a: &CsrMatrix<T>, b: &[T], x: &mut [T], r: &mut [T]) {
    let tiny = T::real(SMALL_REAL);
    a.residual_into(b, x, r);
    for (i, xi) in x.iter_mut().enumerate() {
        let diag = a.diag_index(i).map_or(T::zero(), |idx| a.values[idx]);
        if diag.abs() <= tiny {
            continue;
        }
        let l1 = a.row_entries(i).fold(T::zero(), |acc, (_, v)| acc + v.abs());
        *xi += r[i] / l1;
    }
}

/// Chebyshev polynomial smoother of the given degree on `[0.3 rho, rho]`.
///
/// `r` and `d` are scratch vectors of length n.
pub fn chebyshev<T: RealField>(
    a: &CsrMatrix<T>,
    b: &[T],
    x: &mut [T],
    degree: usize,
    rho: T,
    r: &mut [T],
    d: &mut [T],
) {
    let tiny = T::real(SMALL_REAL);
    if rho <= tiny {
        return;
    }
    let lambda_max = rho;
    let lambda_min = T::real(0.3) * rho;
    let two = T::real(2.0);
    let theta = (lambda_max + lambda_min) / two;
    let delta = (lambda_max - lambda_min) / two;
    let sigma = theta / delta;
    let mut rho_k = T::one() / sigma;

    let inv_diag: Vec<T> = (0..a.num_rows)
        .map(|i| {
            let diag = a.diag_index(i).map_or(T::zero(), |idx| a.values[idx]);
            if diag.abs() > tiny {
                T::one() / diag
            } else {
                T::zero()
            }
        })
        .collect();

    a.residual_into(b, x, r);
    for i in 0..x.len() {
        d[i] = inv_diag[i] * r[i] / theta;
        x[i] += d[i];
    }

    for _ in 1..degree {
        let rho_next = T::one() / (two * sigma - rho_k);
        a.residual_into(b, x, r);
        for i in 0..x.len() {
            d[i] = rho_next * rho_k * d[i] + two * rho_next / delta * inv_diag[i] * r[i];
            x[i] += d[i];
        }
        rho_k = rho_next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amg::param::IluType;

    fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    fn residual_norm(a: &CsrMatrix<f64>, b: &[f64], x: &[f64]) -> f64 {
        let mut r = vec![0.0; b.len()];
        a.residual_into(b, x, &mut r);
        r.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Error norm in the A inner product against the exact solution x = 0
    fn energy(a: &CsrMatrix<f64>, x: &[f64]) -> f64 {
        let mut ax = vec![0.0; x.len()];
        a.matvec_axpby(1.0, x, 0.0, &mut ax);
        x.iter().zip(&ax).map(|(u, v)| u * v).sum::<f64>().sqrt()
    }

    fn oscillatory(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 } + (i as f64 * 0.1).sin())
            .collect()
    }

    #[test]
    fn test_coupled_row_without_diagonal_is_rejected() {
        // row 1 couples to 0 and 2 but has no diagonal; row 3 is empty
        let a = CsrMatrix::from_triplets(
            4,
            4,
            vec![(0, 0, 2.0), (0, 1, -1.0), (1, 0, -1.0), (1, 2, -1.0), (2, 1, -1.0), (2, 2, 2.0)],
        );
        assert!(matches!(
            LevelSmoother::point(&a),
            Err(AmgError::ZeroDiagonal { row: 1 })
        ));

        let empty_row = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 2.0_f64)]);
        assert!(LevelSmoother::point(&empty_row).is_ok());
    }

    #[test]
    fn test_sweep_orders() {
        let cf = vec![
            PointType::Fine,
            PointType::Coarse,
            PointType::Fine,
            PointType::Coarse,
        ];
        let pre: Vec<usize> = sweep_order(4, &cf, SmoothOrder::Cf, SmoothPass::Pre).collect();
        let post: Vec<usize> = sweep_order(4, &cf, SmoothOrder::Cf, SmoothPass::Post).collect();
        assert_eq!(pre, vec![1, 3, 0, 2]);
        assert_eq!(post, vec![2, 0, 3, 1]);

        let natural: Vec<usize> =
            sweep_order(3, &[], SmoothOrder::Cf, SmoothPass::Post).collect();
        assert_eq!(natural, vec![2, 1, 0]);
    }

    #[test]
    fn test_every_point_smoother_reduces_energy() {
        let n = 40;
        let a = laplacian_1d(n);
        let b = vec![0.0; n];
        let param = AmgParam::default();
        for kind in [
            SmootherType::Jacobi,
            SmootherType::GaussSeidel,
            SmootherType::SymmetricGaussSeidel,
            SmootherType::Sor,
            SmootherType::Ssor,
            SmootherType::Polynomial,
            SmootherType::L1Jacobi,
        ] {
            let settings = SmootherSettings {
                kind,
                relaxation: 1.2,
                ..SmootherSettings::from_param(&param)
            };
            let mut smoother = LevelSmoother::point(&a).unwrap();
            let mut x = oscillatory(n);
            let before = energy(&a, &x);
            smoother.smooth(&a, &b, &mut x, &[], &settings, SmoothPass::Pre, 2);
            let after = energy(&a, &x);
            assert!(after < 0.8 * before, "{kind:?}: {before} -> {after}");
        }
    }

    #[test]
    fn test_zero_diagonal_row_is_left_alone() {
        // row 1 is empty
        let a = CsrMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 2.0_f64), (0, 2, -1.0), (2, 0, -1.0), (2, 2, 2.0)],
        );
        let b = vec![1.0, 5.0, 1.0];
        let settings = SmootherSettings::<f64>::from_param(&AmgParam::default());
        let mut smoother = LevelSmoother::point(&a).unwrap();
        let mut x = vec![0.0, 7.0, 0.0];
        smoother.smooth(&a, &b, &mut x, &[], &settings, SmoothPass::Pre, 3);
        assert_eq!(x[1], 7.0);
        assert!(x[0] > 0.0 && x[2] > 0.0);
    }

    #[test]
    fn test_ilu_override_solves_tridiagonal() {
        let n = 20;
        let a = laplacian_1d(n);
        let ilu = IluData::factorize(&a, IluType::Iluk, 0, 0.0, 0.0).unwrap();
        let mut smoother = LevelSmoother::with_local(&a, LocalSmoother::Ilu(ilu)).unwrap();
        assert_eq!(smoother.name(), "ilu");
        let settings = SmootherSettings::<f64>::from_param(&AmgParam::default());
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        smoother.smooth(&a, &b, &mut x, &[], &settings, SmoothPass::Pre, 1);
        assert!(residual_norm(&a, &b, &x) < 1e-10);
    }

    #[test]
    fn test_gershgorin_bound_of_laplacian() {
        let a = laplacian_1d(10);
        assert!((gershgorin_bound(&a) - 2.0).abs() < 1e-14);
    }
}
