//! Recursive multigrid cycles
//!
//! One cycle on level `l` smooths, restricts the residual, computes a coarse
//! correction and prolongates it back before post-smoothing. The cycle type
//! only changes how the coarse correction is obtained:
//!
//! - **V** / **W**: one or two recursive cycles from a zero coarse guess
//! - **AMLI**: `q(B A) B r` in Horner form, `B` the recursive cycle and `q`
//!   the Chebyshev approximation of `1/t` on `[0.5, 2]`
//! - **Non-linear AMLI**: a few GCG iterations preconditioned by `B`
//! - **K**: at most two flexible CG iterations preconditioned by `B`
//!
//! The level directly above the coarsest always solves exactly once.
//!
//! Each level keeps `b`, `x` and a workspace `w`. `w[..n]` holds the level's
//! own residual; AMLI and the Krylov corrections keep the restricted
//! right-hand side (and the accumulated correction) in the rest of `w` on the
//! coarse level, so no two levels share scratch space.

use super::coarse::CoarseSolver;
use super::param::{AmgParam, CycleType, PRINT_MOST};
use super::setup::{AmgHierarchy, AmgLevel, Transfer};
use super::smoother::{SmoothPass, SmootherSettings};
use crate::error::{AmgError, Result};
use crate::traits::{RealField, SMALL_REAL, axpy, dot, norm2};

/// Lower spectral bound used for the AMLI polynomial
pub const AMLI_LAMBDA_MIN: f64 = 0.5;
/// Upper spectral bound used for the AMLI polynomial
pub const AMLI_LAMBDA_MAX: f64 = 2.0;

/// K-cycle skips its second iteration once the coarse residual has dropped
/// by this factor.
const KCYCLE_RESIDUAL_RATIO: f64 = 0.25;

/// Coefficients `c_0..=c_degree` of `q(t) = sum c_k t^k` approximating `1/t`
/// on `[lambda_min, lambda_max]`.
///
/// `1 - t q(t)` is the scaled Chebyshev polynomial
/// `T_{d+1}((theta - t) / delta) / T_{d+1}(theta / delta)`, built with the
/// three-term recursion in the monomial basis.
pub fn amli_coefficients(lambda_min: f64, lambda_max: f64, degree: usize) -> Vec<f64> {
    let theta = 0.5 * (lambda_max + lambda_min);
    let delta = 0.5 * (lambda_max - lambda_min);
    // x(t) = a + b t
    let (a, b) = (theta / delta, -1.0 / delta);

    let mut prev = vec![1.0];
    let mut curr = vec![a, b];
    for _ in 0..degree {
        let mut next = vec![0.0; curr.len() + 1];
        for (k, &c) in curr.iter().enumerate() {
            next[k] += 2.0 * a * c;
            next[k + 1] += 2.0 * b * c;
        }
        for (k, &c) in prev.iter().enumerate() {
            next[k] -= c;
        }
        prev = std::mem::replace(&mut curr, next);
    }

    let scale = curr[0];
    curr[1..].iter().map(|&c| -c / scale).collect()
}

/// Read-only state shared by all levels during one cycle
struct CycleContext<'a, T: RealField> {
    cycle_type: CycleType,
    settings: SmootherSettings<T>,
    presmooth: usize,
    postsmooth: usize,
    coarse: &'a dyn CoarseSolver<T>,
    amli_coef: &'a [T],
    nl_amli_iterations: usize,
    trace: bool,
}

impl<T: RealField> AmgHierarchy<T> {
    /// Right-hand side of the finest level
    pub fn rhs_mut(&mut self) -> &mut [T] {
        &mut self.levels[0].b
    }

    /// Iterate of the finest level
    pub fn solution(&self) -> &[T] {
        &self.levels[0].x
    }

    /// Iterate of the finest level, for setting an initial guess
    pub fn solution_mut(&mut self) -> &mut [T] {
        &mut self.levels[0].x
    }
}

/// Run one cycle on `A_level x_level = b_level`, updating `x_level` in place.
///
/// The cycle type and smoothing options come from `param`; the AMLI
/// coefficients are the ones computed at setup.
pub fn mg_cycle<T: RealField>(
    hierarchy: &mut AmgHierarchy<T>,
    param: &AmgParam,
    level: usize,
) -> Result<()> {
    let coarse = hierarchy.coarse.as_deref().ok_or(AmgError::NotSetUp)?;
    if level >= hierarchy.levels.len() {
        return Err(AmgError::InvalidParameter {
            name: "level",
            reason: format!("hierarchy has {} levels", hierarchy.levels.len()),
        });
    }
    if param.cycle_type.workspace_factor() > hierarchy.workspace_factor {
        return Err(AmgError::InvalidParameter {
            name: "cycle_type",
            reason: format!(
                "{:?} needs more workspace than was allocated at setup",
                param.cycle_type
            ),
        });
    }

    let ctx = CycleContext {
        cycle_type: param.cycle_type,
        settings: SmootherSettings::from_param(param),
        presmooth: param.presmooth_iter,
        postsmooth: param.postsmooth_iter,
        coarse,
        amli_coef: &hierarchy.amli_coef,
        nl_amli_iterations: param.amli_degree.max(1),
        trace: param.print_level >= PRINT_MOST,
    };
    cycle(
        &mut hierarchy.levels[level..],
        &hierarchy.transfers[level..],
        level,
        &ctx,
    );
    Ok(())
}

fn cycle<T: RealField>(
    levels: &mut [AmgLevel<T>],
    transfers: &[Transfer<T>],
    depth: usize,
    ctx: &CycleContext<'_, T>,
) {
    let Some((fine, coarser)) = levels.split_first_mut() else {
        return;
    };
    let Some((transfer, coarser_transfers)) = transfers.split_first() else {
        ctx.coarse.solve(&fine.b, &mut fine.x);
        return;
    };

    let n = fine.size();
    let AmgLevel {
        a,
        cfmark,
        smoother,
        b,
        x,
        w,
    } = fine;

    smoother.smooth(a, b, x, cfmark, &ctx.settings, SmoothPass::Pre, ctx.presmooth);

    let r = &mut w[..n];
    a.residual_into(b, x, r);
    transfer
        .r
        .matvec_axpby(T::one(), r, T::zero(), &mut coarser[0].b);

    coarse_correction(coarser, coarser_transfers, depth + 1, ctx);

    transfer
        .p
        .matvec_axpby(T::one(), &coarser[0].x, T::one(), x);

    smoother.smooth(a, b, x, cfmark, &ctx.settings, SmoothPass::Post, ctx.postsmooth);

    if ctx.trace {
        a.residual_into(b, x, r);
        log::trace!("Level {}: residual {:.6e} after cycle", depth, norm2(r).as_f64());
    }
}

/// Fill `levels[0].x` with a correction for `levels[0].b`.
fn coarse_correction<T: RealField>(
    levels: &mut [AmgLevel<T>],
    transfers: &[Transfer<T>],
    depth: usize,
    ctx: &CycleContext<'_, T>,
) {
    if transfers.is_empty() {
        levels[0].x.fill(T::zero());
        cycle(levels, transfers, depth, ctx);
        return;
    }

    match ctx.cycle_type {
        CycleType::V | CycleType::W => {
            levels[0].x.fill(T::zero());
            let visits = if ctx.cycle_type == CycleType::W { 2 } else { 1 };
            for _ in 0..visits {
                cycle(levels, transfers, depth, ctx);
            }
        }
        CycleType::Amli => amli_correction(levels, transfers, depth, ctx),
        CycleType::NonlinearAmli => {
            krylov_correction(levels, transfers, depth, ctx, ctx.nl_amli_iterations, None)
        }
        CycleType::K => krylov_correction(
            levels,
            transfers,
            depth,
            ctx,
            2,
            Some(T::real(KCYCLE_RESIDUAL_RATIO)),
        ),
    }
}

/// x = q(BA) B b by Horner's rule: z_d = c_d B b, z_k = B (c_k b + A z_{k+1})
fn amli_correction<T: RealField>(
    levels: &mut [AmgLevel<T>],
    transfers: &[Transfer<T>],
    depth: usize,
    ctx: &CycleContext<'_, T>,
) {
    let coef = ctx.amli_coef;
    let nc = levels[0].size();
    {
        let level = &mut levels[0];
        level.w[nc..2 * nc].copy_from_slice(&level.b);
    }

    for (k, &c_k) in coef.iter().enumerate().rev() {
        let level = &mut levels[0];
        let saved = &level.w[nc..2 * nc];
        if k + 1 == coef.len() {
            for (bi, &ri) in level.b.iter_mut().zip(saved) {
                *bi = c_k * ri;
            }
        } else {
            level
                .a
                .matvec_axpby(T::one(), &level.x, T::zero(), &mut level.b);
            axpy(c_k, saved, &mut level.b);
        }
        level.x.fill(T::zero());
        cycle(levels, transfers, depth, ctx);
    }
}

/// Generalized conjugate gradients on the coarse system, preconditioned by
/// the recursive cycle. Directions are kept A-orthogonal to all previous
/// ones. With `stop_ratio` the iteration ends once the residual has dropped
/// by that factor.
fn krylov_correction<T: RealField>(
    levels: &mut [AmgLevel<T>],
    transfers: &[Transfer<T>],
    depth: usize,
    ctx: &CycleContext<'_, T>,
    max_iterations: usize,
    stop_ratio: Option<T>,
) {
    let nc = levels[0].size();
    let tiny = T::real(SMALL_REAL);
    let r0_norm = {
        let level = &mut levels[0];
        let (residual, correction) = level.w[nc..3 * nc].split_at_mut(nc);
        residual.copy_from_slice(&level.b);
        correction.fill(T::zero());
        norm2(residual)
    };
    if r0_norm <= tiny {
        levels[0].x.fill(T::zero());
        return;
    }

    let mut directions: Vec<(Vec<T>, Vec<T>, T)> = Vec::with_capacity(max_iterations);
    for _ in 0..max_iterations {
        {
            let level = &mut levels[0];
            level.b.copy_from_slice(&level.w[nc..2 * nc]);
            level.x.fill(T::zero());
        }
        cycle(levels, transfers, depth, ctx);

        let level = &mut levels[0];
        let mut d = level.x.clone();
        for (dj, adj, rho_j) in &directions {
            let beta = dot(&d, adj) / *rho_j;
            axpy(-beta, dj, &mut d);
        }
        let mut ad = vec![T::zero(); nc];
        level.a.matvec_axpby(T::one(), &d, T::zero(), &mut ad);
        let rho = dot(&d, &ad);
        if rho.abs() <= tiny {
            break;
        }

        let (residual, correction) = level.w[nc..3 * nc].split_at_mut(nc);
        let alpha = dot(&d, residual) / rho;
        axpy(alpha, &d, correction);
        axpy(-alpha, &ad, residual);

        if let Some(ratio) = stop_ratio {
            if norm2(residual) <= ratio * r0_norm {
                break;
            }
        }
        directions.push((d, ad, rho));
    }

    let level = &mut levels[0];
    level.x.copy_from_slice(&level.w[2 * nc..3 * nc]);
}
