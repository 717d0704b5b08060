//! Hierarchy setup
//!
//! Starting from the fine matrix, each pass of the setup loop analyzes strong
//! couplings, splits the unknowns into C- and F-points, builds the
//! interpolation `P`, sets `R = P^T` and forms the Galerkin operator
//! `A_c = R A P`. The loop stops when the level is small enough, the depth
//! limit is reached, or coarsening/interpolation fails; in the last case the
//! current level simply becomes the coarsest.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::coarse::{CoarseSolver, DenseLuCoarseSolver, IterativeCoarseSolver, setup_with_fallback};
use super::coarsening::{PointType, split};
use super::cycle::{AMLI_LAMBDA_MAX, AMLI_LAMBDA_MIN, amli_coefficients};
use super::interpolation::interpolate;
use super::param::{
    AmgParam, CoarseSolverType, CoarseningType, InterpolationType, PRINT_MIN, PRINT_MORE,
    PRINT_SOME, RapVariant,
};
use super::smoother::{IluData, LevelSmoother, LocalSmoother, SchwarzData};
use super::strength::strong_connections;
use crate::error::{AmgError, Result, try_zeroed};
use crate::sparse::{CsrMatrix, ptap, rap};
use crate::traits::RealField;

/// Levels at or below this size are never coarsened.
pub const MIN_COARSE_SIZE: usize = 50;

/// One level of the hierarchy
#[derive(Debug)]
pub struct AmgLevel<T: RealField> {
    /// Level operator
    pub a: CsrMatrix<T>,
    /// C/F splitting computed on this level; empty on the coarsest unless
    /// coarsening stopped there for having too few C-points
    pub cfmark: Vec<PointType>,
    pub(crate) smoother: LevelSmoother<T>,
    pub(crate) b: Vec<T>,
    pub(crate) x: Vec<T>,
    pub(crate) w: Vec<T>,
}

impl<T: RealField> AmgLevel<T> {
    fn new(a: CsrMatrix<T>) -> Result<Self> {
        let smoother = LevelSmoother::point(&a)?;
        Ok(Self {
            a,
            cfmark: Vec::new(),
            smoother,
            b: Vec::new(),
            x: Vec::new(),
            w: Vec::new(),
        })
    }

    /// Number of unknowns
    pub fn size(&self) -> usize {
        self.a.num_rows
    }
}

/// Grid transfer between level `l` and `l + 1`
#[derive(Debug, Clone)]
pub struct Transfer<T: RealField> {
    /// Interpolation, `n_l x n_{l+1}`
    pub p: CsrMatrix<T>,
    /// Restriction `P^T`, `n_{l+1} x n_l`
    pub r: CsrMatrix<T>,
}

/// Multigrid hierarchy, finest level first
#[derive(Debug)]
pub struct AmgHierarchy<T: RealField> {
    pub(crate) levels: Vec<AmgLevel<T>>,
    pub(crate) transfers: Vec<Transfer<T>>,
    pub(crate) coarse: Option<Box<dyn CoarseSolver<T>>>,
    pub(crate) amli_coef: Vec<T>,
    pub(crate) workspace_factor: usize,
    setup_time_ms: f64,
}

/// Setup statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmgDiagnostics {
    /// Number of levels
    pub num_levels: usize,
    /// Unknowns per level
    pub level_dofs: Vec<usize>,
    /// Nonzeros per level
    pub level_nnz: Vec<usize>,
    /// Smoother per level
    pub level_smoothers: Vec<String>,
    /// Sum of unknowns over the fine unknowns
    pub grid_complexity: f64,
    /// Sum of nonzeros over the fine nonzeros
    pub operator_complexity: f64,
    /// Coarsest-level solver
    pub coarse_solver: String,
    /// Setup time in milliseconds
    pub setup_time_ms: f64,
}

impl<T: RealField> AmgHierarchy<T> {
    /// Hierarchy holding only the fine matrix; call [`amg_setup`] next.
    ///
    /// Rows with unsorted or repeated columns are sorted and their duplicate
    /// entries summed.
    pub fn new(mut a: CsrMatrix<T>) -> Result<Self> {
        a.validate_square()?;
        if !a.has_sorted_rows() {
            a.sort_rows();
        }
        Ok(Self {
            levels: vec![AmgLevel::new(a)?],
            transfers: Vec::new(),
            coarse: None,
            amli_coef: Vec::new(),
            workspace_factor: 0,
            setup_time_ms: 0.0,
        })
    }

    /// Validate `a`, then run [`amg_setup`].
    pub fn build(a: CsrMatrix<T>, param: &AmgParam) -> Result<Self> {
        let mut hierarchy = Self::new(a)?;
        amg_setup(&mut hierarchy, param)?;
        Ok(hierarchy)
    }

    /// True once [`amg_setup`] has completed
    pub fn is_set_up(&self) -> bool {
        self.coarse.is_some()
    }

    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Level `l`, 0 being the finest
    pub fn level(&self, l: usize) -> Option<&AmgLevel<T>> {
        self.levels.get(l)
    }

    /// Transfer operators between level `l` and `l + 1`
    pub fn transfer(&self, l: usize) -> Option<&Transfer<T>> {
        self.transfers.get(l)
    }

    /// Unknowns per level
    pub fn level_sizes(&self) -> Vec<usize> {
        self.levels.iter().map(AmgLevel::size).collect()
    }

    /// Sum of unknowns over all levels divided by the fine unknowns
    pub fn grid_complexity(&self) -> f64 {
        let fine = self.levels[0].size().max(1) as f64;
        self.levels.iter().map(|l| l.size() as f64).sum::<f64>() / fine
    }

    /// Sum of nonzeros over all levels divided by the fine nonzeros
    pub fn operator_complexity(&self) -> f64 {
        let fine = self.levels[0].a.nnz().max(1) as f64;
        self.levels.iter().map(|l| l.a.nnz() as f64).sum::<f64>() / fine
    }

    /// Setup time in milliseconds
    pub fn setup_time_ms(&self) -> f64 {
        self.setup_time_ms
    }

    /// Summary of the hierarchy
    pub fn diagnostics(&self) -> AmgDiagnostics {
        AmgDiagnostics {
            num_levels: self.levels.len(),
            level_dofs: self.level_sizes(),
            level_nnz: self.levels.iter().map(|l| l.a.nnz()).collect(),
            level_smoothers: self
                .levels
                .iter()
                .map(|l| l.smoother.name().to_string())
                .collect(),
            grid_complexity: self.grid_complexity(),
            operator_complexity: self.operator_complexity(),
            coarse_solver: self
                .coarse
                .as_ref()
                .map_or("none", |c| c.name())
                .to_string(),
            setup_time_ms: self.setup_time_ms,
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.levels.truncate(1);
        let fine = &mut self.levels[0];
        fine.cfmark.clear();
        fine.smoother = LevelSmoother::point(&fine.a)?;
        self.transfers.clear();
        self.coarse = None;
        self.amli_coef.clear();
        Ok(())
    }
}

/// Smoother data of level `level`; an ILU failure is returned to the caller.
fn level_smoother<T: RealField>(
    a: &CsrMatrix<T>,
    param: &AmgParam,
    level: usize,
) -> Result<LocalSmoother<T>> {
    if level < param.ilu_levels {
        let ilu = IluData::factorize(
            a,
            param.ilu_type,
            param.ilu_lfil,
            param.ilu_droptol,
            param.ilu_relax,
        )?;
        if param.print_level >= PRINT_MORE {
            log::debug!("Level {level}: ILU smoother, nnz(LU) = {}", ilu.nnz());
        }
        return Ok(LocalSmoother::Ilu(ilu));
    }
    if level < param.schwarz_levels {
        match SchwarzData::setup(
            a,
            param.schwarz_maxlvl,
            param.schwarz_mmsize,
            param.schwarz_type,
        ) {
            Ok(schwarz) => {
                if param.print_level >= PRINT_MORE {
                    log::debug!(
                        "Level {level}: Schwarz smoother, {} blocks, largest {}",
                        schwarz.num_blocks(),
                        schwarz.largest_block()
                    );
                }
                return Ok(LocalSmoother::Schwarz(schwarz));
            }
            Err(e) if e.is_recoverable() => {
                if param.print_level >= PRINT_MIN {
                    log::warn!("Level {level}: Schwarz setup failed ({e}), using point smoother");
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(LocalSmoother::Point)
}

/// Build the multigrid hierarchy on top of the fine matrix in `hierarchy`.
///
/// Recoverable failures (empty strength graph, no C-points, missing
/// interpolation, ILU breakdown) end coarsening at the current level and the
/// setup still succeeds. Invalid parameters and allocation failures abort.
pub fn amg_setup<T: RealField>(hierarchy: &mut AmgHierarchy<T>, param: &AmgParam) -> Result<()> {
    param.validate()?;
    let start = Instant::now();
    hierarchy.reset()?;

    let verbose = param.print_level;
    let stop_size = param.coarse_dof.max(MIN_COARSE_SIZE);
    let mut coarsening = param.coarsening_type;
    let aggressive_level = if coarsening == CoarseningType::Aggressive {
        param.aggressive_level.max(1)
    } else {
        param.aggressive_level
    };
    let mut locals: Vec<LocalSmoother<T>> = Vec::new();

    while hierarchy.levels.len() < param.max_levels {
        let level = hierarchy.levels.len() - 1;
        let a = &hierarchy.levels[level].a;
        let n = a.num_rows;
        if n <= stop_size {
            break;
        }

        match level_smoother(a, param, level) {
            Ok(local) => locals.push(local),
            Err(e) if e.is_recoverable() => {
                if verbose >= PRINT_MIN {
                    log::warn!("Level {level}: {e}; stopping coarsening");
                }
                break;
            }
            Err(e) => return Err(e),
        }

        if coarsening == CoarseningType::Aggressive && level >= aggressive_level {
            coarsening = CoarseningType::Classical;
        }

        let sc = strong_connections(a, param);
        let splitting = match split(&sc, coarsening, param.aggressive_path, level) {
            Ok(splitting) => splitting,
            Err(e) if e.is_recoverable() => {
                if verbose >= PRINT_MIN {
                    log::warn!("{e}; level {level} becomes the coarsest");
                }
                break;
            }
            Err(e) => return Err(e),
        };

        let num_coarse = splitting.num_coarse;
        if num_coarse <= MIN_COARSE_SIZE {
            if verbose >= PRINT_MIN {
                log::warn!("Level {level}: only {num_coarse} C-points, stopping coarsening");
            }
            hierarchy.levels[level].cfmark = splitting.vertices;
            break;
        }
        if num_coarse >= n {
            if verbose >= PRINT_MIN {
                log::warn!("Level {level}: splitting kept all {n} unknowns; stopping coarsening");
            }
            break;
        }

        let interpolation = if coarsening == CoarseningType::Aggressive {
            InterpolationType::Standard
        } else {
            param.interpolation_type
        };
        if num_coarse as f64 * 1.5 > n as f64 {
            coarsening = CoarseningType::Classical;
        }

        let p = match interpolate(a, &sc, &splitting, interpolation, param.truncation_threshold) {
            Ok(p) => p,
            Err(e) if e.is_recoverable() => {
                if verbose >= PRINT_MIN {
                    log::warn!("{e}; level {level} becomes the coarsest");
                }
                break;
            }
            Err(e) => return Err(e),
        };
        let r = p.transpose();
        let mut a_coarse = match param.rap_variant {
            RapVariant::TwoStage => rap(&r, a, &p)?,
            RapVariant::PTransposeAp => ptap(a, &p)?,
        };
        if param.diagonal_preference {
            a_coarse.diag_pref();
        }

        if verbose >= PRINT_MORE {
            log::debug!(
                "Level {}: {:?} interpolation, {} -> {} unknowns, nnz(P) = {}, nnz(A_c) = {}",
                level,
                interpolation,
                n,
                num_coarse,
                p.nnz(),
                a_coarse.nnz()
            );
        }

        hierarchy.levels[level].cfmark = splitting.vertices;
        hierarchy.transfers.push(Transfer { p, r });
        hierarchy.levels.push(AmgLevel::new(a_coarse)?);
    }

    let factor = param.cycle_type.workspace_factor();
    let num_transfers = hierarchy.transfers.len();
    for (l, (level, local)) in hierarchy.levels.iter_mut().zip(locals).enumerate() {
        if l < num_transfers {
            level.smoother = LevelSmoother::with_local(&level.a, local)?;
        }
    }
    for level in hierarchy.levels.iter_mut() {
        let n = level.size();
        level.b = try_zeroed(n, T::zero())?;
        level.x = try_zeroed(n, T::zero())?;
        level.w = try_zeroed(factor * n, T::zero())?;
    }
    hierarchy.workspace_factor = factor;

    let coarsest = hierarchy
        .levels
        .last_mut()
        .ok_or(AmgError::NotSetUp)?;
    let preferred: Box<dyn CoarseSolver<T>> = match param.coarse_solver {
        CoarseSolverType::Iterative => Box::new(
            IterativeCoarseSolver::new(param.tol).with_warnings(verbose >= PRINT_SOME),
        ),
        CoarseSolverType::DenseLu => {
            coarsest.a.sort_rows();
            Box::new(DenseLuCoarseSolver::new())
        }
    };
    hierarchy.coarse = Some(setup_with_fallback(
        preferred,
        &coarsest.a,
        param.tol,
        verbose,
    )?);

    hierarchy.amli_coef = amli_coefficients(AMLI_LAMBDA_MIN, AMLI_LAMBDA_MAX, param.amli_degree)
        .into_iter()
        .map(T::real)
        .collect();
    hierarchy.setup_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    if verbose >= PRINT_MIN {
        log::info!(
            "AMG setup: {} levels {:?}, grid complexity {:.3}, operator complexity {:.3}, {:.1} ms",
            hierarchy.num_levels(),
            hierarchy.level_sizes(),
            hierarchy.grid_complexity(),
            hierarchy.operator_complexity(),
            hierarchy.setup_time_ms
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amg::param::SmootherType;
    use approx::assert_relative_eq;

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

    #[test]
    fn test_1d_hierarchy_shapes() {
        let h = AmgHierarchy::build(laplacian_1d(1023), &AmgParam::default()).unwrap();
        assert!(h.is_set_up());
        assert_eq!(h.level_sizes(), vec![1023, 511, 255]);

        for l in 0..h.num_levels() - 1 {
            let fine = h.level(l).unwrap();
            let coarse = h.level(l + 1).unwrap();
            let t = h.transfer(l).unwrap();
            assert_eq!(t.p.num_rows, fine.size());
            assert_eq!(t.p.num_cols, coarse.size());
            assert_eq!(t.r.num_rows, coarse.size());
            assert_eq!(t.r.num_cols, fine.size());
            assert_eq!(fine.cfmark.len(), fine.size());
            for (i, mark) in fine.cfmark.iter().enumerate() {
                if *mark == PointType::Coarse {
                    let row: Vec<_> = t.p.row_entries(i).collect();
                    assert_eq!(row.len(), 1);
                    assert_relative_eq!(row[0].1, 1.0);
                }
            }
        }

        // Galerkin operator of the 1-D stencil is the halved stencil
        let a1 = &h.level(1).unwrap().a;
        assert_relative_eq!(a1.get(0, 0), 1.0, epsilon = 1e-14);
        assert_relative_eq!(a1.get(0, 1), -0.5, epsilon = 1e-14);
        assert_relative_eq!(a1.get(5, 4), -0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_duplicate_entries_are_summed_before_coarsening() {
        // Same 1-D stencil, each -1 coupling stored as two -0.5 entries
        let n = 600;
        let mut row_ptrs = vec![0];
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for i in 0..n {
            if i + 1 < n {
                cols.extend([i + 1, i + 1]);
                vals.extend([-0.5, -0.5]);
            }
            cols.push(i);
            vals.push(2.0);
            if i > 0 {
                cols.extend([i - 1, i - 1]);
                vals.extend([-0.5, -0.5]);
            }
            row_ptrs.push(cols.len());
        }
        let duplicated = CsrMatrix::from_raw_parts(n, n, row_ptrs, cols, vals);
        assert!(duplicated.validate().is_ok());

        let param = AmgParam::default();
        let h = AmgHierarchy::build(duplicated, &param).unwrap();
        let reference = AmgHierarchy::build(laplacian_1d(n), &param).unwrap();

        assert_eq!(h.level(0).unwrap().a, reference.level(0).unwrap().a);
        assert_eq!(h.level_sizes(), reference.level_sizes());
        for l in 0..h.num_levels() - 1 {
            let p = h.transfer(l).unwrap().p.to_dense();
            let p_ref = reference.transfer(l).unwrap().p.to_dense();
            let diff = (&p - &p_ref).iter().fold(0.0f64, |m, v| m.max(v.abs()));
            assert!(diff < 1e-14, "level {l}: max |P - P_ref| = {diff}");
        }
    }

    #[test]
    fn test_depth_limit() {
        let param = AmgParam {
            max_levels: 2,
            coarse_dof: 10,
            ..Default::default()
        };
        let h = AmgHierarchy::build(laplacian_1d(1023), &param).unwrap();
        assert_eq!(h.num_levels(), 2);
    }

    #[test]
    fn test_small_coarse_grid_keeps_splitting() {
        // 99 unknowns split into 49 C-points, below the minimum coarse size
        let param = AmgParam {
            coarse_dof: 10,
            ..Default::default()
        };
        let h = AmgHierarchy::build(laplacian_1d(99), &param).unwrap();
        assert_eq!(h.num_levels(), 1);
        let fine = h.level(0).unwrap();
        assert_eq!(fine.cfmark.len(), 99);
        let num_coarse = fine
            .cfmark
            .iter()
            .filter(|&&m| m == PointType::Coarse)
            .count();
        assert_eq!(num_coarse, 49);
    }

    #[test]
    fn test_identity_stays_single_level() {
        let param = AmgParam {
            coarse_dof: 10,
            ..Default::default()
        };
        let h = AmgHierarchy::build(CsrMatrix::<f64>::identity(100), &param).unwrap();
        assert_eq!(h.num_levels(), 1);
        assert_eq!(h.diagnostics().coarse_solver, "cg");
    }

    #[test]
    fn test_rejects_invalid_input() {
        let param = AmgParam {
            strong_threshold: 1.5,
            ..Default::default()
        };
        let mut h = AmgHierarchy::new(laplacian_1d(10)).unwrap();
        assert!(matches!(
            amg_setup(&mut h, &param),
            Err(AmgError::InvalidParameter { name: "strong_threshold", .. })
        ));

        let rect = CsrMatrix::<f64>::new(3, 4);
        assert!(matches!(
            AmgHierarchy::new(rect),
            Err(AmgError::NonSquareMatrix { rows: 3, cols: 4 })
        ));
    }

    #[test]
    fn test_level_smoother_overrides() {
        let param = AmgParam {
            coarse_dof: 50,
            ilu_levels: 1,
            schwarz_levels: 2,
            schwarz_mmsize: 10,
            coarse_solver: CoarseSolverType::DenseLu,
            ..Default::default()
        };
        let h = AmgHierarchy::build(laplacian_1d(400), &param).unwrap();
        let diag = h.diagnostics();
        assert!(diag.num_levels >= 3);
        assert_eq!(diag.level_smoothers[0], "ilu");
        assert_eq!(diag.level_smoothers[1], "schwarz");
        assert_eq!(diag.level_smoothers[diag.num_levels - 1], "point");
        assert_eq!(diag.coarse_solver, "dense-lu");
    }

    #[test]
    fn test_ptap_and_diagonal_preference() {
        let two_stage = AmgHierarchy::build(laplacian_1d(300), &AmgParam {
            coarse_dof: 60,
            ..Default::default()
        })
        .unwrap();
        let param = AmgParam {
            coarse_dof: 60,
            rap_variant: RapVariant::PTransposeAp,
            diagonal_preference: true,
            ..Default::default()
        };
        let h = AmgHierarchy::build(laplacian_1d(300), &param).unwrap();
        assert_eq!(h.level_sizes(), two_stage.level_sizes());

        let a1 = &h.level(1).unwrap().a;
        let reference = &two_stage.level(1).unwrap().a;
        for i in 0..a1.num_rows {
            assert_eq!(a1.col_indices[a1.row_ptrs[i]], i);
            for j in i.saturating_sub(1)..(i + 2).min(a1.num_cols) {
                assert_relative_eq!(a1.get(i, j), reference.get(i, j), epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_diagnostics_serialize() {
        let param = AmgParam {
            smoother: SmootherType::Jacobi,
            ..Default::default()
        };
        let h = AmgHierarchy::build(laplacian_1d(700), &param).unwrap();
        let diag = h.diagnostics();
        assert_eq!(diag.level_dofs, vec![700, 350]);
        assert!(diag.operator_complexity > 1.0 && diag.operator_complexity < 2.0);

        let json = serde_json::to_string(&diag).unwrap();
        let back: AmgDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level_dofs, diag.level_dofs);
        assert!(json.contains("operator_complexity"));
    }
}
