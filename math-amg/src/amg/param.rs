//! AMG parameter record
//!
//! All options that steer setup and cycling live in [`AmgParam`]. The record
//! is plain data: it is passed into setup and solve explicitly and can be
//! round-tripped through JSON parameter files.

use crate::error::{AmgError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Silent
pub const PRINT_NONE: u8 = 0;
/// Setup summary and warnings
pub const PRINT_MIN: u8 = 1;
/// Solve progress
pub const PRINT_SOME: u8 = 2;
/// Per-level details
pub const PRINT_MORE: u8 = 4;
/// Per-cycle traces
pub const PRINT_MOST: u8 = 8;

/// Multigrid cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleType {
    /// One coarse visit per level
    #[default]
    V,
    /// Two coarse visits per level
    W,
    /// Algebraic multilevel iteration with a fixed polynomial
    Amli,
    /// AMLI with Krylov-chosen coefficients
    NonlinearAmli,
    /// Flexible-CG accelerated coarse correction
    K,
}

impl CycleType {
    /// Workspace entries per unknown needed on each level
    pub fn workspace_factor(self) -> usize {
        match self {
            Self::NonlinearAmli | Self::K => 3,
            _ => 2,
        }
    }
}

/// C/F splitting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseningType {
    /// Classical Ruge-Stueben two-pass coarsening
    #[default]
    Classical,
    /// Coarsening on distance-two strong connections
    Aggressive,
}

/// Interpolation weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationType {
    /// Classical weights through strong C- and F-neighbours
    #[default]
    Direct,
    /// Sign-split row-sum scaling onto the C-neighbours
    Regular,
    /// Distance-two pattern through strong F-neighbours
    Standard,
}

/// How the strength of a coupling is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthMetric {
    /// -a_ij against the largest negative coupling (M-matrices)
    #[default]
    Negative,
    /// |a_ij| against the largest coupling magnitude
    Absolute,
}

/// Relaxation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmootherType {
    /// Damped Jacobi
    Jacobi,
    /// Gauss-Seidel
    #[default]
    GaussSeidel,
    /// Forward then backward Gauss-Seidel
    SymmetricGaussSeidel,
    /// Successive over-relaxation
    Sor,
    /// Symmetric SOR
    Ssor,
    /// Chebyshev polynomial in D^-1 A
    Polynomial,
    /// Jacobi scaled by l1 row norms
    L1Jacobi,
}

/// Sweep order of Gauss-Seidel type smoothers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothOrder {
    /// Ascending for pre-, descending for post-smoothing
    Natural,
    /// C-points then F-points for pre-, the reverse for post-smoothing
    #[default]
    Cf,
}

/// Incomplete factorization variant for the ILU smoother
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IluType {
    /// Level-of-fill ILU(k)
    #[default]
    Iluk,
    /// Threshold ILU with drop tolerance
    Ilut,
}

/// Sweep direction of the multiplicative Schwarz smoother
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchwarzType {
    /// Blocks in ascending order
    #[default]
    Forward,
    /// Blocks in descending order
    Backward,
    /// Forward then backward
    Symmetric,
}

/// Galerkin product variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RapVariant {
    /// R * (A * P) with an explicit R
    #[default]
    TwoStage,
    /// P^T * (A * P) without forming R
    PTransposeAp,
}

/// Coarsest-level solver strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseSolverType {
    /// Conjugate gradients to `tol`
    #[default]
    Iterative,
    /// Dense LU with partial pivoting
    DenseLu,
}

/// Parameters of AMG setup and solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmgParam {
    /// Upper bound on hierarchy depth
    pub max_levels: usize,
    /// Stop coarsening once n <= max(coarse_dof, 50)
    pub coarse_dof: usize,
    /// Multigrid cycle
    pub cycle_type: CycleType,

    /// C/F splitting policy
    pub coarsening_type: CoarseningType,
    /// Levels below this index use aggressive coarsening
    pub aggressive_level: usize,
    /// Distance-two paths required for an aggressive connection (1 or 2)
    pub aggressive_path: usize,
    /// Interpolation weights
    pub interpolation_type: InterpolationType,
    /// Strong connection threshold theta
    pub strong_threshold: f64,
    /// Strength measure
    pub strength_metric: StrengthMetric,
    /// Rows with |sum_j a_ij| / |a_ii| above this are treated as decoupled
    pub max_row_sum: f64,
    /// Relative cut-off for interpolation weights (0 disables truncation)
    pub truncation_threshold: f64,
    /// Galerkin product variant
    pub rap_variant: RapVariant,
    /// Store the diagonal first in every row of the coarse operators
    pub diagonal_preference: bool,

    /// Polynomial degree of AMLI cycles
    pub amli_degree: usize,

    /// Levels below this index smooth with ILU
    pub ilu_levels: usize,
    /// Level of fill (ILUk) or entries kept per row (ILUt)
    pub ilu_lfil: usize,
    /// Drop tolerance (ILUt)
    pub ilu_droptol: f64,
    /// Fraction of dropped fill added to the diagonal
    pub ilu_relax: f64,
    /// ILU variant
    pub ilu_type: IluType,

    /// Levels below this index smooth with multiplicative Schwarz
    pub schwarz_levels: usize,
    /// Maximal block size
    pub schwarz_mmsize: usize,
    /// Breadth-first layers when growing a block
    pub schwarz_maxlvl: usize,
    /// Block sweep direction
    pub schwarz_type: SchwarzType,

    /// Pre-smoothing sweeps
    pub presmooth_iter: usize,
    /// Post-smoothing sweeps
    pub postsmooth_iter: usize,
    /// Relaxation method
    pub smoother: SmootherType,
    /// Sweep order of Gauss-Seidel type smoothers
    pub smooth_order: SmoothOrder,
    /// Relaxation factor for SOR/SSOR
    pub relaxation: f64,
    /// Damping of the Jacobi smoother
    pub jacobi_weight: f64,
    /// Degree of the polynomial smoother
    pub polynomial_degree: usize,

    /// Coarsest-level solver
    pub coarse_solver: CoarseSolverType,
    /// Relative tolerance of the iterative coarsest-level solve
    pub tol: f64,

    /// Maximal number of cycles in [`crate::amg_solve`]
    pub maxit: usize,
    /// Relative residual target of [`crate::amg_solve`]
    pub solve_tol: f64,

    /// Verbosity (0, 1, 2, 4, 8)
    pub print_level: u8,
}

impl Default for AmgParam {
    fn default() -> Self {
        Self {
            max_levels: 20,
            coarse_dof: 500,
            cycle_type: CycleType::default(),
            coarsening_type: CoarseningType::default(),
            aggressive_level: 0,
            aggressive_path: 1,
            interpolation_type: InterpolationType::default(),
            strong_threshold: 0.25,
            strength_metric: StrengthMetric::default(),
            max_row_sum: 0.9,
            truncation_threshold: 0.2,
            rap_variant: RapVariant::default(),
            diagonal_preference: false,
            amli_degree: 2,
            ilu_levels: 0,
            ilu_lfil: 0,
            ilu_droptol: 0.001,
            ilu_relax: 0.0,
            ilu_type: IluType::default(),
            schwarz_levels: 0,
            schwarz_mmsize: 200,
            schwarz_maxlvl: 3,
            schwarz_type: SchwarzType::default(),
            presmooth_iter: 1,
            postsmooth_iter: 1,
            smoother: SmootherType::default(),
            smooth_order: SmoothOrder::default(),
            relaxation: 1.0,
            jacobi_weight: 2.0 / 3.0,
            polynomial_degree: 3,
            coarse_solver: CoarseSolverType::default(),
            tol: 1e-6,
            maxit: 100,
            solve_tol: 1e-8,
            print_level: PRINT_NONE,
        }
    }
}

impl AmgParam {
    /// Classical Ruge-Stueben V-cycle (same as `default()`)
    pub fn classical() -> Self {
        Self::default()
    }

    /// Aggressive coarsening on the finest level, standard interpolation
    pub fn aggressive() -> Self {
        Self {
            coarsening_type: CoarseningType::Aggressive,
            aggressive_level: 1,
            interpolation_type: InterpolationType::Standard,
            ..Default::default()
        }
    }

    /// AMLI cycle with a degree-2 polynomial
    pub fn amli() -> Self {
        Self {
            cycle_type: CycleType::Amli,
            amli_degree: 2,
            smoother: SmootherType::SymmetricGaussSeidel,
            ..Default::default()
        }
    }

    /// K-cycle with symmetric smoothing
    pub fn kcycle() -> Self {
        Self {
            cycle_type: CycleType::K,
            smoother: SmootherType::SymmetricGaussSeidel,
            ..Default::default()
        }
    }

    /// Check that every option lies in its admissible range.
    pub fn validate(&self) -> Result<()> {
        fn bad(name: &'static str, reason: impl Into<String>) -> Result<()> {
            Err(AmgError::InvalidParameter {
                name,
                reason: reason.into(),
            })
        }

        if self.max_levels < 1 {
            return bad("max_levels", "must be at least 1");
        }
        if !(self.strong_threshold > 0.0 && self.strong_threshold < 1.0) {
            return bad("strong_threshold", "must lie in (0, 1)");
        }
        if !(self.truncation_threshold >= 0.0 && self.truncation_threshold < 1.0) {
            return bad("truncation_threshold", "must lie in [0, 1)");
        }
        if !(self.max_row_sum > 0.0) {
            return bad("max_row_sum", "must be positive");
        }
        if !(self.relaxation > 0.0 && self.relaxation < 2.0) {
            return bad("relaxation", "must lie in (0, 2)");
        }
        if !(self.jacobi_weight > 0.0 && self.jacobi_weight <= 1.0) {
            return bad("jacobi_weight", "must lie in (0, 1]");
        }
        if self.polynomial_degree < 1 {
            return bad("polynomial_degree", "must be at least 1");
        }
        if !(self.tol > 0.0) {
            return bad("tol", "must be positive");
        }
        if !(self.solve_tol > 0.0) {
            return bad("solve_tol", "must be positive");
        }
        if !(1..=2).contains(&self.aggressive_path) {
            return bad("aggressive_path", "must be 1 or 2");
        }
        if !(self.ilu_droptol >= 0.0) {
            return bad("ilu_droptol", "must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.ilu_relax) {
            return bad("ilu_relax", "must lie in [0, 1]");
        }
        if self.schwarz_mmsize < 1 {
            return bad("schwarz_mmsize", "must be at least 1");
        }
        Ok(())
    }

    /// Parse parameters from a JSON string; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let param: Self = serde_json::from_str(json)
            .map_err(|e| AmgError::Config(format!("failed to parse parameters: {e}")))?;
        param.validate()?;
        Ok(param)
    }

    /// Load parameters from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AmgError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Save parameters to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AmgError::Config(format!("failed to serialize parameters: {e}")))?;
        fs::write(path, json)
            .map_err(|e| AmgError::Config(format!("failed to write {}: {e}", path.display())))
    }
}
