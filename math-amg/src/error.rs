//! Error types for AMG setup and solve.
//!
//! Every error maps onto an integer status code so that callers driving the
//! solver from a status-oriented interface can report the same codes as the
//! classical multigrid packages (0 = success, negative = failure).

use thiserror::Error;

/// Status returned on success.
pub const SUCCESS: i32 = 0;
/// Failure while reading a parameter file.
pub const ERROR_INPUT_FILE: i32 = -11;
/// Invalid or inconsistent input parameter.
pub const ERROR_INPUT_PAR: i32 = -13;
/// Memory allocation failed.
pub const ERROR_ALLOC_MEM: i32 = -20;
/// Broken data structure (malformed CSR, wrong shape, missing setup).
pub const ERROR_DATA_STRUCTURE: i32 = -21;
/// Zero diagonal entry where a pivot is required.
pub const ERROR_DATA_ZERODIAG: i32 = -22;
/// ILU setup hit a zero pivot.
pub const ERROR_SOLVER_ILUSETUP: i32 = -45;
/// Miscellaneous solver failure (coarse factorization).
pub const ERROR_SOLVER_MISC: i32 = -46;
/// Coarsening or interpolation could not proceed.
pub const RUN_FAIL: i32 = -100;

/// Errors that can occur while building or applying an AMG hierarchy.
#[derive(Debug, Error)]
pub enum AmgError {
    /// A parameter is out of its admissible range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Vector or matrix sizes disagree.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected length
        expected: usize,
        /// Length provided
        got: usize,
    },

    /// The system matrix is not square.
    #[error("matrix must be square, got {rows}x{cols}")]
    NonSquareMatrix {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },

    /// Row pointers or column indices violate the CSR invariants.
    #[error("malformed CSR matrix: {reason}")]
    MalformedCsr {
        /// Description of the broken invariant
        reason: String,
    },

    /// A required diagonal entry is zero.
    #[error("zero diagonal entry in row {row}")]
    ZeroDiagonal {
        /// Offending row
        row: usize,
    },

    /// Workspace reservation failed.
    #[error("failed to allocate workspace of {len} entries")]
    AllocationFailed {
        /// Requested length
        len: usize,
    },

    /// The C/F splitting produced no usable coarse grid.
    #[error("coarsening failed on level {level}: {reason}")]
    CoarseningFailed {
        /// Level being coarsened
        level: usize,
        /// Description of the failure
        reason: String,
    },

    /// An F-point has no interpolatory C-neighbour.
    #[error("interpolation failed: F-point {row} has no coarse neighbour")]
    InterpolationFailed {
        /// Offending fine row
        row: usize,
    },

    /// Incomplete factorization met a zero pivot.
    #[error("ILU setup failed: zero pivot in row {row}")]
    IluSetupFailed {
        /// Offending row
        row: usize,
    },

    /// Coarsest-level direct factorization failed.
    #[error("coarse factorization failed: {reason}")]
    FactorizationFailed {
        /// Description of the failure
        reason: String,
    },

    /// The hierarchy has not been set up.
    #[error("AMG hierarchy has not been set up")]
    NotSetUp,

    /// Reading or parsing a parameter file failed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A specialized `Result` type for AMG operations.
pub type Result<T> = std::result::Result<T, AmgError>;

impl AmgError {
    /// Integer status code of this error.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidParameter { .. } | Self::DimensionMismatch { .. } => ERROR_INPUT_PAR,
            Self::NonSquareMatrix { .. } | Self::MalformedCsr { .. } | Self::NotSetUp => {
                ERROR_DATA_STRUCTURE
            }
            Self::ZeroDiagonal { .. } => ERROR_DATA_ZERODIAG,
            Self::AllocationFailed { .. } => ERROR_ALLOC_MEM,
            Self::CoarseningFailed { .. } | Self::InterpolationFailed { .. } => RUN_FAIL,
            Self::IluSetupFailed { .. } => ERROR_SOLVER_ILUSETUP,
            Self::FactorizationFailed { .. } => ERROR_SOLVER_MISC,
            Self::Config(_) => ERROR_INPUT_FILE,
        }
    }

    /// Returns `true` if setup can continue with a shorter hierarchy.
    ///
    /// Coarsening, interpolation and ILU failures truncate the hierarchy at
    /// the current level; a failed coarse factorization falls back to the
    /// iterative coarse solver.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CoarseningFailed { .. }
                | Self::InterpolationFailed { .. }
                | Self::IluSetupFailed { .. }
                | Self::FactorizationFailed { .. }
        )
    }

    /// Returns `true` if the error was caused by invalid user input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::DimensionMismatch { .. }
                | Self::NonSquareMatrix { .. }
                | Self::MalformedCsr { .. }
                | Self::ZeroDiagonal { .. }
                | Self::Config(_)
        )
    }
}

/// Collapse a result into the integer status convention.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => SUCCESS,
        Err(e) => e.status(),
    }
}

/// Reserve `len` zeroed entries, reporting allocation failure as an error.
pub(crate) fn try_zeroed<T: Clone>(len: usize, zero: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| AmgError::AllocationFailed { len })?;
    v.resize(len, zero);
    Ok(v)
}
