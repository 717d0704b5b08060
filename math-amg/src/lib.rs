//! Classical algebraic multigrid for sparse elliptic systems
//!
//! This crate builds Ruge-Stüben AMG hierarchies from a CSR matrix alone and
//! applies them as a stand-alone solver or as a preconditioner for CG.
//!
//! # Features
//!
//! - **Coarsening**: classical two-pass splitting and aggressive (distance-two)
//!   coarsening
//! - **Interpolation**: direct, regular and standard, with weight truncation
//! - **Cycles**: V, W, AMLI, non-linear AMLI and K-cycle
//! - **Smoothers**: Jacobi, Gauss-Seidel (natural or C/F order), SOR/SSOR,
//!   Chebyshev polynomial, l1-Jacobi, ILU(k)/ILUt and multiplicative Schwarz
//! - **Sparse kernels**: CSR transpose, row sorting, matvec and the Galerkin
//!   triple product, row-parallel with the `rayon` feature
//! - **Generic Scalar Types**: f64 and f32
//!
//! # Example
//!
//! ```ignore
//! use math_audio_amg::{AmgParam, AmgPreconditioner, CgConfig, pcg};
//!
//! let precond = AmgPreconditioner::from_csr(&matrix, AmgParam::default())?;
//! let solution = pcg(&matrix, &precond, &rhs, &CgConfig::default());
//! ```

pub mod amg;
pub mod direct;
pub mod error;
pub mod iterative;
pub mod ordering;
pub mod parallel;
pub mod sparse;
pub mod traits;

// Re-export main types
pub use error::{AmgError, Result, status_code};
pub use sparse::{CsrBuilder, CsrMatrix, CsrPattern};
pub use traits::{IdentityPreconditioner, LinearOperator, Preconditioner, RealField};

// Re-export AMG setup and solve
pub use amg::{
    AmgDiagnostics, AmgHierarchy, AmgParam, AmgPreconditioner, AmgSolution, CoarseningType,
    CycleType, InterpolationType, SmootherType, amg_setup, amg_solve, mg_cycle,
};

// Re-export Krylov and direct solvers
pub use direct::{LuFactorization, lu_solve};
pub use iterative::{CgConfig, CgSolution, cg, pcg};
