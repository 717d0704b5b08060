//! Classical Ruge-Stüben algebraic multigrid
//!
//! Setup builds the hierarchy level by level:
//!
//! 1. [`strong_connections`]: strength graph S of the level matrix
//! 2. [`split`]: C/F splitting, classical or aggressive
//! 3. [`interpolate`]: interpolation P (direct, regular or standard), `R = P^T`
//! 4. Galerkin product `A_c = R A P`
//!
//! Solve runs recursive cycles ([`mg_cycle`]) with the smoothers of
//! [`smoother`] and a [`CoarseSolver`] on the last level, either stand-alone
//! ([`amg_solve`]) or as a preconditioner ([`AmgPreconditioner`]).
//!
//! # Example
//!
//! ```
//! use math_audio_amg::{AmgHierarchy, AmgParam, CsrMatrix, amg_solve};
//! use ndarray::Array1;
//!
//! let n = 2000;
//! let mut triplets = Vec::new();
//! for i in 0..n {
//!     triplets.push((i, i, 2.0));
//!     if i > 0 {
//!         triplets.push((i, i - 1, -1.0));
//!     }
//!     if i + 1 < n {
//!         triplets.push((i, i + 1, -1.0));
//!     }
//! }
//! let a = CsrMatrix::from_triplets(n, n, triplets);
//!
//! let param = AmgParam::default();
//! let mut hierarchy = AmgHierarchy::build(a, &param)?;
//! let b = Array1::from_elem(n, 1.0);
//! let mut x = Array1::zeros(n);
//! let solution = amg_solve(&mut hierarchy, &param, &b, &mut x)?;
//! assert!(solution.converged);
//! # Ok::<(), math_audio_amg::AmgError>(())
//! ```

pub mod coarse;
pub mod coarsening;
pub mod cycle;
pub mod interpolation;
pub mod param;
pub mod setup;
pub mod smoother;
pub mod solve;
pub mod strength;

pub use coarse::{CoarseSolver, DenseLuCoarseSolver, IterativeCoarseSolver};
pub use coarsening::{PointType, Splitting, aggressive_splitting, classical_splitting, split};
pub use cycle::{amli_coefficients, mg_cycle};
pub use interpolation::{interpolate, truncate_row};
pub use param::{
    AmgParam, CoarseSolverType, CoarseningType, CycleType, InterpolationType, IluType,
    RapVariant, SchwarzType, SmoothOrder, SmootherType, StrengthMetric,
};
pub use setup::{AmgDiagnostics, AmgHierarchy, AmgLevel, Transfer, amg_setup};
pub use solve::{AmgPreconditioner, AmgSolution, amg_solve};
pub use strength::{StrongCouplings, strong_connections};
