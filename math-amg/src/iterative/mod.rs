//! Krylov solvers
//!
//! - [`cg`]: Conjugate Gradient for symmetric positive definite systems
//! - [`pcg`]: the preconditioned variant, e.g. with an AMG cycle

mod cg;

pub use cg::{CgConfig, CgSolution, cg, pcg};
