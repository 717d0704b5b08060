//! Direct solvers for linear systems
//!
//! - [`lu_solve`]: dense LU decomposition with partial pivoting

mod lu;

pub use lu::{LuFactorization, lu_factorize, lu_factorize_csr, lu_solve};
