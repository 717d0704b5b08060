//! Sparse matrix structures and kernels
//!
//! Compressed Sparse Row storage for values ([`CsrMatrix`]) and for bare
//! patterns ([`CsrPattern`]), plus the Galerkin triple product.

mod csr;
mod pattern;
mod rap;

pub use csr::{CsrBuilder, CsrMatrix};
pub use pattern::CsrPattern;
pub use rap::{ptap, rap};
