//! Galerkin triple product A_c = R * A * P
//!
//! Two variants are provided. [`rap`] multiplies through an explicit
//! restriction, [`ptap`] scatters rows of P^T (AP) straight into the coarse
//! rows without forming R. They differ only in summation order, so results
//! agree to round-off, not bitwise.

use super::csr::{CsrMatrix, assemble_rows};
use crate::error::{AmgError, Result};
use crate::traits::RealField;

fn check_shapes<T: RealField>(
    r: Option<&CsrMatrix<T>>,
    a: &CsrMatrix<T>,
    p: &CsrMatrix<T>,
) -> Result<()> {
    if a.num_rows != a.num_cols {
        return Err(AmgError::NonSquareMatrix {
            rows: a.num_rows,
            cols: a.num_cols,
        });
    }
    if p.num_rows != a.num_cols {
        return Err(AmgError::DimensionMismatch {
            expected: a.num_cols,
            got: p.num_rows,
        });
    }
    if let Some(r) = r {
        if r.num_cols != a.num_rows {
            return Err(AmgError::DimensionMismatch {
                expected: a.num_rows,
                got: r.num_cols,
            });
        }
        if r.num_rows != p.num_cols {
            return Err(AmgError::DimensionMismatch {
                expected: p.num_cols,
                got: r.num_rows,
            });
        }
    }
    Ok(())
}

/// Two-stage product R * (A * P).
///
/// Both stages are row-parallel over their left factor; every output row is
/// written by exactly one worker.
pub fn rap<T: RealField>(
    r: &CsrMatrix<T>,
    a: &CsrMatrix<T>,
    p: &CsrMatrix<T>,
) -> Result<CsrMatrix<T>> {
    check_shapes(Some(r), a, p)?;
    let ap = a.matmul(p);
    Ok(r.matmul(&ap))
}

/// P^T * (A * P) without materializing R.
pub fn ptap<T: RealField>(a: &CsrMatrix<T>, p: &CsrMatrix<T>) -> Result<CsrMatrix<T>> {
    check_shapes(None, a, p)?;
    let ap = a.matmul(p);
    let nc = p.num_cols;

    let mut scattered: Vec<Vec<(usize, T)>> = vec![Vec::new(); nc];
    for i in 0..p.num_rows {
        for (ci, p_ic) in p.row_entries(i) {
            scattered[ci].extend(ap.row_entries(i).map(|(cj, ap_ij)| (cj, p_ic * ap_ij)));
        }
    }

    let rows: Vec<(Vec<usize>, Vec<T>)> = scattered
        .into_iter()
        .map(|mut row_data| {
            row_data.sort_by_key(|&(j, _)| j);
            let mut cols: Vec<usize> = Vec::with_capacity(row_data.len());
            let mut vals: Vec<T> = Vec::with_capacity(row_data.len());
            for (j, val) in row_data {
                match cols.last() {
                    Some(&last) if last == j => {
                        if let Some(v) = vals.last_mut() {
                            *v += val;
                        }
                    }
                    _ => {
                        cols.push(j);
                        vals.push(val);
                    }
                }
            }
            (cols, vals)
        })
        .collect();

    Ok(assemble_rows(nc, nc, rows))
}
