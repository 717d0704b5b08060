//! Incomplete LU factorizations used as level smoothers
//!
//! Rows are eliminated one at a time against the already finished rows of U
//! (IKJ order) in a dense work row:
//!
//! - **ILU(k)**: a fill entry created from `l_ik * u_kj` gets level
//!   `lev(i,k) + lev(k,j) + 1` and is kept while the level is at most `lfil`.
//! - **ILUt**: multipliers and entries below `droptol * ||a_i||_2` are
//!   dropped; with `lfil > 0` each factor row keeps its `lfil` largest entries.
//!
//! Dropped fill scaled by `relax` is added back onto the diagonal (modified
//! ILU when `relax == 1`).

use std::collections::BTreeSet;

use crate::amg::param::IluType;
use crate::error::{AmgError, Result};
use crate::sparse::CsrMatrix;
use crate::traits::{RealField, SMALL_REAL};

/// Entry of a finished U row: column, value, fill level
type UEntry<T> = (usize, T, usize);

/// Incomplete factors `A ~ L U` with unit lower triangular L
#[derive(Debug, Clone)]
pub struct IluData<T: RealField> {
    n: usize,
    /// Strictly lower part of L, rows sorted
    l: Vec<Vec<(usize, T)>>,
    /// Strictly upper part of U, rows sorted
    u: Vec<Vec<(usize, T)>>,
    /// Inverse pivots
    inv_diag: Vec<T>,
}

/// Keep the `limit` largest magnitudes of `entries`, returning the cut ones.
fn keep_largest<T: RealField>(entries: &mut Vec<(usize, T)>, limit: usize) -> Vec<(usize, T)> {
    if limit == 0 || entries.len() <= limit {
        return Vec::new();
    }
    entries.sort_by(|x, y| {
        y.1.abs()
            .partial_cmp(&x.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let cut = entries.drain(limit..).collect();
    entries.sort_by_key(|&(j, _)| j);
    cut
}

impl<T: RealField> IluData<T> {
    /// Factorize `a`.
    ///
    /// Fails with [`AmgError::IluSetupFailed`] on a zero pivot.
    pub fn factorize(
        a: &CsrMatrix<T>,
        kind: IluType,
        lfil: usize,
        droptol: f64,
        relax: f64,
    ) -> Result<Self> {
        a.validate_square()?;
        let n = a.num_rows;
        let relax = T::real(relax);
        let droptol = T::real(droptol);
        let tiny = T::real(SMALL_REAL);

        let mut w = vec![T::zero(); n];
        let mut lev = vec![0usize; n];
        let mut in_row = vec![false; n];
        let mut u_rows: Vec<Vec<UEntry<T>>> = Vec::with_capacity(n);
        let mut l = Vec::with_capacity(n);
        let mut inv_diag = Vec::with_capacity(n);
        // row sums of the finished U rows, pivot included
        let mut u_rowsum: Vec<T> = Vec::with_capacity(n);

        for i in 0..n {
            let mut cols: Vec<usize> = Vec::with_capacity(a.row_nnz(i) + 1);
            let mut pending = BTreeSet::new();
            let mut row_norm = T::zero();

            for (j, v) in a.row_entries(i) {
                if !in_row[j] {
                    in_row[j] = true;
                    cols.push(j);
                    w[j] = T::zero();
                    lev[j] = 0;
                    if j < i {
                        pending.insert(j);
                    }
                }
                w[j] += v;
                row_norm += v * v;
            }
            if !in_row[i] {
                in_row[i] = true;
                cols.push(i);
                w[i] = T::zero();
                lev[i] = 0;
            }
            let tol = droptol * row_norm.sqrt();
            let mut dropped = T::zero();

            while let Some(k) = pending.pop_first() {
                let l_ik = w[k] * inv_diag[k];
                if kind == IluType::Ilut && l_ik.abs() < tol {
                    dropped += w[k];
                    w[k] = T::zero();
                    continue;
                }
                w[k] = l_ik;
                let lev_ik = lev[k];

                for &(j, u_kj, lev_kj) in &u_rows[k] {
                    let fill = l_ik * u_kj;
                    let new_lev = lev_ik + lev_kj + 1;
                    if in_row[j] {
                        w[j] -= fill;
                        lev[j] = lev[j].min(new_lev);
                    } else if kind == IluType::Iluk && new_lev > lfil {
                        dropped -= fill;
                    } else {
                        in_row[j] = true;
                        cols.push(j);
                        w[j] = -fill;
                        lev[j] = new_lev;
                        if j < i {
                            pending.insert(j);
                        }
                    }
                }
            }

            let mut lower: Vec<(usize, T)> = Vec::new();
            let mut upper: Vec<(usize, T)> = Vec::new();
            for &j in &cols {
                in_row[j] = false;
                let v = w[j];
                if j == i || v.is_zero() {
                    continue;
                }
                if kind == IluType::Ilut && j > i && v.abs() < tol {
                    dropped += v;
                    continue;
                }
                if j < i {
                    lower.push((j, v));
                } else {
                    upper.push((j, v));
                }
            }
            lower.sort_by_key(|&(j, _)| j);
            upper.sort_by_key(|&(j, _)| j);
            if kind == IluType::Ilut {
                // a cut multiplier removes l_ik times the whole of row k of U
                for (k, l_ik) in keep_largest(&mut lower, lfil) {
                    dropped += l_ik * u_rowsum[k];
                }
                for (_, v) in keep_largest(&mut upper, lfil) {
                    dropped += v;
                }
            }

            let pivot = w[i] + relax * dropped;
            if pivot.abs() < tiny {
                return Err(AmgError::IluSetupFailed { row: i });
            }
            inv_diag.push(T::one() / pivot);
            u_rowsum.push(upper.iter().fold(pivot, |acc, &(_, v)| acc + v));
            u_rows.push(upper.iter().map(|&(j, v)| (j, v, lev[j])).collect());
            l.push(lower);
        }

        let u = u_rows
            .into_iter()
            .map(|row| row.into_iter().map(|(j, v, _)| (j, v)).collect())
            .collect();
        Ok(Self { n, l, u, inv_diag })
    }

    /// Number of unknowns
    pub fn len(&self) -> usize {
        self.n
    }

    /// True for a factorization of an empty matrix
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Stored entries of L and U, pivots included
    pub fn nnz(&self) -> usize {
        self.n
            + self.l.iter().map(Vec::len).sum::<usize>()
            + self.u.iter().map(Vec::len).sum::<usize>()
    }

    /// Overwrite `z` with `(LU)^{-1} z`.
    pub fn solve_in_place(&self, z: &mut [T]) {
        for i in 0..self.n {
            let mut sum = z[i];
            for &(j, l_ij) in &self.l[i] {
                sum -= l_ij * z[j];
            }
            z[i] = sum;
        }
        for i in (0..self.n).rev() {
            let mut sum = z[i];
            for &(j, u_ij) in &self.u[i] {
                sum -= u_ij * z[j];
            }
            z[i] = sum * self.inv_diag[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn tridiagonal(n: usize) -> CsrMatrix<f64> {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 4.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    fn check_exact(a: &CsrMatrix<f64>, ilu: &IluData<f64>) {
        let n = a.num_rows;
        let x_true = Array1::from_iter((0..n).map(|i| 1.0 + i as f64 * 0.5));
        let b = a.matvec(&x_true);
        let mut z = b.to_vec();
        ilu.solve_in_place(&mut z);
        for i in 0..n {
            assert_relative_eq!(z[i], x_true[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ilu0_exact_on_tridiagonal() {
        let a = tridiagonal(10);
        let ilu = IluData::factorize(&a, IluType::Iluk, 0, 0.0, 0.0).unwrap();
        assert_eq!(ilu.nnz(), a.nnz());
        check_exact(&a, &ilu);
    }

    #[test]
    fn test_full_fill_is_exact() {
        // arrow matrix: ILU(0) loses fill, ILU(n) and ILUt without dropping are exact
        let n = 6;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 5.0));
            if i > 0 {
                triplets.push((0, i, -1.0));
                triplets.push((i, 0, -1.0));
            }
        }
        let a = CsrMatrix::from_triplets(n, n, triplets);

        let iluk = IluData::factorize(&a, IluType::Iluk, n, 0.0, 0.0).unwrap();
        check_exact(&a, &iluk);
        let ilut = IluData::factorize(&a, IluType::Ilut, 0, 0.0, 0.0).unwrap();
        check_exact(&a, &ilut);

        let ilu0 = IluData::factorize(&a, IluType::Iluk, 0, 0.0, 0.0).unwrap();
        assert!(ilu0.nnz() < iluk.nnz());
    }

    fn grid(m: usize, diag: f64) -> CsrMatrix<f64> {
        let n = m * m;
        let mut triplets = Vec::new();
        for r in 0..m {
            for c in 0..m {
                let i = r * m + c;
                triplets.push((i, i, diag));
                if r > 0 {
                    triplets.push((i, i - m, -1.0));
                }
                if r + 1 < m {
                    triplets.push((i, i + m, -1.0));
                }
                if c > 0 {
                    triplets.push((i, i - 1, -1.0));
                }
                if c + 1 < m {
                    triplets.push((i, i + 1, -1.0));
                }
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    /// (L U) * ones
    fn lu_row_sums(ilu: &IluData<f64>) -> Vec<f64> {
        let u_sums: Vec<f64> = (0..ilu.n)
            .map(|i| ilu.u[i].iter().fold(1.0 / ilu.inv_diag[i], |acc, &(_, v)| acc + v))
            .collect();
        (0..ilu.n)
            .map(|i| ilu.l[i].iter().fold(u_sums[i], |acc, &(k, l)| acc + l * u_sums[k]))
            .collect()
    }

    #[test]
    fn test_ilut_drop_tolerance_reduces_fill() {
        let a = grid(8, 4.0);
        let full = IluData::factorize(&a, IluType::Ilut, 0, 0.0, 0.0).unwrap();
        check_exact(&a, &full);
        let dropped = IluData::factorize(&a, IluType::Ilut, 0, 0.02, 0.0).unwrap();
        assert!(dropped.nnz() < full.nnz());
        assert!(full.nnz() > a.nnz());
    }

    #[test]
    fn test_ilut_lfil_caps_factor_rows() {
        let a = grid(6, 4.0);
        let ilu = IluData::factorize(&a, IluType::Ilut, 2, 0.0, 0.0).unwrap();
        assert!(ilu.l.iter().all(|row| row.len() <= 2));
        assert!(ilu.u.iter().all(|row| row.len() <= 2));
        assert!(ilu.l.iter().any(|row| row.len() == 2));
        for row in ilu.l.iter().chain(&ilu.u) {
            assert!(row.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[test]
    fn test_modified_ilu_preserves_row_sums() {
        let a = grid(6, 5.0);
        let a_sums = a.matvec(&Array1::from_elem(a.num_rows, 1.0));
        let configs = [
            (IluType::Iluk, 0, 0.0),
            (IluType::Ilut, 0, 0.02),
            (IluType::Ilut, 2, 0.02),
            (IluType::Ilut, 1, 0.0),
            (IluType::Ilut, 0, 0.1),
        ];
        for (kind, lfil, droptol) in configs {
            let ilu = IluData::factorize(&a, kind, lfil, droptol, 1.0).unwrap();
            let sums = lu_row_sums(&ilu);
            for i in 0..a.num_rows {
                assert_relative_eq!(sums[i], a_sums[i], epsilon = 1e-10);
            }
        }

        // without relaxation the dropped fill is lost
        let plain = IluData::factorize(&a, IluType::Ilut, 2, 0.02, 0.0).unwrap();
        let sums = lu_row_sums(&plain);
        assert!((0..a.num_rows).any(|i| (sums[i] - a_sums[i]).abs() > 1e-6));
    }

    #[test]
    fn test_zero_pivot_fails() {
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 1, 1.0_f64), (1, 0, 1.0)]);
        assert!(matches!(
            IluData::factorize(&a, IluType::Iluk, 0, 0.0, 0.0),
            Err(AmgError::IluSetupFailed { row: 0 })
        ));
    }
}
