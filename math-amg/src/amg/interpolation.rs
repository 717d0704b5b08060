//! Interpolation operators P: coarse -> fine
//!
//! C-points copy their coarse value (a single unit weight). F-points
//! interpolate from their strong C-neighbours:
//!
//! - **Direct**: classical Ruge-Stüben weights. Strong F-neighbours that share
//!   C-points with `i` are distributed onto them, everything else is lumped
//!   into the diagonal.
//! - **Regular**: `-alpha * a_ik / a_ii` with the negative (and positive)
//!   row sums rescaled onto the interpolation set.
//! - **Standard**: strong F-neighbours are eliminated through their own rows,
//!   which widens the pattern to their C-neighbours as well.
//!
//! Rows come out with ascending coarse columns. Weights can be truncated per
//! sign group afterwards.

use std::borrow::Cow;

use super::coarsening::{PointType, Splitting};
use super::param::InterpolationType;
use super::strength::StrongCouplings;
use crate::error::{AmgError, Result};
use crate::ordering::binary_search;
use crate::parallel::{PARALLEL_ROW_THRESHOLD, parallel_map_indexed};
use crate::sparse::{CsrBuilder, CsrMatrix};
use crate::traits::{RealField, SMALL_REAL};

type SparseRow<T> = (Vec<usize>, Vec<T>);

/// Value of `a_ij` in a row-sorted matrix
#[inline]
fn entry<T: RealField>(a: &CsrMatrix<T>, i: usize, j: usize) -> T {
    let range = a.row_range(i);
    binary_search(&a.col_indices[range.clone()], j)
        .map_or(T::zero(), |pos| a.values[range.start + pos])
}

/// Shared read-only state for building the rows of P.
struct InterpContext<'a, T: RealField> {
    a: &'a CsrMatrix<T>,
    sc: &'a StrongCouplings,
    vertices: &'a [PointType],
    diag: Vec<T>,
}

impl<T: RealField> InterpContext<'_, T> {
    fn is_strong(&self, i: usize, j: usize) -> bool {
        binary_search(self.sc.s.row(i), j).is_some()
    }

    /// Strong C-neighbours of `i`, ascending
    fn strong_coarse(&self, i: usize) -> Vec<usize> {
        self.sc
            .s
            .row(i)
            .iter()
            .copied()
            .filter(|&k| self.vertices[k] == PointType::Coarse)
            .collect()
    }

    fn direct_row(&self, i: usize, c_i: &[usize]) -> Result<Vec<T>> {
        let a = self.a;
        let mut weights: Vec<T> = c_i.iter().map(|&k| entry(a, i, k)).collect();
        let mut diag = self.diag[i];

        for (j, a_ij) in a.row_entries(i) {
            if j == i {
                continue;
            }
            let strong = self.is_strong(i, j);
            if strong && self.vertices[j] == PointType::Coarse {
                continue;
            }
            if strong && self.vertices[j] == PointType::Fine {
                let denom = c_i
                    .iter()
                    .fold(T::zero(), |acc, &m| acc + entry(a, j, m));
                if denom.abs() > T::real(SMALL_REAL) {
                    for (w, &k) in weights.iter_mut().zip(c_i) {
                        *w += a_ij * entry(a, j, k) / denom;
                    }
                    continue;
                }
            }
            diag += a_ij;
        }

        if diag.abs() <= T::real(SMALL_REAL) {
            return Err(AmgError::InterpolationFailed { row: i });
        }
        Ok(weights.into_iter().map(|w| -w / diag).collect())
    }

    fn regular_row(&self, i: usize, c_i: &[usize]) -> Result<Vec<T>> {
        let a = self.a;
        let (mut neg_all, mut pos_all) = (T::zero(), T::zero());
        for (j, v) in a.row_entries(i) {
            if j == i {
                continue;
            }
            if v < T::zero() {
                neg_all += v;
            } else {
                pos_all += v;
            }
        }

        let couplings: Vec<T> = c_i.iter().map(|&k| entry(a, i, k)).collect();
        let (mut neg_set, mut pos_set) = (T::zero(), T::zero());
        for &v in &couplings {
            if v < T::zero() {
                neg_set += v;
            } else {
                pos_set += v;
            }
        }

        let mut diag = self.diag[i];
        let alpha = if neg_set.is_zero() {
            T::zero()
        } else {
            neg_all / neg_set
        };
        let beta = if pos_set > T::zero() {
            pos_all / pos_set
        } else {
            diag += pos_all;
            T::zero()
        };

        if diag.abs() <= T::real(SMALL_REAL) {
            return Err(AmgError::InterpolationFailed { row: i });
        }
        Ok(couplings
            .into_iter()
            .map(|v| {
                let scale = if v > T::zero() { beta } else { alpha };
                -scale * v / diag
            })
            .collect())
    }

    /// Standard interpolation for F-point `i`; `pattern` is the union of the
    /// strong C-neighbours of `i` and of its strong F-neighbours.
    fn standard_row(
        &self,
        i: usize,
        pattern: &[usize],
        coarse_sum: &[T],
        offdiag_sum: &[T],
    ) -> Result<Vec<T>> {
        let a = self.a;
        let mut hat = vec![T::zero(); pattern.len()];
        let mut hat_ii = self.diag[i];
        let mut al_n = offdiag_sum[i];
        let mut al_p = coarse_sum[i];

        for &k in self.sc.s.row(i) {
            let a_ik = entry(a, i, k);
            match self.vertices[k] {
                PointType::Coarse => {
                    if let Some(pos) = binary_search(pattern, k) {
                        hat[pos] += a_ik;
                    }
                }
                PointType::Fine => {
                    let a_kk = self.diag[k];
                    if a_kk.abs() <= T::real(SMALL_REAL) {
                        return Err(AmgError::InterpolationFailed { row: i });
                    }
                    let a_ki = entry(a, k, i);
                    al_n -= (offdiag_sum[k] - a_ki + a_kk) * a_ik / a_kk;
                    al_p -= coarse_sum[k] * a_ik / a_kk;
                    for &h in self.sc.s.row(k) {
                        let contribution = a_ik * entry(a, k, h) / a_kk;
                        if self.vertices[h] == PointType::Coarse {
                            if let Some(pos) = binary_search(pattern, h) {
                                hat[pos] -= contribution;
                            }
                        } else if h == i {
                            hat_ii -= contribution;
                        }
                    }
                }
                PointType::Isolated => {}
            }
        }

        if al_p.abs() <= T::real(SMALL_REAL) || hat_ii.abs() <= T::real(SMALL_REAL) {
            return Err(AmgError::InterpolationFailed { row: i });
        }
        let alpha = al_n / al_p;
        Ok(hat.into_iter().map(|h| -alpha * h / hat_ii).collect())
    }

    fn standard_pattern(&self, i: usize) -> Vec<usize> {
        let mut pattern = Vec::new();
        for &k in self.sc.s.row(i) {
            match self.vertices[k] {
                PointType::Coarse => pattern.push(k),
                PointType::Fine => pattern.extend(
                    self.sc
                        .s
                        .row(k)
                        .iter()
                        .copied()
                        .filter(|&h| self.vertices[h] == PointType::Coarse),
                ),
                PointType::Isolated => {}
            }
        }
        pattern.sort_unstable();
        pattern.dedup();
        pattern
    }
}

/// Drop small weights per sign group and rescale the survivors so that each
/// group keeps its sum.
///
/// A negative weight survives when `w <= eps * min_w`, a positive one when
/// `w >= eps * max_w`. Zero weights are always dropped.
pub fn truncate_row<T: RealField>(cols: &mut Vec<usize>, vals: &mut Vec<T>, eps: T) {
    let (mut m_min, mut p_max) = (T::zero(), T::zero());
    let (mut m_sum, mut p_sum) = (T::zero(), T::zero());
    for &v in vals.iter() {
        if v < T::zero() {
            m_min = m_min.min(v);
            m_sum += v;
        } else {
            p_max = p_max.max(v);
            p_sum += v;
        }
    }

    let keep = |v: T| (v < T::zero() && v <= m_min * eps) || (v > T::zero() && v >= p_max * eps);
    let (mut m_kept, mut p_kept) = (T::zero(), T::zero());
    for &v in vals.iter().filter(|&&v| keep(v)) {
        if v < T::zero() {
            m_kept += v;
        } else {
            p_kept += v;
        }
    }
    let m_scale = if m_kept.is_zero() { T::one() } else { m_sum / m_kept };
    let p_scale = if p_kept.is_zero() { T::one() } else { p_sum / p_kept };

    let mut write = 0;
    for read in 0..vals.len() {
        let v = vals[read];
        if keep(v) {
            cols[write] = cols[read];
            vals[write] = if v < T::zero() { v * m_scale } else { v * p_scale };
            write += 1;
        }
    }
    cols.truncate(write);
    vals.truncate(write);
}

/// Build the interpolation operator of one level.
///
/// Isolated points and F-points without strong couplings get empty rows.
/// An F-point with strong couplings but an empty interpolation set fails with
/// [`AmgError::InterpolationFailed`].
pub fn interpolate<T: RealField>(
    a: &CsrMatrix<T>,
    sc: &StrongCouplings,
    splitting: &Splitting,
    kind: InterpolationType,
    truncation: f64,
) -> Result<CsrMatrix<T>> {
    let n = a.num_rows;
    let sorted: Cow<'_, CsrMatrix<T>> = if a.has_sorted_rows() {
        Cow::Borrowed(a)
    } else {
        let mut owned = a.clone();
        owned.sort_rows();
        Cow::Owned(owned)
    };
    let a: &CsrMatrix<T> = &sorted;

    let ctx = InterpContext {
        a,
        sc,
        vertices: &splitting.vertices,
        diag: (0..n).map(|i| entry(a, i, i)).collect(),
    };
    let coarse_map = splitting.coarse_map();

    let (coarse_sum, offdiag_sum): (Vec<T>, Vec<T>) = if kind == InterpolationType::Standard {
        (0..n)
            .map(|i| {
                let cs = ctx
                    .strong_coarse(i)
                    .iter()
                    .fold(T::zero(), |acc, &k| acc + entry(a, i, k));
                let off = a
                    .row_entries(i)
                    .filter(|&(j, _)| j != i)
                    .fold(T::zero(), |acc, (_, v)| acc + v);
                (cs, off)
            })
            .unzip()
    } else {
        (Vec::new(), Vec::new())
    };

    let eps = T::real(truncation);
    let build_row = |i: usize| -> Result<SparseRow<T>> {
        match splitting.vertices[i] {
            PointType::Coarse => return Ok((vec![i], vec![T::one()])),
            PointType::Isolated => return Ok((Vec::new(), Vec::new())),
            PointType::Fine => {}
        }
        if sc.s.row(i).is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let pattern = match kind {
            InterpolationType::Standard => ctx.standard_pattern(i),
            _ => ctx.strong_coarse(i),
        };
        if pattern.is_empty() {
            return Err(AmgError::InterpolationFailed { row: i });
        }

        let weights = match kind {
            InterpolationType::Direct => ctx.direct_row(i, &pattern)?,
            InterpolationType::Regular => ctx.regular_row(i, &pattern)?,
            InterpolationType::Standard => {
                ctx.standard_row(i, &pattern, &coarse_sum, &offdiag_sum)?
            }
        };

        let (mut cols, mut vals) = (pattern, weights);
        if truncation > 0.0 {
            truncate_row(&mut cols, &mut vals, eps);
        }
        Ok((cols, vals))
    };

    let rows: Vec<Result<SparseRow<T>>> = if n >= PARALLEL_ROW_THRESHOLD {
        parallel_map_indexed(n, build_row)
    } else {
        (0..n).map(build_row).collect()
    };

    let mut builder = CsrBuilder::with_capacity(n, splitting.num_coarse, n * 4);
    for row in rows {
        let (cols, vals) = row?;
        builder.add_row_entries(
            cols.into_iter()
                .zip(vals)
                .filter_map(|(k, w)| coarse_map[k].map(|ck| (ck, w))),
        );
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amg::coarsening::split;
    use crate::amg::param::{AmgParam, CoarseningType};
    use crate::amg::strength::strong_connections;
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

    fn laplacian_2d(m: usize) -> CsrMatrix<f64> {
        let n = m * m;
        let mut triplets = Vec::new();
        for r in 0..m {
            for c in 0..m {
                let i = r * m + c;
                triplets.push((i, i, 4.0));
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

    fn build(
        a: &CsrMatrix<f64>,
        coarsening: CoarseningType,
        kind: InterpolationType,
        truncation: f64,
    ) -> (Splitting, CsrMatrix<f64>) {
        let sc = strong_connections(a, &AmgParam::default());
        let splitting = split(&sc, coarsening, 1, 0).unwrap();
        let p = interpolate(a, &sc, &splitting, kind, truncation).unwrap();
        (splitting, p)
    }

    #[test]
    fn test_1d_linear_interpolation() {
        let a = laplacian_1d(7);
        let (splitting, p) = build(&a, CoarseningType::Classical, InterpolationType::Direct, 0.0);
        assert_eq!(splitting.num_coarse, 3);
        assert_eq!(p.num_rows, 7);
        assert_eq!(p.num_cols, 3);
        let dense = p.to_dense();
        assert_relative_eq!(dense[[0, 0]], 0.5, epsilon = 1e-14);
        assert_relative_eq!(dense[[1, 0]], 1.0, epsilon = 1e-14);
        assert_relative_eq!(dense[[2, 0]], 0.5, epsilon = 1e-14);
        assert_relative_eq!(dense[[2, 1]], 0.5, epsilon = 1e-14);
        assert_relative_eq!(dense[[6, 2]], 0.5, epsilon = 1e-14);
        assert_eq!(p.nnz(), 3 + 2 * 2 + 2);
    }

    #[test]
    fn test_weights_preserve_constants_on_zero_sum_rows() {
        let m = 12;
        let a = laplacian_2d(m);
        for kind in [
            InterpolationType::Direct,
            InterpolationType::Regular,
            InterpolationType::Standard,
        ] {
            let (splitting, p) = build(&a, CoarseningType::Classical, kind, 0.2);
            assert!(p.has_sorted_rows());
            for i in 0..a.num_rows {
                let row_sum: f64 = a.row_entries(i).map(|(_, v)| v).sum();
                let weight_sum: f64 = p.row_entries(i).map(|(_, w)| w).sum();
                match splitting.vertices[i] {
                    PointType::Coarse => {
                        assert_eq!(p.row_nnz(i), 1);
                        assert_relative_eq!(weight_sum, 1.0);
                    }
                    _ if row_sum.abs() < 1e-14 => {
                        assert_relative_eq!(weight_sum, 1.0, epsilon = 1e-12);
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_standard_after_aggressive_split() {
        let a = laplacian_2d(15);
        let (splitting, p) = build(
            &a,
            CoarseningType::Aggressive,
            InterpolationType::Standard,
            0.0,
        );
        assert_eq!(p.num_cols, splitting.num_coarse);
        for i in 0..a.num_rows {
            if splitting.vertices[i] == PointType::Fine {
                assert!(p.row_nnz(i) > 0, "row {i} lost its interpolation set");
                assert!(p.row_entries(i).all(|(_, w)| w > 0.0));
            }
        }
    }

    #[test]
    fn test_truncation_rescales_sign_groups() {
        let mut cols = vec![0, 1, 2, 3];
        let mut vals = vec![0.5, 0.05, 0.45, -0.2];
        truncate_row(&mut cols, &mut vals, 0.2);
        assert_eq!(cols, vec![0, 2, 3]);
        assert_relative_eq!(vals[0], 0.5 / 0.95, epsilon = 1e-14);
        assert_relative_eq!(vals[1], 0.45 / 0.95, epsilon = 1e-14);
        assert_relative_eq!(vals[2], -0.2, epsilon = 1e-14);
    }

    #[test]
    fn test_missing_coarse_neighbour_fails() {
        let a = laplacian_1d(3);
        let sc = strong_connections(&a, &AmgParam::default());
        let splitting = Splitting {
            vertices: vec![PointType::Fine, PointType::Fine, PointType::Coarse],
            num_coarse: 1,
        };
        let result = interpolate(&a, &sc, &splitting, InterpolationType::Direct, 0.0);
        assert!(matches!(
            result,
            Err(AmgError::InterpolationFailed { row: 0 })
        ));
    }
}
