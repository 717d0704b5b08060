//! Strong-connection analysis
//!
//! Row `i` of the strength graph S lists the unknowns that strongly
//! influence `i`. With the negative metric, `j != i` is strong when
//! `-a_ij >= theta * max_k(-a_ik)`; with the absolute metric magnitudes are
//! compared instead. Rows whose `|sum_j a_ij| / |a_ii|` exceeds `max_row_sum`
//! (when that bound is below one) have only weak couplings.

use super::param::{AmgParam, StrengthMetric};
use crate::parallel::{PARALLEL_ROW_THRESHOLD, parallel_map_indexed};
use crate::sparse::{CsrMatrix, CsrPattern};
use crate::traits::{RealField, SMALL_REAL};

/// Strength graph together with the isolated-vertex flags.
#[derive(Debug, Clone)]
pub struct StrongCouplings {
    /// `s.row(i)` holds the strong dependencies of `i`, ascending
    pub s: CsrPattern,
    /// Vertices without usable couplings; their rows in `s` are empty
    pub isolated: Vec<bool>,
}

impl StrongCouplings {
    /// Number of strong edges
    pub fn nnz(&self) -> usize {
        self.s.nnz()
    }
}

struct RowStrength {
    strong: Vec<usize>,
    isolated: bool,
}

fn row_strength<T: RealField>(
    a: &CsrMatrix<T>,
    i: usize,
    theta: T,
    metric: StrengthMetric,
    max_row_sum: T,
) -> RowStrength {
    let measure = |v: T| match metric {
        StrengthMetric::Negative => -v,
        StrengthMetric::Absolute => v.abs(),
    };

    let mut diag = T::zero();
    let mut row_sum = T::zero();
    let mut max_coupling = T::zero();
    let mut has_off_diag = false;
    for (j, v) in a.row_entries(i) {
        row_sum += v;
        if j == i {
            diag += v;
        } else if !v.is_zero() {
            has_off_diag = true;
            max_coupling = max_coupling.max(measure(v));
        }
    }

    if a.row_nnz(i) <= 1 || !has_off_diag || max_coupling <= T::zero() {
        return RowStrength {
            strong: Vec::new(),
            isolated: true,
        };
    }

    let scaled_sum = row_sum.abs() / diag.abs().max(T::real(SMALL_REAL));
    if max_row_sum < T::one() && scaled_sum > max_row_sum {
        return RowStrength {
            strong: Vec::new(),
            isolated: false,
        };
    }

    let cut = theta * max_coupling;
    let mut strong: Vec<usize> = a
        .row_entries(i)
        .filter(|&(j, v)| j != i && !v.is_zero() && measure(v) >= cut)
        .map(|(j, _)| j)
        .collect();
    strong.sort_unstable();
    strong.dedup();

    RowStrength {
        strong,
        isolated: false,
    }
}

/// Build the strong-coupling graph of `a`.
///
/// Edges pointing at isolated vertices are removed, so S never references a
/// vertex flagged isolated. S contains no self-loops.
pub fn strong_connections<T: RealField>(a: &CsrMatrix<T>, param: &AmgParam) -> StrongCouplings {
    let theta = T::real(param.strong_threshold);
    let max_row_sum = T::real(param.max_row_sum);
    let metric = param.strength_metric;
    let n = a.num_rows;

    let rows: Vec<RowStrength> = if n >= PARALLEL_ROW_THRESHOLD {
        parallel_map_indexed(n, |i| row_strength(a, i, theta, metric, max_row_sum))
    } else {
        (0..n)
            .map(|i| row_strength(a, i, theta, metric, max_row_sum))
            .collect()
    };

    let isolated: Vec<bool> = rows.iter().map(|r| r.isolated).collect();
    let strong_rows: Vec<Vec<usize>> = rows
        .into_iter()
        .map(|r| r.strong.into_iter().filter(|&j| !isolated[j]).collect())
        .collect();

    StrongCouplings {
        s: CsrPattern::from_rows(a.num_cols, strong_rows),
        isolated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(n: usize, triplets: Vec<(usize, usize, f64)>) -> CsrMatrix<f64> {
        CsrMatrix::from_triplets(n, n, triplets)
    }

    #[test]
    fn test_threshold_selects_large_couplings() {
        // row 0: -1 and -0.1 couplings, theta 0.25 keeps only the first
        let a = matrix(
            3,
            vec![
                (0, 0, 2.0),
                (0, 1, -1.0),
                (0, 2, -0.1),
                (1, 0, -1.0),
                (1, 1, 2.0),
                (1, 2, -1.0),
                (2, 0, -0.1),
                (2, 1, -1.0),
                (2, 2, 2.0),
            ],
        );
        let param = AmgParam {
            max_row_sum: 1.0,
            ..Default::default()
        };
        let sc = strong_connections(&a, &param);
        assert_eq!(sc.s.row(0), &[1]);
        assert_eq!(sc.s.row(1), &[0, 2]);
        assert_eq!(sc.s.row(2), &[1]);
        assert!(sc.isolated.iter().all(|&f| !f));
    }

    #[test]
    fn test_no_self_loops_and_isolated_identity() {
        let a = CsrMatrix::<f64>::identity(5);
        let sc = strong_connections(&a, &AmgParam::default());
        assert_eq!(sc.nnz(), 0);
        assert!(sc.isolated.iter().all(|&f| f));
    }

    #[test]
    fn test_positive_couplings_under_metrics() {
        let a = matrix(
            2,
            vec![(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 2.0)],
        );
        let negative = strong_connections(
            &a,
            &AmgParam {
                max_row_sum: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(negative.nnz(), 0);
        assert!(negative.isolated[0]);

        let absolute = strong_connections(
            &a,
            &AmgParam {
                strength_metric: StrengthMetric::Absolute,
                max_row_sum: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(absolute.s.row(0), &[1]);
        assert_eq!(absolute.s.row(1), &[0]);
    }

    #[test]
    fn test_max_row_sum_weakens_dominant_rows() {
        // row 0 has |sum| / |a_00| = 0.95
        let a = matrix(
            2,
            vec![(0, 0, 20.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 1.0)],
        );
        let sc = strong_connections(&a, &AmgParam::default());
        assert!(sc.s.row(0).is_empty());
        assert!(!sc.isolated[0]);
        assert_eq!(sc.s.row(1), &[0]);
    }

    #[test]
    fn test_edges_to_zero_rows_are_dropped() {
        // row 1 is empty; row 0 still couples to it
        let a = matrix(3, vec![(0, 0, 2.0), (0, 1, -1.0), (0, 2, -1.0), (2, 0, -1.0), (2, 2, 2.0)]);
        let sc = strong_connections(&a, &AmgParam::default());
        assert!(sc.isolated[1]);
        assert_eq!(sc.s.row(0), &[2]);
        assert!(sc.s.row(1).is_empty());
    }
}
