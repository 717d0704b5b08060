//! Ruge-Stüben C/F splitting
//!
//! The first pass selects C-points greedily by the influence measure
//! `lambda_i = |S^T_i|`: the vertex with the largest measure becomes C, the
//! vertices it influences become F and the measures around them are updated.
//! Ties go to the smallest index. A second sweep promotes strong F-neighbours
//! that share no C-point with the F-point depending on them.
//!
//! Aggressive coarsening reruns the first pass on a distance-two graph
//! between the temporary C-points and finishes with a sweep that keeps every
//! F-point within distance two of a C-point.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use super::param::CoarseningType;
use super::strength::StrongCouplings;
use crate::error::{AmgError, Result};
use crate::sparse::CsrPattern;

/// Point classification in coarsening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointType {
    /// Fine point (F-point)
    Fine,
    /// Coarse point (C-point)
    Coarse,
    /// No usable couplings; never interpolated
    Isolated,
}

/// Result of splitting one level
#[derive(Debug, Clone)]
pub struct Splitting {
    /// Marker per unknown
    pub vertices: Vec<PointType>,
    /// Number of C-points
    pub num_coarse: usize,
}

impl Splitting {
    fn from_vertices(vertices: Vec<PointType>) -> Self {
        let num_coarse = vertices
            .iter()
            .filter(|&&v| v == PointType::Coarse)
            .count();
        Self {
            vertices,
            num_coarse,
        }
    }

    /// Coarse index of every C-point, in ascending fine order
    pub fn coarse_map(&self) -> Vec<Option<usize>> {
        let mut next = 0;
        self.vertices
            .iter()
            .map(|&v| {
                (v == PointType::Coarse).then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect()
    }
}

/// Measures of the undecided vertices, ordered by (lambda, smallest index).
struct MeasureQueue {
    lambda: Vec<usize>,
    queue: BTreeSet<(usize, Reverse<usize>)>,
}

impl MeasureQueue {
    fn new(lambda: Vec<usize>) -> Self {
        Self {
            lambda,
            queue: BTreeSet::new(),
        }
    }

    fn enqueue(&mut self, i: usize) {
        if self.lambda[i] > 0 {
            self.queue.insert((self.lambda[i], Reverse(i)));
        }
    }

    fn remove(&mut self, i: usize) -> bool {
        self.queue.remove(&(self.lambda[i], Reverse(i)))
    }

    fn bump(&mut self, i: usize) {
        let queued = self.remove(i);
        self.lambda[i] += 1;
        if queued {
            self.enqueue(i);
        }
    }

    fn decrement(&mut self, i: usize) -> usize {
        self.remove(i);
        self.lambda[i] = self.lambda[i].saturating_sub(1);
        self.enqueue(i);
        self.lambda[i]
    }

    fn pop_max(&mut self) -> Option<usize> {
        self.queue.pop_last().map(|(_, Reverse(i))| i)
    }
}

/// Classical first pass on the graph `s` (with transpose `st`).
///
/// Vertices flagged in `skip` come out as [`PointType::Isolated`] and take no
/// part in the selection.
fn first_pass(s: &CsrPattern, st: &CsrPattern, skip: &[bool]) -> Vec<PointType> {
    let n = s.num_rows;
    let mut state: Vec<Option<PointType>> = skip
        .iter()
        .map(|&f| f.then_some(PointType::Isolated))
        .collect();
    let mut measures = MeasureQueue::new(
        (0..n)
            .map(|i| if skip[i] { 0 } else { st.row(i).len() })
            .collect(),
    );

    // nobody depends on these: F right away, their dependencies gain weight
    for i in 0..n {
        if state[i].is_none() && measures.lambda[i] == 0 {
            state[i] = Some(PointType::Fine);
            for &k in s.row(i) {
                if state[k].is_none() {
                    measures.bump(k);
                }
            }
        }
    }
    for i in 0..n {
        if state[i].is_none() {
            measures.enqueue(i);
        }
    }

    while let Some(i) = measures.pop_max() {
        state[i] = Some(PointType::Coarse);

        for &j in st.row(i) {
            if state[j].is_none() {
                state[j] = Some(PointType::Fine);
                measures.remove(j);
                for &k in s.row(j) {
                    if state[k].is_none() {
                        measures.bump(k);
                    }
                }
            }
        }

        for &j in s.row(i) {
            if state[j].is_none() && measures.decrement(j) == 0 {
                state[j] = Some(PointType::Fine);
                for &k in s.row(j) {
                    if state[k].is_none() {
                        measures.bump(k);
                    }
                }
            }
        }
    }

    state
        .into_iter()
        .map(|m| m.unwrap_or(PointType::Fine))
        .collect()
}

/// Promote strong F-neighbours that share no C-point with the F-point that
/// depends on them. Sweeps `i` ascending, then `S_i` ascending. Returns the
/// number of promotions.
fn repair_pass(s: &CsrPattern, vertices: &mut [PointType]) -> usize {
    let n = s.num_rows;
    let mut marker = vec![usize::MAX; n];
    let mut promoted = 0;

    for i in 0..n {
        if vertices[i] != PointType::Fine {
            continue;
        }
        for &k in s.row(i) {
            if vertices[k] == PointType::Coarse {
                marker[k] = i;
            }
        }
        for &j in s.row(i) {
            if vertices[j] != PointType::Fine {
                continue;
            }
            let shares_coarse = s.row(j).iter().any(|&k| marker[k] == i);
            if !shares_coarse {
                vertices[j] = PointType::Coarse;
                marker[j] = i;
                promoted += 1;
            }
        }
    }
    promoted
}

/// Strong graph between the temporary C-points of `vertices`.
///
/// `ci -> cj` when `cj` influences `ci` directly or through an F-point.
/// With `path == 1` one length-two path is enough, with `path == 2` two
/// distinct ones are needed. Returns the graph and the fine index of every
/// temporary C-point.
fn distance_two_graph(
    s: &CsrPattern,
    vertices: &[PointType],
    path: usize,
) -> (CsrPattern, Vec<usize>) {
    let cp_index: Vec<usize> = (0..vertices.len())
        .filter(|&i| vertices[i] == PointType::Coarse)
        .collect();
    let mut cp_rindex = vec![usize::MAX; vertices.len()];
    for (ci, &i) in cp_index.iter().enumerate() {
        cp_rindex[i] = ci;
    }

    let nc = cp_index.len();
    let mut linked = vec![usize::MAX; nc];
    let mut seen = vec![usize::MAX; nc];
    let mut rows = Vec::with_capacity(nc);

    for (ci, &i) in cp_index.iter().enumerate() {
        let mut row = Vec::new();
        for &j in s.row(i) {
            match vertices[j] {
                PointType::Coarse => {
                    let cj = cp_rindex[j];
                    if linked[cj] != ci {
                        linked[cj] = ci;
                        row.push(cj);
                    }
                }
                PointType::Fine => {
                    for &k in s.row(j) {
                        if k == i || vertices[k] != PointType::Coarse {
                            continue;
                        }
                        let ck = cp_rindex[k];
                        if linked[ck] == ci {
                            continue;
                        }
                        if path < 2 || seen[ck] == ci {
                            linked[ck] = ci;
                            row.push(ck);
                        } else {
                            seen[ck] = ci;
                        }
                    }
                }
                PointType::Isolated => {}
            }
        }
        row.sort_unstable();
        rows.push(row);
    }

    (CsrPattern::from_rows(nc, rows), cp_index)
}

/// Promote every F-point without a C-point within distance two in `s`.
fn distance_two_sweep(s: &CsrPattern, vertices: &mut [PointType]) {
    for i in 0..s.num_rows {
        if vertices[i] != PointType::Fine {
            continue;
        }
        let reached = s.row(i).iter().any(|&k| match vertices[k] {
            PointType::Coarse => true,
            PointType::Fine => s.row(k).iter().any(|&m| vertices[m] == PointType::Coarse),
            PointType::Isolated => false,
        });
        if !reached {
            vertices[i] = PointType::Coarse;
        }
    }
}

/// Classical two-pass splitting
pub fn classical_splitting(sc: &StrongCouplings) -> Splitting {
    let st = sc.s.transpose();
    let mut vertices = first_pass(&sc.s, &st, &sc.isolated);
    repair_pass(&sc.s, &mut vertices);
    Splitting::from_vertices(vertices)
}

/// Aggressive splitting along distance-two strong paths
pub fn aggressive_splitting(sc: &StrongCouplings, path: usize) -> Splitting {
    let st = sc.s.transpose();
    let mut vertices = first_pass(&sc.s, &st, &sc.isolated);

    let (sh, cp_index) = distance_two_graph(&sc.s, &vertices, path);
    let sht = sh.transpose();
    let coarse = first_pass(&sh, &sht, &vec![false; cp_index.len()]);
    for (ci, &i) in cp_index.iter().enumerate() {
        vertices[i] = coarse[ci];
    }

    distance_two_sweep(&sc.s, &mut vertices);
    Splitting::from_vertices(vertices)
}

/// Split the unknowns of one level into C, F and isolated points.
///
/// Fails with [`AmgError::CoarseningFailed`] when the strength graph is
/// empty or no C-point comes out.
pub fn split(
    sc: &StrongCouplings,
    coarsening: CoarseningType,
    aggressive_path: usize,
    level: usize,
) -> Result<Splitting> {
    if sc.nnz() == 0 {
        return Err(AmgError::CoarseningFailed {
            level,
            reason: "strength graph is empty".to_string(),
        });
    }

    let splitting = match coarsening {
        CoarseningType::Classical => classical_splitting(sc),
        CoarseningType::Aggressive => aggressive_splitting(sc, aggressive_path),
    };

    if splitting.num_coarse == 0 {
        return Err(AmgError::CoarseningFailed {
            level,
            reason: "no coarse points selected".to_string(),
        });
    }

    Ok(splitting)
}
