//! Multiplicative Schwarz smoother
//!
//! Blocks are grown by breadth-first search over the matrix graph from seed
//! vertices: every vertex not yet covered seeds a new block that takes at
//! most `maxlvl` layers of neighbours and at most `mmsize` vertices. Blocks
//! may overlap. Each block is solved exactly with a dense LU factorization,
//! and the updates are applied one block after another.

use ndarray::Array2;

use crate::amg::param::SchwarzType;
use crate::direct::{LuFactorization, lu_factorize};
use crate::error::Result;
use crate::sparse::CsrMatrix;
use crate::traits::RealField;

/// One block with its factorized local matrix
#[derive(Debug, Clone)]
struct Block<T: RealField> {
    /// Global indices of the block, ascending
    global_indices: Vec<usize>,
    lu: LuFactorization<T>,
}

impl<T: RealField> Block<T> {
    /// x_block += A_bb^{-1} (b - A x)_block
    fn correct(&self, matrix: &CsrMatrix<T>, b: &[T], x: &mut [T], local: &mut Vec<T>) {
        local.clear();
        for &i in &self.global_indices {
            let mut r = b[i];
            for (j, v) in matrix.row_entries(i) {
                r -= v * x[j];
            }
            local.push(r);
        }
        self.lu.solve_in_place(local);
        for (&i, &e) in self.global_indices.iter().zip(local.iter()) {
            x[i] += e;
        }
    }
}

/// Multiplicative Schwarz data of one level
#[derive(Debug, Clone)]
pub struct SchwarzData<T: RealField> {
    blocks: Vec<Block<T>>,
    kind: SchwarzType,
    n: usize,
}

/// Build adjacency list from sparse matrix
fn build_adjacency<T: RealField>(matrix: &CsrMatrix<T>) -> Vec<Vec<usize>> {
    (0..matrix.num_rows)
        .map(|i| {
            matrix
                .row_entries(i)
                .filter(|&(j, v)| j != i && !v.is_zero())
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Breadth-first block around `seed`
fn grow_block(
    seed: usize,
    adjacency: &[Vec<usize>],
    maxlvl: usize,
    mmsize: usize,
    marker: &mut [usize],
) -> Vec<usize> {
    let mut block = vec![seed];
    marker[seed] = seed;
    let mut frontier = vec![seed];

    'layers: for _ in 0..maxlvl {
        let mut next = Vec::new();
        for &v in &frontier {
            for &nb in &adjacency[v] {
                if marker[nb] == seed {
                    continue;
                }
                if block.len() >= mmsize {
                    break 'layers;
                }
                marker[nb] = seed;
                block.push(nb);
                next.push(nb);
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    block.sort_unstable();
    block
}

/// Dense copy of `matrix` restricted to `indices`
fn local_matrix<T: RealField>(
    matrix: &CsrMatrix<T>,
    indices: &[usize],
    global_to_local: &mut [usize],
) -> Array2<T> {
    let m = indices.len();
    for (local, &global) in indices.iter().enumerate() {
        global_to_local[global] = local;
    }

    let mut dense = Array2::from_elem((m, m), T::zero());
    for (local_row, &global_row) in indices.iter().enumerate() {
        for (global_col, v) in matrix.row_entries(global_row) {
            let local_col = global_to_local[global_col];
            if local_col != usize::MAX {
                dense[[local_row, local_col]] += v;
            }
        }
    }

    for &global in indices {
        global_to_local[global] = usize::MAX;
    }
    dense
}

impl<T: RealField> SchwarzData<T> {
    /// Build and factorize the blocks of `matrix`.
    pub fn setup(
        matrix: &CsrMatrix<T>,
        maxlvl: usize,
        mmsize: usize,
        kind: SchwarzType,
    ) -> Result<Self> {
        matrix.validate_square()?;
        let n = matrix.num_rows;
        let adjacency = build_adjacency(matrix);
        let mut covered = vec![false; n];
        let mut marker = vec![usize::MAX; n];
        let mut global_to_local = vec![usize::MAX; n];
        let mut blocks = Vec::new();

        for seed in 0..n {
            if covered[seed] {
                continue;
            }
            let global_indices =
                grow_block(seed, &adjacency, maxlvl, mmsize.max(1), &mut marker);
            for &v in &global_indices {
                covered[v] = true;
            }
            let dense = local_matrix(matrix, &global_indices, &mut global_to_local);
            let lu = lu_factorize(&dense)?;
            blocks.push(Block { global_indices, lu });
        }

        Ok(Self { blocks, kind, n })
    }

    /// Number of blocks
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Size of the largest block
    pub fn largest_block(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.global_indices.len())
            .max()
            .unwrap_or(0)
    }

    /// One multiplicative sweep over the blocks in the configured direction.
    pub fn smooth(&self, matrix: &CsrMatrix<T>, b: &[T], x: &mut [T]) {
        debug_assert_eq!(x.len(), self.n);
        let mut local = Vec::new();
        match self.kind {
            SchwarzType::Forward => {
                for block in &self.blocks {
                    block.correct(matrix, b, x, &mut local);
                }
            }
            SchwarzType::Backward => {
                for block in self.blocks.iter().rev() {
                    block.correct(matrix, b, x, &mut local);
                }
            }
            SchwarzType::Symmetric => {
                for block in &self.blocks {
                    block.correct(matrix, b, x, &mut local);
                }
                for block in self.blocks.iter().rev() {
                    block.correct(matrix, b, x, &mut local);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn residual_norm(a: &CsrMatrix<f64>, b: &[f64], x: &[f64]) -> f64 {
        let mut r = vec![0.0; b.len()];
        a.residual_into(b, x, &mut r);
        r.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// A-norm of x
    fn energy(a: &CsrMatrix<f64>, x: &[f64]) -> f64 {
        let mut ax = vec![0.0; x.len()];
        a.matvec_axpby(1.0, x, 0.0, &mut ax);
        x.iter().zip(&ax).map(|(u, v)| u * v).sum::<f64>().sqrt()
    }

    #[test]
    fn test_blocks_cover_all_vertices() {
        let a = laplacian_1d(20);
        let schwarz = SchwarzData::setup(&a, 2, 5, SchwarzType::Forward).unwrap();
        let mut seen = vec![false; 20];
        for block in &schwarz.blocks {
            assert!(block.global_indices.len() <= 5);
            for &i in &block.global_indices {
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_single_block_is_exact() {
        let n = 8;
        let a = laplacian_1d(n);
        let schwarz = SchwarzData::setup(&a, n, n, SchwarzType::Forward).unwrap();
        assert_eq!(schwarz.num_blocks(), 1);

        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        schwarz.smooth(&a, &b, &mut x);
        assert_relative_eq!(residual_norm(&a, &b, &x), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric_sweep_reduces_energy_error() {
        // b = 0, so the error is x itself and must shrink in the A-norm
        let n = 30;
        let a = laplacian_1d(n);
        let schwarz = SchwarzData::setup(&a, 1, 3, SchwarzType::Symmetric).unwrap();
        assert!(schwarz.num_blocks() > 1);
        let b = vec![0.0; n];
        let mut x: Vec<f64> = (0..n)
            .map(|i| (i as f64 * 0.7).sin() + if i % 3 == 0 { 1.0 } else { -0.5 })
            .collect();
        let before = energy(&a, &x);
        schwarz.smooth(&a, &b, &mut x);
        let after = energy(&a, &x);
        assert!(after < before, "energy error {before} -> {after}");
    }
}
