//! Compressed Sparse Row (CSR) matrix format
//!
//! CSR format stores:
//! - `values`: Non-zero entries in row-major order
//! - `col_indices`: Column index for each value
//! - `row_ptrs`: Index into values/col_indices where each row starts
//!
//! Column indices inside a row are not required to be sorted. Kernels that
//! need ascending columns call [`CsrMatrix::sort_rows`] first.

use crate::error::{AmgError, Result};
use crate::ordering::quicksort_index;
use crate::parallel::{PARALLEL_ROW_THRESHOLD, parallel_map_indexed_with};
use crate::traits::{LinearOperator, RealField};
use ndarray::{Array1, Array2};
use std::ops::Range;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Compressed Sparse Row (CSR) matrix format
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T: RealField> {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Non-zero values in row-major order
    pub values: Vec<T>,
    /// Column indices for each value
    pub col_indices: Vec<usize>,
    /// Row pointers: row_ptrs[i] is the start index in values/col_indices for row i
    /// row_ptrs[num_rows] = nnz (total number of non-zeros)
    pub row_ptrs: Vec<usize>,
}

impl<T: RealField> CsrMatrix<T> {
    /// Create a new empty CSR matrix
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Create a CSR matrix from raw components
    ///
    /// # Panics
    ///
    /// Panics if the input arrays are inconsistent:
    /// - `row_ptrs` must have length `num_rows + 1`
    /// - `col_indices` and `values` must have the same length
    /// - `row_ptrs[num_rows]` must equal `values.len()`
    pub fn from_raw_parts(
        num_rows: usize,
        num_cols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(
            row_ptrs.len(),
            num_rows + 1,
            "row_ptrs must have num_rows + 1 elements"
        );
        assert_eq!(
            col_indices.len(),
            values.len(),
            "col_indices and values must have the same length"
        );
        assert_eq!(
            row_ptrs[num_rows],
            values.len(),
            "row_ptrs[num_rows] must equal nnz"
        );

        Self {
            num_rows,
            num_cols,
            row_ptrs,
            col_indices,
            values,
        }
    }

    /// Create a CSR matrix from a dense matrix
    ///
    /// Only stores entries with magnitude > threshold
    pub fn from_dense(dense: &Array2<T>, threshold: T) -> Self {
        let num_rows = dense.nrows();
        let num_cols = dense.ncols();

        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = vec![0usize; num_rows + 1];

        for i in 0..num_rows {
            for j in 0..num_cols {
                let val = dense[[i, j]];
                if val.abs() > threshold {
                    values.push(val);
                    col_indices.push(j);
                }
            }
            row_ptrs[i + 1] = values.len();
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Create a CSR matrix from COO (Coordinate) format triplets
    ///
    /// Triplets are (row, col, value). Duplicate entries are summed and every
    /// row comes out with ascending columns.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        if triplets.is_empty() {
            return Self::new(num_rows, num_cols);
        }

        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut values = Vec::with_capacity(triplets.len());
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut row_counts = vec![0usize; num_rows + 1];

        let mut prev = (usize::MAX, usize::MAX);
        for (row, col, val) in triplets {
            if (row, col) == prev {
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
            } else {
                values.push(val);
                col_indices.push(col);
                row_counts[row + 1] += 1;
                prev = (row, col);
            }
        }

        for i in 0..num_rows {
            row_counts[i + 1] += row_counts[i];
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs: row_counts,
        }
    }

    /// Create identity matrix in CSR format
    pub fn identity(n: usize) -> Self {
        Self {
            num_rows: n,
            num_cols: n,
            values: vec![T::one(); n],
            col_indices: (0..n).collect(),
            row_ptrs: (0..=n).collect(),
        }
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Check the CSR invariants and that the matrix is square.
    pub fn validate_square(&self) -> Result<()> {
        if self.num_rows != self.num_cols {
            return Err(AmgError::NonSquareMatrix {
                rows: self.num_rows,
                cols: self.num_cols,
            });
        }
        self.validate()
    }

    /// Check the CSR invariants: monotone row pointers starting at zero,
    /// matching array lengths and in-range column indices.
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: String| Err(AmgError::MalformedCsr { reason });

        if self.row_ptrs.len() != self.num_rows + 1 {
            return malformed(format!(
                "row_ptrs has {} entries, expected {}",
                self.row_ptrs.len(),
                self.num_rows + 1
            ));
        }
        if self.row_ptrs[0] != 0 {
            return malformed("row_ptrs[0] must be 0".into());
        }
        if self.col_indices.len() != self.values.len() {
            return malformed("col_indices and values differ in length".into());
        }
        if self.row_ptrs[self.num_rows] != self.values.len() {
            return malformed("row_ptrs[num_rows] must equal nnz".into());
        }
        if let Some(i) = self.row_ptrs.windows(2).position(|w| w[0] > w[1]) {
            return malformed(format!("row pointers decrease at row {i}"));
        }
        if let Some(&j) = self.col_indices.iter().find(|&&j| j >= self.num_cols) {
            return malformed(format!(
                "column index {j} out of range for {} columns",
                self.num_cols
            ));
        }
        Ok(())
    }

    /// Get the range of indices in values/col_indices for a given row
    #[inline]
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// Number of stored entries in a row
    #[inline]
    pub fn row_nnz(&self, row: usize) -> usize {
        self.row_ptrs[row + 1] - self.row_ptrs[row]
    }

    /// Get the (col, value) pairs for a row
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Position of the diagonal entry of `row` in values/col_indices
    pub fn diag_index(&self, row: usize) -> Option<usize> {
        self.row_range(row).find(|&idx| self.col_indices[idx] == row)
    }

    /// Get element at (i, j), returns 0 if not stored
    pub fn get(&self, i: usize, j: usize) -> T {
        self.row_entries(i)
            .find(|&(col, _)| col == j)
            .map_or(T::zero(), |(_, val)| val)
    }

    /// Extract diagonal elements
    pub fn diagonal(&self) -> Array1<T> {
        let n = self.num_rows.min(self.num_cols);
        Array1::from_iter((0..n).map(|i| self.get(i, i)))
    }

    /// Convert to dense matrix (for debugging/small matrices)
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.num_rows, self.num_cols), T::zero());

        for i in 0..self.num_rows {
            for (j, val) in self.row_entries(i) {
                dense[[i, j]] += val;
            }
        }

        dense
    }

    /// Matrix-vector product: y = A * x
    ///
    /// Uses parallel processing when the `rayon` feature is enabled and the
    /// matrix is large enough to benefit from parallelization.
    pub fn matvec(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");

        #[cfg(feature = "rayon")]
        {
            if self.num_rows >= PARALLEL_ROW_THRESHOLD {
                let results: Vec<T> = (0..self.num_rows)
                    .into_par_iter()
                    .map(|i| self.row_entries(i).fold(T::zero(), |s, (j, v)| s + v * x[j]))
                    .collect();
                return Array1::from_vec(results);
            }
        }

        Array1::from_iter(
            (0..self.num_rows)
                .map(|i| self.row_entries(i).fold(T::zero(), |s, (j, v)| s + v * x[j])),
        )
    }

    /// Transpose matrix-vector product: y = A^T * x
    pub fn matvec_transpose(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_rows, "Input vector size mismatch");

        let mut y = Array1::from_elem(self.num_cols, T::zero());
        for i in 0..self.num_rows {
            for (j, val) in self.row_entries(i) {
                y[j] += val * x[i];
            }
        }
        y
    }

    /// Scaled product with accumulation: y = alpha * A * x + beta * y
    ///
    /// Rows are processed in storage order; a zero `beta` overwrites `y`
    /// without reading it.
    pub fn matvec_axpby(&self, alpha: T, x: &[T], beta: T, y: &mut [T]) {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");
        assert_eq!(y.len(), self.num_rows, "Output vector size mismatch");

        let row_update = |i: usize, yi: &mut T| {
            let mut sum = T::zero();
            for idx in self.row_range(i) {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *yi = if beta.is_zero() {
                alpha * sum
            } else {
                alpha * sum + beta * *yi
            };
        };

        #[cfg(feature = "rayon")]
        {
            if self.num_rows >= PARALLEL_ROW_THRESHOLD {
                y.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, yi)| row_update(i, yi));
                return;
            }
        }

        for (i, yi) in y.iter_mut().enumerate() {
            row_update(i, yi);
        }
    }

    /// Residual as a new vector: b - A * x
    pub fn residual(&self, b: &Array1<T>, x: &Array1<T>) -> Array1<T> {
        b - &self.matvec(x)
    }

    /// Residual: r = b - A * x
    pub fn residual_into(&self, b: &[T], x: &[T], r: &mut [T]) {
        r.copy_from_slice(b);
        self.matvec_axpby(-T::one(), x, T::one(), r);
    }

    /// Transpose in CSR form.
    ///
    /// Counts column populations, prefix-sums them into row pointers and
    /// scatters entries; within each transposed row the entries appear in
    /// ascending original row order.
    pub fn transpose(&self) -> CsrMatrix<T> {
        let nnz = self.nnz();
        let mut row_ptrs = vec![0usize; self.num_cols + 1];
        for &j in &self.col_indices {
            row_ptrs[j + 1] += 1;
        }
        for j in 0..self.num_cols {
            row_ptrs[j + 1] += row_ptrs[j];
        }

        let mut next = row_ptrs.clone();
        let mut col_indices = vec![0usize; nnz];
        let mut values = vec![T::zero(); nnz];
        for i in 0..self.num_rows {
            for (j, val) in self.row_entries(i) {
                let slot = next[j];
                col_indices[slot] = i;
                values[slot] = val;
                next[j] += 1;
            }
        }

        CsrMatrix {
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Move the diagonal entry of each row to the front of the row.
    ///
    /// Off-diagonal entries keep their relative order; rows without a stored
    /// diagonal are left untouched.
    pub fn diag_pref(&mut self) {
        for i in 0..self.num_rows.min(self.num_cols) {
            let start = self.row_ptrs[i];
            if let Some(pos) = self.diag_index(i) {
                self.col_indices[start..=pos].rotate_right(1);
                self.values[start..=pos].rotate_right(1);
            }
        }
    }

    /// Sort column indices ascending in every row, permuting values alongside.
    ///
    /// Entries stored more than once in a row are summed into one entry, so
    /// afterwards every row is strictly ascending and `row_ptrs` may shrink.
    pub fn sort_rows(&mut self) {
        let mut perm: Vec<usize> = Vec::new();
        let mut write = 0usize;
        let mut row_start = 0usize;

        for i in 0..self.num_rows {
            let row_end = self.row_ptrs[i + 1];
            let row_cols = &self.col_indices[row_start..row_end];

            perm.clear();
            perm.extend(0..row_cols.len());
            if !row_cols.windows(2).all(|w| w[0] <= w[1]) {
                quicksort_index(row_cols, &mut perm);
            }

            let mut cols: Vec<usize> = Vec::with_capacity(perm.len());
            let mut vals: Vec<T> = Vec::with_capacity(perm.len());
            for &k in &perm {
                let (col, val) = (row_cols[k], self.values[row_start + k]);
                match cols.last() {
                    Some(&last) if last == col => {
                        if let Some(acc) = vals.last_mut() {
                            *acc += val;
                        }
                    }
                    _ => {
                        cols.push(col);
                        vals.push(val);
                    }
                }
            }

            // write <= row_start, so the compacted row never overwrites unread entries
            self.col_indices[write..write + cols.len()].copy_from_slice(&cols);
            self.values[write..write + vals.len()].copy_from_slice(&vals);
            write += cols.len();
            row_start = row_end;
            self.row_ptrs[i + 1] = write;
        }

        self.col_indices.truncate(write);
        self.values.truncate(write);
    }

    /// Returns `true` if every row has strictly ascending column indices.
    pub fn has_sorted_rows(&self) -> bool {
        (0..self.num_rows).all(|i| {
            self.col_indices[self.row_range(i)]
                .windows(2)
                .all(|w| w[0] < w[1])
        })
    }

    /// Sparse product C = A * B.
    ///
    /// Row-by-row accumulation with a dense column marker (one marker buffer
    /// per worker). Columns of each output row appear in order of first
    /// contribution, which is not necessarily ascending.
    pub fn matmul(&self, other: &CsrMatrix<T>) -> CsrMatrix<T> {
        assert_eq!(
            self.num_cols, other.num_rows,
            "Matrix dimension mismatch: A.cols ({}) != B.rows ({})",
            self.num_cols, other.num_rows
        );

        let m = self.num_rows;
        let n = other.num_cols;

        if m == 0 || n == 0 || self.nnz() == 0 || other.nnz() == 0 {
            return CsrMatrix::new(m, n);
        }

        let row_product = |marker: &mut Vec<usize>, i: usize| {
            let mut cols: Vec<usize> = Vec::new();
            let mut vals: Vec<T> = Vec::new();
            for (k, a_ik) in self.row_entries(i) {
                for (j, b_kj) in other.row_entries(k) {
                    let slot = marker[j];
                    if slot == usize::MAX {
                        marker[j] = cols.len();
                        cols.push(j);
                        vals.push(a_ik * b_kj);
                    } else {
                        vals[slot] += a_ik * b_kj;
                    }
                }
            }
            for &j in &cols {
                marker[j] = usize::MAX;
            }
            (cols, vals)
        };

        let rows: Vec<(Vec<usize>, Vec<T>)> = if m >= PARALLEL_ROW_THRESHOLD {
            parallel_map_indexed_with(m, || vec![usize::MAX; n], row_product)
        } else {
            let mut marker = vec![usize::MAX; n];
            (0..m).map(|i| row_product(&mut marker, i)).collect()
        };

        assemble_rows(m, n, rows)
    }
}

/// Concatenate per-row column/value lists into a CSR matrix.
pub(crate) fn assemble_rows<T: RealField>(
    num_rows: usize,
    num_cols: usize,
    rows: Vec<(Vec<usize>, Vec<T>)>,
) -> CsrMatrix<T> {
    let nnz: usize = rows.iter().map(|(c, _)| c.len()).sum();
    let mut row_ptrs = Vec::with_capacity(num_rows + 1);
    let mut col_indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    row_ptrs.push(0);
    for (cols, vals) in rows {
        col_indices.extend(cols);
        values.extend(vals);
        row_ptrs.push(col_indices.len());
    }
    CsrMatrix {
        num_rows,
        num_cols,
        values,
        col_indices,
        row_ptrs,
    }
}

impl<T: RealField> LinearOperator<T> for CsrMatrix<T> {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_cols(&self) -> usize {
        self.num_cols
    }

    fn apply(&self, x: &Array1<T>) -> Array1<T> {
        self.matvec(x)
    }

    fn apply_transpose(&self, x: &Array1<T>) -> Array1<T> {
        self.matvec_transpose(x)
    }
}

/// Builder for constructing CSR matrices row by row
pub struct CsrBuilder<T: RealField> {
    num_rows: usize,
    num_cols: usize,
    values: Vec<T>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
}

impl<T: RealField> CsrBuilder<T> {
    /// Create a new CSR builder with estimated non-zeros
    pub fn with_capacity(num_rows: usize, num_cols: usize, nnz_estimate: usize) -> Self {
        let mut row_ptrs = Vec::with_capacity(num_rows + 1);
        row_ptrs.push(0);
        Self {
            num_rows,
            num_cols,
            values: Vec::with_capacity(nnz_estimate),
            col_indices: Vec::with_capacity(nnz_estimate),
            row_ptrs,
        }
    }

    /// Add entries for the next row; exact zeros are skipped
    pub fn add_row_entries(&mut self, entries: impl Iterator<Item = (usize, T)>) {
        for (col, val) in entries {
            if !val.is_zero() {
                self.values.push(val);
                self.col_indices.push(col);
            }
        }
        self.row_ptrs.push(self.values.len());
    }

    /// Finish building and return the CSR matrix
    pub fn finish(mut self) -> CsrMatrix<T> {
        while self.row_ptrs.len() < self.num_rows + 1 {
            self.row_ptrs.push(self.values.len());
        }

        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            values: self.values,
            col_indices: self.col_indices,
            row_ptrs: self.row_ptrs,
        }
    }
}
