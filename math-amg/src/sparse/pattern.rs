//! Integer-only CSR pattern
//!
//! Used for the strong-coupling graph: an entry `j` in row `i` means that
//! unknown `j` strongly influences unknown `i`.

use std::ops::Range;

/// Sparse pattern in CSR layout without values
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsrPattern {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Column indices
    pub col_indices: Vec<usize>,
    /// Row pointers, `row_ptrs[num_rows] == nnz`
    pub row_ptrs: Vec<usize>,
}

impl CsrPattern {
    /// Build a pattern from per-row column lists
    pub fn from_rows(num_cols: usize, rows: Vec<Vec<usize>>) -> Self {
        let num_rows = rows.len();
        let mut row_ptrs = Vec::with_capacity(num_rows + 1);
        let mut col_indices = Vec::with_capacity(rows.iter().map(Vec::len).sum());
        row_ptrs.push(0);
        for row in rows {
            col_indices.extend(row);
            row_ptrs.push(col_indices.len());
        }
        Self {
            num_rows,
            num_cols,
            col_indices,
            row_ptrs,
        }
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.col_indices.len()
    }

    /// Index range of a row
    #[inline]
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// Columns of a row
    #[inline]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.col_indices[self.row_range(row)]
    }

    /// Transposed pattern; rows come out in ascending order.
    pub fn transpose(&self) -> CsrPattern {
        let mut row_ptrs = vec![0usize; self.num_cols + 1];
        for &j in &self.col_indices {
            row_ptrs[j + 1] += 1;
        }
        for j in 0..self.num_cols {
            row_ptrs[j + 1] += row_ptrs[j];
        }
        let mut next = row_ptrs.clone();
        let mut col_indices = vec![0usize; self.nnz()];
        for i in 0..self.num_rows {
            for &j in self.row(i) {
                col_indices[next[j]] = i;
                next[j] += 1;
            }
        }
        CsrPattern {
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            col_indices,
            row_ptrs,
        }
    }
}
