//! Sparse-matrix substrate shared by every transcription matrix.
//!
//! Entries are stored row-major with explicit structural entries: a stored
//! `0.0` is still part of the sparsity pattern. The A/B/D matrices and the
//! Jacobian pattern handed to the optimizer rely on this, since the pattern
//! is fixed once per mesh while values change every iterate.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::TranscriptionError;

pub mod products;

/// How a block is written into a larger matrix.
///
/// Neither mode removes entries outside the inserted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// Overwrite the entries the block touches.
    Replace,
    /// Add the block to the existing entries.
    Accumulate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    entries: BTreeMap<(usize, usize), f64>,
}

/// Row, column and value vectors describing the stored entries of a matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreeVectorForm {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub values: Vec<f64>,
}

impl ThreeVectorForm {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SparseMatrix {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: BTreeMap::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Number of stored entries, explicit zeros included.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Resizes and clears the matrix.
    pub fn set_size(&mut self, nrows: usize, ncols: usize) {
        self.nrows = nrows;
        self.ncols = ncols;
        self.entries.clear();
    }

    fn check_index(&self, context: &'static str, row: usize, col: usize) -> Result<(), TranscriptionError> {
        if row >= self.nrows || col >= self.ncols {
            return Err(TranscriptionError::IndexOutOfRange {
                context,
                row,
                col,
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }
        Ok(())
    }

    /// Value at `(row, col)`; entries outside the pattern read as zero.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, TranscriptionError> {
        self.check_index("SparseMatrix::get", row, col)?;
        Ok(self.entries.get(&(row, col)).copied().unwrap_or(0.0))
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.entries.contains_key(&(row, col))
    }

    /// Stores `value` at `(row, col)`, adding the entry to the pattern.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), TranscriptionError> {
        self.check_index("SparseMatrix::set", row, col)?;
        self.entries.insert((row, col), value);
        Ok(())
    }

    pub fn add_to(&mut self, row: usize, col: usize, value: f64) -> Result<(), TranscriptionError> {
        self.check_index("SparseMatrix::add_to", row, col)?;
        *self.entries.entry((row, col)).or_insert(0.0) += value;
        Ok(())
    }

    pub(crate) fn write_entry(&mut self, row: usize, col: usize, value: f64, mode: BlockMode) {
        match mode {
            BlockMode::Replace => {
                self.entries.insert((row, col), value);
            }
            BlockMode::Accumulate => {
                *self.entries.entry((row, col)).or_insert(0.0) += value;
            }
        }
    }

    /// Iterates stored entries in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.entries.iter().map(|(&(r, c), &v)| (r, c, v))
    }

    /// Stored entries of one row, in column order.
    pub fn row_iter(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries
            .range((row, 0)..(row + 1, 0))
            .map(|(&(_, c), &v)| (c, v))
    }

    /// Builds a matrix from the three-vector form.
    pub fn from_three_vector(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
    ) -> Result<Self, TranscriptionError> {
        let mut mat = SparseMatrix::new(nrows, ncols);
        mat.set_block_triplets(0, 0, rows, cols, values, BlockMode::Replace)?;
        Ok(mat)
    }

    /// Builds a pattern-only matrix: stored values are `0.0` when
    /// `with_zeros` is set and `1.0` otherwise.
    pub fn from_sparsity_pattern(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        with_zeros: bool,
    ) -> Result<Self, TranscriptionError> {
        let fill = if with_zeros { 0.0 } else { 1.0 };
        let values = vec![fill; rows.len()];
        Self::from_three_vector(nrows, ncols, rows, cols, &values)
    }

    pub fn three_vector_form(&self) -> ThreeVectorForm {
        let mut out = ThreeVectorForm {
            rows: Vec::with_capacity(self.nnz()),
            cols: Vec::with_capacity(self.nnz()),
            values: Vec::with_capacity(self.nnz()),
        };
        for (r, c, v) in self.iter() {
            out.rows.push(r);
            out.cols.push(c);
            out.values.push(v);
        }
        out
    }

    /// Same structure, values replaced by `0.0` (`with_zeros`) or `1.0`.
    pub fn sparsity_pattern(&self, with_zeros: bool) -> SparseMatrix {
        let fill = if with_zeros { 0.0 } else { 1.0 };
        SparseMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            entries: self.entries.keys().map(|&k| (k, fill)).collect(),
        }
    }

    /// Writes `(rows[i] + row_offset, cols[i] + col_offset) = values[i]`.
    pub fn set_block_triplets(
        &mut self,
        row_offset: usize,
        col_offset: usize,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
        mode: BlockMode,
    ) -> Result<(), TranscriptionError> {
        if values.is_empty() {
            return Ok(());
        }
        if values.len() > self.nrows * self.ncols {
            return Err(TranscriptionError::TooManyNonZeros {
                nnz: values.len(),
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }
        if rows.len() != values.len() {
            return Err(TranscriptionError::length(
                "SparseMatrix::set_block_triplets rows",
                values.len(),
                rows.len(),
            ));
        }
        if cols.len() != values.len() {
            return Err(TranscriptionError::length(
                "SparseMatrix::set_block_triplets cols",
                values.len(),
                cols.len(),
            ));
        }
        for (&r, &c) in rows.iter().zip(cols) {
            self.check_index("SparseMatrix::set_block_triplets", r + row_offset, c + col_offset)?;
        }
        for ((&r, &c), &v) in rows.iter().zip(cols).zip(values) {
            self.write_entry(r + row_offset, c + col_offset, v, mode);
        }
        Ok(())
    }

    /// Inserts every stored entry of `block` at the given offset.
    pub fn set_sparse_block(
        &mut self,
        row_offset: usize,
        col_offset: usize,
        block: &SparseMatrix,
        mode: BlockMode,
    ) -> Result<(), TranscriptionError> {
        if block.nrows + row_offset > self.nrows || block.ncols + col_offset > self.ncols {
            return Err(TranscriptionError::shape(
                "SparseMatrix::set_sparse_block",
                (self.nrows, self.ncols),
                (block.nrows + row_offset, block.ncols + col_offset),
            ));
        }
        for (r, c, v) in block.iter() {
            self.write_entry(r + row_offset, c + col_offset, v, mode);
        }
        Ok(())
    }

    /// Inserts the nonzero entries of a dense block; zeros in the block are
    /// skipped and leave the target untouched.
    pub fn set_dense_block(
        &mut self,
        row_offset: usize,
        col_offset: usize,
        block: &DMatrix<f64>,
        mode: BlockMode,
    ) -> Result<(), TranscriptionError> {
        if block.nrows() + row_offset > self.nrows || block.ncols() + col_offset > self.ncols {
            return Err(TranscriptionError::shape(
                "SparseMatrix::set_dense_block",
                (self.nrows, self.ncols),
                (block.nrows() + row_offset, block.ncols() + col_offset),
            ));
        }
        for c in 0..block.ncols() {
            for r in 0..block.nrows() {
                let v = block[(r, c)];
                if v != 0.0 {
                    self.write_entry(r + row_offset, c + col_offset, v, mode);
                }
            }
        }
        Ok(())
    }

    /// Tiles `block` `row_reps` x `col_reps` times.
    pub fn replicate(block: &SparseMatrix, row_reps: usize, col_reps: usize) -> SparseMatrix {
        let mut out = SparseMatrix::new(block.nrows * row_reps, block.ncols * col_reps);
        for rb in 0..row_reps {
            for cb in 0..col_reps {
                for (r, c, v) in block.iter() {
                    out.entries
                        .insert((r + rb * block.nrows, c + cb * block.ncols), v);
                }
            }
        }
        out
    }

    /// True when nothing is stored.
    pub fn is_zero_matrix(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn abs_total_sum(&self) -> f64 {
        self.entries.values().map(|v| v.abs()).sum()
    }

    pub fn print_nonzero_elements(&self) {
        println!("Sparse matrix {}x{} ({} stored):", self.nrows, self.ncols, self.nnz());
        for (r, c, v) in self.iter() {
            if v != 0.0 {
                println!("   ({r}, {c}) = {v:.12e}");
            }
        }
    }
}
