use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::{error::TranscriptionError, sparse::SparseMatrix};

impl SparseMatrix {
    /// Computes `self * v`.
    pub fn mul_vector(&self, v: &DVector<f64>) -> Result<DVector<f64>, TranscriptionError> {
        let mut out = DVector::zeros(self.nrows());
        self.mul_vector_into(v, &mut out, false)?;
        Ok(out)
    }

    /// Writes `self * v` into `out`, or adds it when `accumulate` is set.
    pub fn mul_vector_into(
        &self,
        v: &DVector<f64>,
        out: &mut DVector<f64>,
        accumulate: bool,
    ) -> Result<(), TranscriptionError> {
        if v.len() != self.ncols() {
            return Err(TranscriptionError::length(
                "SparseMatrix::mul_vector input",
                self.ncols(),
                v.len(),
            ));
        }
        if out.len() != self.nrows() {
            return Err(TranscriptionError::length(
                "SparseMatrix::mul_vector output",
                self.nrows(),
                out.len(),
            ));
        }
        let product = &self.to_csr() * v;
        if accumulate {
            *out += product;
        } else {
            out.copy_from(&product);
        }
        Ok(())
    }

    /// Sparse product. The result's pattern is the structural product of
    /// both patterns, so stored zeros still contribute structure.
    pub fn mul_sparse(&self, rhs: &SparseMatrix) -> Result<SparseMatrix, TranscriptionError> {
        if self.ncols() != rhs.nrows() {
            return Err(TranscriptionError::shape(
                "SparseMatrix::mul_sparse",
                (self.ncols(), rhs.ncols()),
                rhs.shape(),
            ));
        }
        Ok(SparseMatrix::from_csr(&(&self.to_csr() * &rhs.to_csr())))
    }

    /// Sparse sum; the pattern is the union of both patterns.
    pub fn add(&self, rhs: &SparseMatrix) -> Result<SparseMatrix, TranscriptionError> {
        if self.shape() != rhs.shape() {
            return Err(TranscriptionError::shape("SparseMatrix::add", self.shape(), rhs.shape()));
        }
        Ok(SparseMatrix::from_csr(&(&self.to_csr() + &rhs.to_csr())))
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.nrows(), self.ncols());
        for (r, c, v) in self.iter() {
            dense[(r, c)] = v;
        }
        dense
    }

    /// Dense copy of the inclusive sub-block `[row_lb, row_ub] x [col_lb, col_ub]`.
    pub fn to_dense_block(
        &self,
        row_lb: usize,
        row_ub: usize,
        col_lb: usize,
        col_ub: usize,
    ) -> Result<DMatrix<f64>, TranscriptionError> {
        if row_lb > row_ub || col_lb > col_ub || row_ub >= self.nrows() || col_ub >= self.ncols() {
            return Err(TranscriptionError::IndexOutOfRange {
                context: "SparseMatrix::to_dense_block",
                row: row_ub,
                col: col_ub,
                nrows: self.nrows(),
                ncols: self.ncols(),
            });
        }
        let mut dense = DMatrix::zeros(row_ub - row_lb + 1, col_ub - col_lb + 1);
        for r in row_lb..=row_ub {
            for (c, v) in self.row_iter(r) {
                if (col_lb..=col_ub).contains(&c) {
                    dense[(r - row_lb, c - col_lb)] = v;
                }
            }
        }
        Ok(dense)
    }

    /// Keeps only the nonzero entries of a dense matrix.
    pub fn from_dense(dense: &DMatrix<f64>) -> SparseMatrix {
        let mut out = SparseMatrix::new(dense.nrows(), dense.ncols());
        for r in 0..dense.nrows() {
            for c in 0..dense.ncols() {
                let v = dense[(r, c)];
                if v != 0.0 {
                    out.entries.insert((r, c), v);
                }
            }
        }
        out
    }

    /// COO copy; stored zeros are kept.
    pub fn to_coo(&self) -> CooMatrix<f64> {
        let mut coo = CooMatrix::new(self.nrows(), self.ncols());
        for (r, c, v) in self.iter() {
            coo.push(r, c, v);
        }
        coo
    }

    /// CSR copy used for all products; stored zeros stay in the pattern.
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        CsrMatrix::from(&self.to_coo())
    }

    pub fn from_csr(csr: &CsrMatrix<f64>) -> SparseMatrix {
        let mut out = SparseMatrix::new(csr.nrows(), csr.ncols());
        for (row_idx, row) in csr.row_iter().enumerate() {
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                out.entries.insert((row_idx, col_idx), val);
            }
        }
        out
    }
}
