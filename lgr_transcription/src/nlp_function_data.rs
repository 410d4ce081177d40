//! Constant-structure A/B/D decomposition of a set of NLP functions:
//!
//! `f = A z + B Q(z)` and `df/dz = A + B dQ/dz`
//!
//! A and B depend only on the mesh. D holds the sparsity pattern of
//! `dQ/dz`; its values are supplied fresh every iterate as the `par_q`
//! argument of [`NlpFunctionData::compute_jacobian`].

use std::cell::OnceCell;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::{
    error::TranscriptionError,
    sparse::{BlockMode, SparseMatrix},
};

/// Which of the three matrices an insert targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlpMatrix {
    A,
    B,
    D,
}

/// Stored-entry counts of the A, B and D matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixNonZeros {
    pub a: usize,
    pub b: usize,
    pub d: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NlpFunctionData {
    a_matrix: SparseMatrix,
    b_matrix: SparseMatrix,
    d_matrix: SparseMatrix,
    jac_sparsity_pattern: Option<SparseMatrix>,
    // CSR copies of A and B, built on first use after the last insert
    a_csr: OnceCell<CsrMatrix<f64>>,
    b_csr: OnceCell<CsrMatrix<f64>>,
    initialized: bool,
}

impl NlpFunctionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes A (`num_funcs x num_vars`), B (`num_funcs x num_dependencies`)
    /// and D (`num_dependencies x num_vars`), dropping any previous content.
    pub fn initialize(&mut self, num_funcs: usize, num_vars: usize, num_dependencies: usize) {
        self.a_matrix.set_size(num_funcs, num_vars);
        self.b_matrix.set_size(num_funcs, num_dependencies);
        self.d_matrix.set_size(num_dependencies, num_vars);
        self.jac_sparsity_pattern = None;
        self.a_csr = OnceCell::new();
        self.b_csr = OnceCell::new();
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn check_initialized(&self) -> Result<(), TranscriptionError> {
        if !self.initialized {
            return Err(TranscriptionError::NotInitialized("NlpFunctionData"));
        }
        Ok(())
    }

    fn matrix_mut(&mut self, which: NlpMatrix) -> &mut SparseMatrix {
        // any structural change invalidates the cached pattern
        self.jac_sparsity_pattern = None;
        match which {
            NlpMatrix::A => {
                self.a_csr = OnceCell::new();
                &mut self.a_matrix
            }
            NlpMatrix::B => {
                self.b_csr = OnceCell::new();
                &mut self.b_matrix
            }
            NlpMatrix::D => &mut self.d_matrix,
        }
    }

    /// Writes one element of A, B or D.
    pub fn insert_element(
        &mut self,
        which: NlpMatrix,
        row: usize,
        col: usize,
        value: f64,
        mode: BlockMode,
    ) -> Result<(), TranscriptionError> {
        self.check_initialized()?;
        let mat = self.matrix_mut(which);
        match mode {
            BlockMode::Replace => mat.set(row, col, value),
            BlockMode::Accumulate => mat.add_to(row, col, value),
        }
    }

    /// Writes a block given in three-vector form at `(row_offset, col_offset)`.
    pub fn insert_partition(
        &mut self,
        which: NlpMatrix,
        row_offset: usize,
        col_offset: usize,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
        mode: BlockMode,
    ) -> Result<(), TranscriptionError> {
        self.check_initialized()?;
        self.matrix_mut(which)
            .set_block_triplets(row_offset, col_offset, rows, cols, values, mode)
    }

    /// Writes a sparse block at `(row_offset, col_offset)`.
    pub fn insert_sparse_partition(
        &mut self,
        which: NlpMatrix,
        row_offset: usize,
        col_offset: usize,
        block: &SparseMatrix,
        mode: BlockMode,
    ) -> Result<(), TranscriptionError> {
        self.check_initialized()?;
        self.matrix_mut(which)
            .set_sparse_block(row_offset, col_offset, block, mode)
    }

    pub fn a_matrix(&self) -> &SparseMatrix {
        &self.a_matrix
    }
    pub fn b_matrix(&self) -> &SparseMatrix {
        &self.b_matrix
    }
    pub fn d_matrix(&self) -> &SparseMatrix {
        &self.d_matrix
    }

    fn a_csr(&self) -> &CsrMatrix<f64> {
        self.a_csr.get_or_init(|| self.a_matrix.to_csr())
    }

    fn b_csr(&self) -> &CsrMatrix<f64> {
        self.b_csr.get_or_init(|| self.b_matrix.to_csr())
    }

    fn check_b_input(&self, q_vector: &DVector<f64>) -> Result<(), TranscriptionError> {
        if q_vector.len() != self.b_matrix.ncols() {
            return Err(TranscriptionError::length(
                "NlpFunctionData Q vector",
                self.b_matrix.ncols(),
                q_vector.len(),
            ));
        }
        Ok(())
    }

    /// `A z + B Q`.
    pub fn compute_functions(
        &self,
        q_vector: &DVector<f64>,
        dec_vector: &DVector<f64>,
    ) -> Result<DVector<f64>, TranscriptionError> {
        self.check_initialized()?;
        if dec_vector.len() != self.a_matrix.ncols() {
            return Err(TranscriptionError::length(
                "NlpFunctionData decision vector",
                self.a_matrix.ncols(),
                dec_vector.len(),
            ));
        }
        self.check_b_input(q_vector)?;
        Ok(self.a_csr() * dec_vector + self.b_csr() * q_vector)
    }

    /// `B Q`, for functions with no linear decision-vector term (the cost).
    pub fn compute_functions_b_only(&self, q_vector: &DVector<f64>) -> Result<DVector<f64>, TranscriptionError> {
        self.check_initialized()?;
        self.check_b_input(q_vector)?;
        Ok(self.b_csr() * q_vector)
    }

    /// `A + B par_q`. `par_q` must be shaped like D.
    pub fn compute_jacobian(&self, par_q: &SparseMatrix) -> Result<SparseMatrix, TranscriptionError> {
        self.check_initialized()?;
        if par_q.shape() != self.d_matrix.shape() {
            return Err(TranscriptionError::shape(
                "NlpFunctionData::compute_jacobian",
                self.d_matrix.shape(),
                par_q.shape(),
            ));
        }
        let b_par_q = self.b_csr() * &par_q.to_csr();
        Ok(SparseMatrix::from_csr(&(self.a_csr() + &b_par_q)))
    }

    /// Union of the pattern of A and the structural pattern of `B D`.
    /// Computed once and cached until a matrix changes.
    pub fn compute_jac_sparsity_pattern(&mut self) -> Result<&SparseMatrix, TranscriptionError> {
        self.check_initialized()?;
        if self.jac_sparsity_pattern.is_none() {
            let bd = self
                .b_matrix
                .sparsity_pattern(false)
                .mul_sparse(&self.d_matrix.sparsity_pattern(false))?;
            let pattern = self.a_matrix.sparsity_pattern(false).add(&bd)?.sparsity_pattern(false);
            self.jac_sparsity_pattern = Some(pattern);
        }
        self.jac_sparsity_pattern
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("NlpFunctionData jacobian pattern"))
    }

    /// Cached pattern, if [`Self::compute_jac_sparsity_pattern`] has run.
    pub fn jac_sparsity_pattern(&self) -> Option<&SparseMatrix> {
        self.jac_sparsity_pattern.as_ref()
    }

    pub fn matrix_num_non_zeros(&self) -> MatrixNonZeros {
        MatrixNonZeros {
            a: self.a_matrix.nnz(),
            b: self.b_matrix.nnz(),
            d: self.d_matrix.nnz(),
        }
    }
}
