//! Algebraic path constraints, `g(t, x, u, s)` enforced at every
//! path-constraint point. Same A/B/D form as the defects with an empty A
//! and an identity B.

use std::ops::Range;

use nalgebra::DVector;
use tracing::{debug, warn};

use crate::{
    decision_vector::DecisionVector,
    error::TranscriptionError,
    nlp_function_data::{MatrixNonZeros, NlpFunctionData, NlpMatrix},
    sparse::{BlockMode, SparseMatrix},
    user_functions::{JacobianType, PathFunctionContainer, PathOutput, manager::UserFunctionProperties},
};

/// Per-point decision-vector columns a path function depends on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PointColumns {
    pub state: Range<usize>,
    pub control: Option<Range<usize>>,
    pub static_params: Range<usize>,
}

impl PointColumns {
    pub(crate) fn at(dec: &DecisionVector, point_idx: usize) -> Result<Self, TranscriptionError> {
        let control = if dec.num_control_vars() > 0 {
            Some(dec.control_idxs_at_mesh_point(point_idx, 0)?)
        } else {
            None
        };
        Ok(Self {
            state: dec.state_idxs_at_mesh_point(point_idx, 0)?,
            control,
            static_params: dec.static_idxs(),
        })
    }

    pub(crate) fn for_type(&self, ty: JacobianType) -> Option<Range<usize>> {
        match ty {
            JacobianType::State => Some(self.state.clone()),
            JacobianType::Control => self.control.clone(),
            JacobianType::Static => Some(self.static_params.clone()),
            JacobianType::Time => None,
        }
    }
}

/// Marks `D[row_offset + r, cols.start + c]` for every entry of `pattern`.
pub(crate) fn insert_pattern_rows(
    data: &mut NlpFunctionData,
    row_offset: usize,
    pattern: &SparseMatrix,
    cols: &Range<usize>,
) -> Result<(), TranscriptionError> {
    for (r, c, _) in pattern.iter() {
        if c < cols.len() {
            data.insert_element(NlpMatrix::D, row_offset + r, cols.start + c, 1.0, BlockMode::Replace)?;
        }
    }
    Ok(())
}

/// Writes `value` into `par_q` only where the constant D pattern has an
/// entry; the Jacobian structure never changes between iterates. Returns
/// whether the value was stored. A nonzero outside the pattern is dropped
/// with a warning, since the user function's sparsity changed after it was
/// discovered.
pub(crate) fn set_in_pattern(
    par_q: &mut SparseMatrix,
    row: usize,
    col: usize,
    value: f64,
) -> Result<bool, TranscriptionError> {
    if par_q.contains(row, col) {
        par_q.set(row, col, value)?;
        return Ok(true);
    }
    if value != 0.0 {
        warn!(row, col, value, "Jacobian entry outside the discovered sparsity pattern was dropped");
    }
    Ok(false)
}

#[derive(Debug, Clone, Default)]
pub struct AlgPathFuncUtil {
    data: NlpFunctionData,
    num_functions_per_point: usize,
    num_function_points: usize,
    /// dt/dt0 and dt/dtf at every path-constraint point.
    d_time_d_ti: Vec<f64>,
    d_time_d_tf: Vec<f64>,
}

impl AlgPathFuncUtil {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_functions(&self) -> usize {
        self.num_functions_per_point * self.num_function_points
    }

    /// Sizes the function data and builds its constant matrices. `d_ti`
    /// and `d_tf` hold one chain-rule factor per point.
    pub fn initialize(
        &mut self,
        props: &UserFunctionProperties,
        dec: &DecisionVector,
        num_functions_per_point: usize,
        d_ti: &[f64],
        d_tf: &[f64],
    ) -> Result<(), TranscriptionError> {
        if d_ti.len() != d_tf.len() {
            return Err(TranscriptionError::length("AlgPathFuncUtil::initialize", d_ti.len(), d_tf.len()));
        }
        self.num_functions_per_point = num_functions_per_point;
        self.num_function_points = d_ti.len();
        self.d_time_d_ti = d_ti.to_vec();
        self.d_time_d_tf = d_tf.to_vec();

        let num_functions = self.num_functions();
        self.data = NlpFunctionData::new();
        self.data
            .initialize(num_functions, dec.num_decision_params(), num_functions);

        for point_idx in 0..self.num_function_points {
            let low_idx = point_idx * num_functions_per_point;
            let cols = PointColumns::at(dec, point_idx)?;
            for j in 0..num_functions_per_point {
                self.data
                    .insert_element(NlpMatrix::B, low_idx + j, low_idx + j, 1.0, BlockMode::Replace)?;
            }
            for ty in [JacobianType::State, JacobianType::Control, JacobianType::Static] {
                if let (Some(pattern), Some(range)) = (props.pattern(PathOutput::Algebraic, ty), cols.for_type(ty)) {
                    insert_pattern_rows(&mut self.data, low_idx, pattern, &range)?;
                }
            }
            if let Some(pattern) = props.pattern(PathOutput::Algebraic, JacobianType::Time) {
                for (r, _, _) in pattern.iter() {
                    self.data
                        .insert_element(NlpMatrix::D, low_idx + r, 0, 1.0, BlockMode::Replace)?;
                    self.data
                        .insert_element(NlpMatrix::D, low_idx + r, 1, 1.0, BlockMode::Replace)?;
                }
            }
        }

        debug!(
            num_functions,
            nnz_d = self.data.matrix_num_non_zeros().d,
            "Built algebraic path constraint matrices"
        );
        Ok(())
    }

    /// Stacked constraint values and their Jacobian.
    pub fn compute_func_and_jac(
        &self,
        func_data: &[PathFunctionContainer],
        dec: &DecisionVector,
    ) -> Result<(DVector<f64>, SparseMatrix), TranscriptionError> {
        if func_data.len() < self.num_function_points {
            return Err(TranscriptionError::length(
                "AlgPathFuncUtil::compute_func_and_jac",
                self.num_function_points,
                func_data.len(),
            ));
        }
        let mut q = DVector::zeros(self.num_functions());
        let mut par_q = self.data.d_matrix().sparsity_pattern(true);

        for point_idx in 0..self.num_function_points {
            let Some(alg) = func_data[point_idx].alg_data() else {
                return Err(TranscriptionError::NotInitialized("algebraic path function data"));
            };
            let low_idx = point_idx * self.num_functions_per_point;
            let cols = PointColumns::at(dec, point_idx)?;
            let jac_t = alg.jacobian(JacobianType::Time)?;

            for f in 0..self.num_functions_per_point {
                let row = low_idx + f;
                q[row] = alg.values()[f];
                for ty in [JacobianType::State, JacobianType::Control, JacobianType::Static] {
                    let Some(range) = cols.for_type(ty) else {
                        continue;
                    };
                    let jac = alg.jacobian(ty)?;
                    for (c, col) in range.enumerate() {
                        let v = jac[(f, c)];
                        if v != 0.0 {
                            set_in_pattern(&mut par_q, row, col, v)?;
                        }
                    }
                }
                set_in_pattern(&mut par_q, row, 0, jac_t[(f, 0)] * self.d_time_d_ti[point_idx])?;
                set_in_pattern(&mut par_q, row, 1, jac_t[(f, 0)] * self.d_time_d_tf[point_idx])?;
            }
        }

        let values = self.data.compute_functions(&q, dec.decision_vector())?;
        let jac = self.data.compute_jacobian(&par_q)?;
        Ok((values, jac))
    }

    pub fn sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        self.data.compute_jac_sparsity_pattern().cloned()
    }

    pub fn matrix_num_non_zeros(&self) -> MatrixNonZeros {
        self.data.matrix_num_non_zeros()
    }
}
