use nalgebra::DVector;
use tracing::debug;

use crate::{error::TranscriptionError, sparse::SparseMatrix};

/// Row-norm reciprocals outside this range are replaced by 1.
const ROW_SCALE_RANGE: (f64, f64) = (1.0e-4, 1.0e10);

/// Scales the NLP to O(1) quantities.
///
/// Decision variables use an affine map `z_s = z * w + shift`; the cost
/// and constraints are multiplied by weights. Constraint weights are
/// stored behind the cost weight, so entry `i` of the weight vector
/// matches row `i` of the stacked `[cost; constraints]` Jacobian whose
/// pattern is given to [`Self::initialize`].
///
/// Constraint and Jacobian scaling fail until constraint weights have been
/// set by one of the `set_constraint_scaling_*` methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleUtility {
    num_vars: usize,
    num_cons: usize,
    cost_weight: f64,
    dec_vec_weight: DVector<f64>,
    dec_vec_shift: DVector<f64>,
    /// `[cost weight, constraint weights...]`.
    con_vec_weight: DVector<f64>,
    jac_row_idxs: Vec<usize>,
    jac_col_idxs: Vec<usize>,
    which_state_var: Vec<usize>,
    if_defect: Vec<bool>,
    is_initialized: bool,
}

impl Default for ScaleUtility {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaleUtility {
    pub fn new() -> Self {
        Self {
            num_vars: 0,
            num_cons: 0,
            cost_weight: 1.0,
            dec_vec_weight: DVector::zeros(0),
            dec_vec_shift: DVector::zeros(0),
            con_vec_weight: DVector::from_element(1, 1.0),
            jac_row_idxs: Vec::new(),
            jac_col_idxs: Vec::new(),
            which_state_var: Vec::new(),
            if_defect: Vec::new(),
            is_initialized: false,
        }
    }

    /// Unit weights and zero shifts for `num_vars` variables and
    /// `num_cons` constraints. The Jacobian indices are rows and columns of
    /// the stacked `[cost; constraints]` Jacobian.
    pub fn initialize(
        &mut self,
        num_vars: usize,
        num_cons: usize,
        jac_row_idxs: Vec<usize>,
        jac_col_idxs: Vec<usize>,
    ) -> Result<(), TranscriptionError> {
        if jac_row_idxs.len() != jac_col_idxs.len() {
            return Err(TranscriptionError::length(
                "ScaleUtility::initialize jacobian indices",
                jac_row_idxs.len(),
                jac_col_idxs.len(),
            ));
        }
        self.num_vars = num_vars;
        self.num_cons = num_cons;
        self.cost_weight = 1.0;
        self.dec_vec_weight = DVector::from_element(num_vars, 1.0);
        self.dec_vec_shift = DVector::zeros(num_vars);
        self.con_vec_weight = DVector::from_element(num_cons + 1, 1.0);
        self.jac_row_idxs = jac_row_idxs;
        self.jac_col_idxs = jac_col_idxs;
        self.which_state_var = vec![0; num_cons];
        self.if_defect = vec![false; num_cons];
        self.is_initialized = false;
        Ok(())
    }

    /// True once constraint weights have been computed or given.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    fn check_gate(&self, context: &'static str) -> Result<(), TranscriptionError> {
        if !self.is_initialized {
            return Err(TranscriptionError::NotInitialized(context));
        }
        Ok(())
    }

    fn check_len(&self, context: &'static str, expected: usize, got: usize) -> Result<(), TranscriptionError> {
        if expected != got {
            return Err(TranscriptionError::length(context, expected, got));
        }
        Ok(())
    }

    pub fn scale_decision_vector(&self, dec_vec: &mut DVector<f64>) -> Result<(), TranscriptionError> {
        self.check_len("ScaleUtility::scale_decision_vector", self.num_vars, dec_vec.len())?;
        for i in 0..self.num_vars {
            dec_vec[i] = dec_vec[i] * self.dec_vec_weight[i] + self.dec_vec_shift[i];
        }
        Ok(())
    }

    pub fn unscale_decision_vector(&self, dec_vec: &mut DVector<f64>) -> Result<(), TranscriptionError> {
        self.check_len("ScaleUtility::unscale_decision_vector", self.num_vars, dec_vec.len())?;
        for i in 0..self.num_vars {
            dec_vec[i] = (dec_vec[i] - self.dec_vec_shift[i]) / self.dec_vec_weight[i];
        }
        Ok(())
    }

    pub fn scale_constraint_vector(&self, con_vec: &mut DVector<f64>) -> Result<(), TranscriptionError> {
        self.check_gate("constraint scaling (scale constraint vector)")?;
        self.check_len("ScaleUtility::scale_constraint_vector", self.num_cons, con_vec.len())?;
        for i in 0..self.num_cons {
            con_vec[i] *= self.con_vec_weight[i + 1];
        }
        Ok(())
    }

    pub fn unscale_constraint_vector(&self, con_vec: &mut DVector<f64>) -> Result<(), TranscriptionError> {
        self.check_gate("constraint scaling (unscale constraint vector)")?;
        self.check_len("ScaleUtility::unscale_constraint_vector", self.num_cons, con_vec.len())?;
        for i in 0..self.num_cons {
            con_vec[i] /= self.con_vec_weight[i + 1];
        }
        Ok(())
    }

    pub fn scale_cost_function(&self, cost: f64) -> f64 {
        cost * self.cost_weight
    }

    pub fn unscale_cost_function(&self, cost: f64) -> f64 {
        cost / self.cost_weight
    }

    /// Scales `[cost, constraints...]` in place.
    pub fn scale_cost_constraint_vector(&self, values: &mut DVector<f64>) -> Result<(), TranscriptionError> {
        self.check_len(
            "ScaleUtility::scale_cost_constraint_vector",
            self.num_cons + 1,
            values.len(),
        )?;
        let mut cons = values.rows(1, self.num_cons).into_owned();
        self.scale_constraint_vector(&mut cons)?;
        values[0] = self.scale_cost_function(values[0]);
        values.rows_mut(1, self.num_cons).copy_from(&cons);
        Ok(())
    }

    /// `J[f, v] * w_con[f] / w_dec[v]` over the stored pattern.
    pub fn scale_jacobian(&self, jac: &mut SparseMatrix) -> Result<(), TranscriptionError> {
        self.check_gate("constraint scaling (scale jacobian)")?;
        for (&f, &v) in self.jac_row_idxs.iter().zip(&self.jac_col_idxs) {
            let value = jac.get(f, v)?;
            jac.set(f, v, value * self.con_vec_weight[f] / self.dec_vec_weight[v])?;
        }
        Ok(())
    }

    pub fn unscale_jacobian(&self, jac: &mut SparseMatrix) -> Result<(), TranscriptionError> {
        self.check_gate("constraint scaling (unscale jacobian)")?;
        for (&f, &v) in self.jac_row_idxs.iter().zip(&self.jac_col_idxs) {
            let value = jac.get(f, v)?;
            jac.set(f, v, value / self.con_vec_weight[f] * self.dec_vec_weight[v])?;
        }
        Ok(())
    }

    /// Maps every variable's `[lower, upper]` onto `[-0.5, 0.5]`:
    /// `w = 1 / (upper - lower)`, `shift = 0.5 - upper * w`.
    pub fn set_dec_vec_scaling_bounds(
        &mut self,
        upper: &DVector<f64>,
        lower: &DVector<f64>,
    ) -> Result<(), TranscriptionError> {
        self.check_len("ScaleUtility::set_dec_vec_scaling_bounds upper", self.num_vars, upper.len())?;
        self.check_len("ScaleUtility::set_dec_vec_scaling_bounds lower", self.num_vars, lower.len())?;
        for i in 0..self.num_vars {
            self.dec_vec_weight[i] = 1.0 / (upper[i] - lower[i]);
            self.dec_vec_shift[i] = 0.5 - upper[i] * self.dec_vec_weight[i];
        }
        Ok(())
    }

    pub fn set_constraint_scaling_user_defined(&mut self, weights: &DVector<f64>) -> Result<(), TranscriptionError> {
        self.check_len(
            "ScaleUtility::set_constraint_scaling_user_defined",
            self.num_cons,
            weights.len(),
        )?;
        self.con_vec_weight[0] = self.cost_weight;
        self.con_vec_weight.rows_mut(1, self.num_cons).copy_from(weights);
        self.is_initialized = true;
        Ok(())
    }

    pub fn set_cost_scaling_user_defined(&mut self, weight: f64) {
        self.cost_weight = weight;
        self.con_vec_weight[0] = weight;
    }

    /// Reciprocal of the norm of every row of the decision-scaled
    /// constraint Jacobian (`num_cons x num_vars`). Set the decision-vector
    /// scaling first.
    pub fn set_constraint_scaling_jacobian(&mut self, con_jac: &SparseMatrix) -> Result<(), TranscriptionError> {
        let row_norms = self.scaled_row_norms(con_jac)?;
        self.con_vec_weight[0] = self.cost_weight;
        for (con_idx, norm) in row_norms.iter().enumerate() {
            self.con_vec_weight[con_idx + 1] = row_scale(*norm);
        }
        self.is_initialized = true;
        debug!(num_cons = self.num_cons, "Computed Jacobian-based constraint scaling");
        Ok(())
    }

    /// Like [`Self::set_constraint_scaling_jacobian`], except that defect
    /// rows take the weight of their state variable.
    pub fn set_constraint_scaling_defect_and_user(&mut self, con_jac: &SparseMatrix) -> Result<(), TranscriptionError> {
        let row_norms = self.scaled_row_norms(con_jac)?;
        self.con_vec_weight[0] = self.cost_weight;
        for (con_idx, norm) in row_norms.iter().enumerate() {
            self.con_vec_weight[con_idx + 1] = if self.if_defect[con_idx] {
                // state variable s at the first mesh point sits at index s + 2
                let idx = self.which_state_var[con_idx] + 2;
                *self.dec_vec_weight.get(idx).ok_or(TranscriptionError::IndexOutOfRange {
                    context: "ScaleUtility::set_constraint_scaling_defect_and_user",
                    row: idx,
                    col: 0,
                    nrows: self.num_vars,
                    ncols: 1,
                })?
            } else {
                row_scale(*norm)
            };
        }
        self.is_initialized = true;
        Ok(())
    }

    fn scaled_row_norms(&self, con_jac: &SparseMatrix) -> Result<Vec<f64>, TranscriptionError> {
        let expected = (self.num_cons, self.num_vars);
        if con_jac.shape() != expected {
            return Err(TranscriptionError::shape(
                "ScaleUtility constraint jacobian",
                expected,
                con_jac.shape(),
            ));
        }
        let mut sums = vec![0.0; self.num_cons];
        for (r, c, v) in con_jac.iter() {
            let scaled = v * self.dec_vec_weight[c];
            sums[r] += scaled * scaled;
        }
        Ok(sums.into_iter().map(f64::sqrt).collect())
    }

    pub fn set_which_state_var(&mut self, which_state_var: Vec<usize>) -> Result<(), TranscriptionError> {
        self.check_len("ScaleUtility::set_which_state_var", self.num_cons, which_state_var.len())?;
        self.which_state_var = which_state_var;
        Ok(())
    }

    pub fn set_if_defect(&mut self, if_defect: Vec<bool>) -> Result<(), TranscriptionError> {
        self.check_len("ScaleUtility::set_if_defect", self.num_cons, if_defect.len())?;
        self.if_defect = if_defect;
        Ok(())
    }

    pub fn cost_weight(&self) -> f64 {
        self.cost_weight
    }

    /// Constraint weights without the leading cost weight.
    pub fn con_vec_weights(&self) -> DVector<f64> {
        self.con_vec_weight.rows(1, self.num_cons).into_owned()
    }

    pub fn dec_vec_weights(&self) -> &DVector<f64> {
        &self.dec_vec_weight
    }

    pub fn dec_vec_shifts(&self) -> &DVector<f64> {
        &self.dec_vec_shift
    }
}

fn row_scale(norm: f64) -> f64 {
    let scale = 1.0 / norm;
    if scale.abs() >= ROW_SCALE_RANGE.0 && scale.abs() <= ROW_SCALE_RANGE.1 {
        scale
    } else {
        1.0
    }
}
