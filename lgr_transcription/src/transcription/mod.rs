//! Collocation transcription: turns the continuous problem into defect,
//! cost and path-constraint NLP functions with constant-structure
//! Jacobians.

use nalgebra::{DMatrix, DVector};

use crate::{
    decision_vector::DecisionVector,
    error::TranscriptionError,
    nlp_function_data::{MatrixNonZeros, NlpFunctionData},
    sparse::SparseMatrix,
    user_functions::{FunctionInputData, PathFunctionContainer, manager::PathFunctionManager},
};

pub mod alg_path;
pub mod mesh_refinement;
pub mod radau;

/// NLP sizes produced by initializing a transcription. The phase copies
/// them into its `ProblemCharacteristics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NlpCounts {
    pub num_state_vars_nlp: usize,
    pub num_control_vars_nlp: usize,
    pub num_decision_vars_nlp: usize,
    pub num_defect_con_nlp: usize,
}

/// State shared by every collocation scheme.
#[derive(Debug, Clone, Default)]
pub struct CollocationData {
    /// Physical time of every discretization point, terminal point included.
    pub(crate) time_vector: DVector<f64>,
    pub(crate) num_mesh_points: usize,
    pub(crate) num_state_points: usize,
    pub(crate) num_control_points: usize,
    pub(crate) num_path_constraint_points: usize,

    pub(crate) defect_data: NlpFunctionData,
    pub(crate) cost_data: NlpFunctionData,
    pub(crate) defect_matrices_initialized: bool,
    pub(crate) cost_matrices_initialized: bool,
}

impl CollocationData {
    pub fn time_vector(&self) -> &DVector<f64> {
        &self.time_vector
    }

    pub fn num_mesh_points(&self) -> usize {
        self.num_mesh_points
    }

    pub fn num_state_points(&self) -> usize {
        self.num_state_points
    }

    pub fn num_control_points(&self) -> usize {
        self.num_control_points
    }

    pub fn num_path_constraint_points(&self) -> usize {
        self.num_path_constraint_points
    }

    /// Drops the constant matrices so the next `prepare_to_optimize`
    /// rebuilds them for a new mesh.
    pub(crate) fn reset_matrices(&mut self) {
        self.defect_data = NlpFunctionData::new();
        self.cost_data = NlpFunctionData::new();
        self.defect_matrices_initialized = false;
        self.cost_matrices_initialized = false;
    }
}

/// Outcome of one mesh-refinement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRefinementResult {
    pub is_mesh_refined: bool,
    pub new_mesh_interval_fractions: Vec<f64>,
    pub new_mesh_interval_num_points: Vec<usize>,
    /// Estimated max relative defect error of every old interval.
    pub max_rel_error_array: Vec<f64>,
    /// `(num_new_collocation_points + 1) x num_state_vars`.
    pub new_state_guess: DMatrix<f64>,
    /// `num_new_collocation_points x num_control_vars`.
    pub new_control_guess: DMatrix<f64>,
}

impl MeshRefinementResult {
    pub fn max_rel_error(&self) -> f64 {
        self.max_rel_error_array.iter().copied().fold(0.0, f64::max)
    }
}

/// A collocation scheme. Radau is the only implementation.
pub trait TranscriptionScheme {
    /// Builds the discretization for the current mesh and returns the NLP
    /// sizes. Clears any constant matrices of a previous mesh.
    fn initialize(&mut self) -> Result<NlpCounts, TranscriptionError>;

    /// Maps the normalized discretization points to `[t0, tf]`.
    fn set_time_vector(&mut self, t0: f64, tf: f64) -> Result<(), TranscriptionError>;

    fn discretization_points(&self) -> Result<&DVector<f64>, TranscriptionError>;
    fn time_vector(&self) -> &DVector<f64>;
    fn num_mesh_points(&self) -> usize;
    fn num_state_points(&self) -> usize;
    fn num_control_points(&self) -> usize;
    fn num_path_constraint_points(&self) -> usize;

    /// Path-function inputs at every discretization point.
    fn func_input_data(&self, dec: &DecisionVector) -> Result<Vec<FunctionInputData>, TranscriptionError>;

    /// Sizes the defect and cost function data and builds their constant
    /// A, B and D matrices.
    fn prepare_to_optimize(
        &mut self,
        manager: &PathFunctionManager,
        dec: &DecisionVector,
    ) -> Result<(), TranscriptionError>;

    fn compute_defect_fun_and_jac(
        &mut self,
        func_data: &[PathFunctionContainer],
        dec: &DecisionVector,
    ) -> Result<(DVector<f64>, SparseMatrix), TranscriptionError>;

    fn compute_cost_fun_and_jac(
        &mut self,
        func_data: &[PathFunctionContainer],
        dec: &DecisionVector,
    ) -> Result<(f64, SparseMatrix), TranscriptionError>;

    fn defect_sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError>;
    fn cost_sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError>;
    fn defect_matrix_num_non_zeros(&self) -> MatrixNonZeros;
    fn cost_matrix_num_non_zeros(&self) -> MatrixNonZeros;

    /// Estimates the error of every interval and proposes a new mesh and
    /// a guess on it. Does not change the current mesh.
    fn refine_mesh(
        &mut self,
        dec: &DecisionVector,
        manager: &PathFunctionManager,
    ) -> Result<MeshRefinementResult, TranscriptionError>;
}
