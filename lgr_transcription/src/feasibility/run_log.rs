use argmin::core::{TerminationReason, TerminationStatus};
use nalgebra::DVector;

use crate::transcription::MeshRefinementResult;

/// Outcome of one feasibility solve.
#[derive(Debug, Clone)]
pub struct FeasibilityRunLogData {
    pub solver_name: String,
    pub termination_status: TerminationStatus,
    pub termination_reason: Option<TerminationReason>,
    pub iterations: u64,
    pub best_cost: f64,
    /// Largest absolute residual (constraints and boundary) at the solution.
    pub max_residual: f64,
    pub best_params: DVector<f64>,
    pub cost_history: Vec<f64>,
}

/// One solve followed by an error estimate of the mesh it ran on.
#[derive(Debug, Clone)]
pub struct MeshPassLogData {
    pub num_mesh_intervals: usize,
    pub num_decision_vars: usize,
    pub run: FeasibilityRunLogData,
    pub refinement: MeshRefinementResult,
}
