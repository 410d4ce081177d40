//! Closes the collocation equations with boundary conditions and solves the
//! resulting square (or overdetermined) system with argmin's Gauss-Newton.
//!
//! This is a feasibility solve, not an optimizer: the integral cost is
//! reported but never minimized, and decision-vector bounds are not
//! enforced.

pub mod observer;
pub mod run_log;

use std::cell::RefCell;

use anyhow::bail;
use argmin::{
    core::{Error as ArgminError, Executor, Jacobian, Operator, State, observers::ObserverMode},
    solver::gaussnewton::GaussNewton,
};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::{
    decision_vector::DecisionVector, error::TranscriptionError, phase::RadauPhase, user_functions::BoundaryFunction,
};

pub use observer::CostHistoryObserver;
pub use run_log::{FeasibilityRunLogData, MeshPassLogData};

type FeasibilitySolver = GaussNewton<f64>;

/// Relative step for the boundary-function finite differences.
const BOUNDARY_FD_STEP: f64 = 1.0e-7;

/// Residuals `[phase constraints; boundary residuals]` as an argmin problem.
///
/// Algebraic path constraints are driven to zero, so they should have
/// equal lower and upper bounds.
pub struct FeasibilityProblem<'a> {
    phase: RefCell<&'a mut RadauPhase>,
    boundary: &'a dyn BoundaryFunction,
}

/// Evaluates the boundary function at the endpoints stored in `dec`.
fn boundary_residuals(
    boundary: &dyn BoundaryFunction,
    dec: &DecisionVector,
) -> Result<DVector<f64>, TranscriptionError> {
    let values = boundary
        .evaluate(
            dec.first_time(),
            &dec.first_state_vector()?,
            dec.last_time(),
            &dec.last_state_vector()?,
            &dec.static_vector(),
        )
        .map_err(|source| TranscriptionError::UserFunction {
            context: "boundary function".to_string(),
            source,
        })?;
    if values.len() != boundary.num_functions() {
        return Err(TranscriptionError::length(
            "BoundaryFunction::evaluate",
            boundary.num_functions(),
            values.len(),
        ));
    }
    Ok(values)
}

impl<'a> FeasibilityProblem<'a> {
    /// The phase must already be initialized.
    pub fn new(phase: &'a mut RadauPhase, boundary: &'a dyn BoundaryFunction) -> Self {
        Self {
            phase: RefCell::new(phase),
            boundary,
        }
    }

    pub fn num_residuals(&self) -> usize {
        self.phase.borrow().num_constraints() + self.boundary.num_functions()
    }

    fn num_params(&self) -> Result<usize, TranscriptionError> {
        Ok(self.phase.borrow().decision_vector()?.num_decision_params())
    }

    /// Residuals at `params`; leaves the phase at that iterate.
    pub fn residuals(&self, params: &DVector<f64>) -> Result<DVector<f64>, TranscriptionError> {
        let mut phase = self.phase.borrow_mut();
        phase.set_decision_vector(params)?;
        let constraints = phase.constraint_vector()?;
        let boundary = boundary_residuals(self.boundary, phase.decision_vector()?)?;
        Ok(DVector::from_iterator(
            constraints.len() + boundary.len(),
            constraints.iter().chain(boundary.iter()).copied(),
        ))
    }

    /// Phase constraint Jacobian over boundary rows differenced in the
    /// time, endpoint-state and static columns only.
    pub fn residual_jacobian(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, TranscriptionError> {
        let mut phase = self.phase.borrow_mut();
        phase.set_decision_vector(params)?;
        let constraint_jac = phase.constraint_jacobian()?.to_dense();
        let dec = phase.decision_vector()?;

        let num_cons = constraint_jac.nrows();
        let num_boundary = self.boundary.num_functions();
        let mut jac = DMatrix::zeros(num_cons + num_boundary, params.len());
        jac.rows_mut(0, num_cons).copy_from(&constraint_jac);

        let columns = dec
            .time_idxs()
            .into_iter()
            .chain(dec.initial_state_idxs()?)
            .chain(dec.final_state_idxs()?)
            .chain(dec.static_idxs());
        let mut shifted_dec = dec.clone();
        for col in columns {
            let h = BOUNDARY_FD_STEP * params[col].abs().max(1.0);
            let mut shifted = params.clone();
            shifted[col] = params[col] + h;
            shifted_dec.set_decision_vector(&shifted)?;
            let plus = boundary_residuals(self.boundary, &shifted_dec)?;
            shifted[col] = params[col] - h;
            shifted_dec.set_decision_vector(&shifted)?;
            let minus = boundary_residuals(self.boundary, &shifted_dec)?;
            for r in 0..num_boundary {
                jac[(num_cons + r, col)] = (plus[r] - minus[r]) / (2.0 * h);
            }
        }
        Ok(jac)
    }

    fn print_pre_solve_summary(&self, initial: &DVector<f64>) {
        let phase = self.phase.borrow();
        println!("\n------- pre feasibility solve -------");
        println!(
            "  mesh: {:?} points over {:?}",
            phase.problem().mesh_interval_num_points(),
            phase.problem().mesh_interval_fractions()
        );
        println!(
            "  decision vars: {}, residuals: {}",
            initial.len(),
            phase.num_constraints() + self.boundary.num_functions()
        );
        drop(phase);
        self.residuals(initial).map_or_else(
            |err| println!("  initial residual computation error: {err}"),
            |r| println!("  initial residual norm: {:.6e}", r.norm()),
        );
    }
}

impl Operator for FeasibilityProblem<'_> {
    type Param = DVector<f64>;
    type Output = DVector<f64>;

    fn apply(&self, p: &Self::Param) -> Result<Self::Output, ArgminError> {
        let num_params = self.num_params()?;
        if p.len() != num_params {
            bail!(
                "Parameter vector length ({}) for feasibility residuals did not match number of decision variables ({})",
                p.len(),
                num_params
            );
        }
        Ok(self.residuals(p)?)
    }
}

impl Jacobian for FeasibilityProblem<'_> {
    type Param = DVector<f64>;
    type Jacobian = DMatrix<f64>;

    fn jacobian(&self, p: &Self::Param) -> Result<Self::Jacobian, ArgminError> {
        let num_params = self.num_params()?;
        if p.len() != num_params {
            bail!(
                "Parameter vector length ({}) for feasibility jacobian did not match number of decision variables ({})",
                p.len(),
                num_params
            );
        }
        Ok(self.residual_jacobian(p)?)
    }
}

fn print_post_solve_summary<S, I>(state: &I, max_residual: f64)
where
    I: State<Param = DVector<f64>, Float = f64>,
{
    println!("------- post feasibility solve -------");
    println!("  solver: {}", tynm::type_name::<S>());
    println!(
        "    stop status: {:?} at iteration {}",
        state.get_termination_status(),
        state.get_iter()
    );
    println!("    stop reason: {:?}", state.get_termination_reason());
    println!("Best cost: {:.6e}", state.get_best_cost());
    println!("Max |residual| at best params: {max_residual:.6e}");
}

/// Solves the phase constraints together with `boundary` from the phase's
/// current decision vector, leaving the phase at the best iterate found.
pub fn solve_feasibility(
    phase: &mut RadauPhase,
    boundary: &dyn BoundaryFunction,
    max_iters: u64,
) -> Result<FeasibilityRunLogData, TranscriptionError> {
    let initial = phase.decision_vector()?.decision_vector().clone();
    let problem = FeasibilityProblem::new(&mut *phase, boundary);
    problem.print_pre_solve_summary(&initial);

    let solver: FeasibilitySolver = GaussNewton::new();

    let observer = CostHistoryObserver::new();
    let opt_result = Executor::new(problem, solver)
        .configure(|state| state.param(initial).max_iters(max_iters))
        .add_observer(observer.clone(), ObserverMode::Always)
        .run()?;

    let state = &opt_result.state;
    let best_params = state.get_best_param().cloned().ok_or(TranscriptionError::NoSolution)?;
    let termination_status = state.get_termination_status().clone();
    let termination_reason = state.get_termination_reason().cloned();
    let iterations = state.get_iter();
    let best_cost = state.get_best_cost();

    let max_residual = opt_result
        .problem
        .problem
        .as_ref()
        .ok_or(TranscriptionError::NoSolution)?
        .residuals(&best_params)?
        .amax();
    print_post_solve_summary::<FeasibilitySolver, _>(state, max_residual);
    drop(opt_result);

    info!(iterations, best_cost, max_residual, "Feasibility solve finished");
    Ok(FeasibilityRunLogData {
        solver_name: tynm::type_name::<FeasibilitySolver>(),
        termination_status,
        termination_reason,
        iterations,
        best_cost,
        max_residual,
        best_params,
        cost_history: observer.cost_history(),
    })
}

/// Alternates feasibility solves with mesh refinement until the error
/// estimate meets the tolerance or the pass limit is reached. The phase
/// ends holding the solution on the last mesh solved.
pub fn solve_with_mesh_refinement(
    phase: &mut RadauPhase,
    boundary: &dyn BoundaryFunction,
    max_iters: u64,
) -> Result<Vec<MeshPassLogData>, TranscriptionError> {
    let max_passes = phase.config().max_mesh_refinement_iterations.max(1);
    let mut passes = Vec::with_capacity(max_passes);
    for pass in 0..max_passes {
        let num_mesh_intervals = phase.problem().num_mesh_intervals();
        let num_decision_vars = phase.problem().num_decision_vars_nlp();
        let run = solve_feasibility(phase, boundary, max_iters)?;

        let is_last = pass + 1 == max_passes;
        let refinement = phase.refine_mesh(!is_last)?;
        debug!(
            pass,
            max_rel_error = refinement.max_rel_error(),
            is_mesh_refined = refinement.is_mesh_refined,
            "Mesh refinement pass"
        );
        let done = !refinement.is_mesh_refined;
        passes.push(MeshPassLogData {
            num_mesh_intervals,
            num_decision_vars,
            run,
            refinement,
        });
        if done || is_last {
            break;
        }
    }
    Ok(passes)
}
