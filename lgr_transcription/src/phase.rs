//! A single Radau phase: owns the problem description, the transcription
//! state, the user path function and the decision vector, and assembles
//! the NLP functions, Jacobians and bounds from them.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::{
    config::TranscriptionConfig,
    decision_vector::{DecVecDims, DecisionVector},
    error::{ConfigError, TranscriptionError},
    problem_characteristics::ProblemCharacteristics,
    scaling::scale_utility::ScaleUtility,
    sparse::{BlockMode, SparseMatrix},
    transcription::{
        MeshRefinementResult, TranscriptionScheme, alg_path::AlgPathFuncUtil, radau::NlpFuncUtilRadau,
        radau::RadauState,
    },
    user_functions::{PathFunction, manager::PathFunctionManager},
};

/// NLP values at one decision vector.
#[derive(Debug, Clone)]
struct NlpEvaluation {
    constraints: DVector<f64>,
    constraint_jac: SparseMatrix,
    cost: f64,
    cost_jac: SparseMatrix,
}

/// Stacks `top` over `bottom`; both must have the same column count.
fn stack_rows(top: &SparseMatrix, bottom: &SparseMatrix) -> Result<SparseMatrix, TranscriptionError> {
    if top.ncols() != bottom.ncols() {
        return Err(TranscriptionError::length("stack_rows", top.ncols(), bottom.ncols()));
    }
    let mut out = SparseMatrix::new(top.nrows() + bottom.nrows(), top.ncols());
    out.set_sparse_block(0, 0, top, BlockMode::Replace)?;
    out.set_sparse_block(top.nrows(), 0, bottom, BlockMode::Replace)?;
    Ok(out)
}

fn stack_vectors(top: &DVector<f64>, bottom: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(top.len() + bottom.len(), top.iter().chain(bottom.iter()).copied())
}

pub struct RadauPhase {
    problem: ProblemCharacteristics,
    config: TranscriptionConfig,
    radau: RadauState,
    path_functions: PathFunctionManager,
    alg_path: AlgPathFuncUtil,
    scale_utility: ScaleUtility,
    decision_vector: Option<DecisionVector>,

    /// Guesses carried over from a refined mesh or supplied by the user.
    state_guess: Option<DMatrix<f64>>,
    control_guess: Option<DMatrix<f64>>,
    time_guess: Option<(f64, f64)>,
    static_guess: Option<DVector<f64>>,

    dec_lower_bound: DVector<f64>,
    dec_upper_bound: DVector<f64>,
    con_lower_bound: DVector<f64>,
    con_upper_bound: DVector<f64>,

    evaluation: Option<NlpEvaluation>,
}

impl std::fmt::Debug for RadauPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadauPhase")
            .field("problem", &self.problem)
            .field("config", &self.config)
            .field("is_initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl RadauPhase {
    pub fn new(mut problem: ProblemCharacteristics, config: TranscriptionConfig, func: Box<dyn PathFunction>) -> Self {
        problem.set_has_integral_cost(func.has_integral_cost());
        problem.set_has_alg_path_cons(func.num_alg_functions() > 0);
        problem.set_bound_tolerance(config.bound_tolerance);
        let path_functions = PathFunctionManager::new(func, &problem);
        Self {
            radau: RadauState::new(&config),
            problem,
            config,
            path_functions,
            alg_path: AlgPathFuncUtil::new(),
            scale_utility: ScaleUtility::new(),
            decision_vector: None,
            state_guess: None,
            control_guess: None,
            time_guess: None,
            static_guess: None,
            dec_lower_bound: DVector::zeros(0),
            dec_upper_bound: DVector::zeros(0),
            con_lower_bound: DVector::zeros(0),
            con_upper_bound: DVector::zeros(0),
            evaluation: None,
        }
    }

    pub fn problem(&self) -> &ProblemCharacteristics {
        &self.problem
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.decision_vector.is_some()
    }

    pub fn path_functions(&self) -> &PathFunctionManager {
        &self.path_functions
    }

    pub fn radau_state(&self) -> &RadauState {
        &self.radau
    }

    pub fn scale_utility(&self) -> &ScaleUtility {
        &self.scale_utility
    }

    /// State guess with one row per state point of the current mesh. A
    /// guess of the wrong shape is ignored at initialization.
    pub fn set_state_guess(&mut self, states: DMatrix<f64>) {
        self.state_guess = Some(states);
    }

    /// Control guess with one row per control point of the current mesh.
    pub fn set_control_guess(&mut self, controls: DMatrix<f64>) {
        self.control_guess = Some(controls);
    }

    /// Builds the discretization, the decision vector and every constant
    /// matrix for the current mesh. Called again after mesh refinement.
    pub fn initialize(&mut self) -> Result<(), TranscriptionError> {
        self.config.validate()?;
        self.radau.configure(&self.config)?;
        self.problem.validate()?;

        let counts = NlpFuncUtilRadau::new(&self.problem, &mut self.radau).initialize()?;
        self.problem.set_num_state_vars_nlp(counts.num_state_vars_nlp);
        self.problem.set_num_control_vars_nlp(counts.num_control_vars_nlp);
        self.problem.set_num_decision_vars_nlp(counts.num_decision_vars_nlp);
        self.problem.set_num_defect_con_nlp(counts.num_defect_con_nlp);

        let num_mesh_points = self.radau.collocation_data().num_mesh_points();
        let mut dec = DecisionVector::initialize(DecVecDims::radau(
            self.problem.num_state_vars(),
            self.problem.num_control_vars(),
            0,
            self.problem.num_static_vars(),
            num_mesh_points,
        ))?;
        self.seed_guess(&mut dec)?;

        let mut util = NlpFuncUtilRadau::new(&self.problem, &mut self.radau);
        util.set_time_vector(dec.first_time(), dec.last_time())?;
        let inputs = util.func_input_data(&dec)?;
        let first_input = inputs
            .first()
            .ok_or(TranscriptionError::NotInitialized("Radau discretization points"))?;
        self.path_functions.initialize(first_input)?;
        util.prepare_to_optimize(&self.path_functions, &dec)?;

        let num_alg = self.path_functions.num_alg_functions();
        if num_alg > 0 {
            let num_points = util.num_path_constraint_points();
            let d_ti = (0..num_points)
                .map(|idx| util.d_current_time_d_ti(idx))
                .collect::<Result<Vec<_>, _>>()?;
            let d_tf = (0..num_points)
                .map(|idx| util.d_current_time_d_tf(idx))
                .collect::<Result<Vec<_>, _>>()?;
            self.alg_path
                .initialize(self.path_functions.properties()?, &dec, num_alg, &d_ti, &d_tf)?;
        } else {
            self.alg_path = AlgPathFuncUtil::new();
        }

        self.decision_vector = Some(dec);
        self.evaluation = None;
        self.set_decision_vector_bounds()?;
        self.set_constraint_bounds();
        self.problem.set_num_total_con_nlp(self.con_lower_bound.len());

        let (rows, cols) = self.stacked_jacobian_pattern()?;
        self.scale_utility.initialize(
            self.problem.num_decision_vars_nlp(),
            self.problem.num_total_con_nlp(),
            rows,
            cols,
        )?;

        info!(
            num_mesh_intervals = self.problem.num_mesh_intervals(),
            num_decision_vars = self.problem.num_decision_vars_nlp(),
            num_constraints = self.problem.num_total_con_nlp(),
            num_defects = self.problem.num_defect_con_nlp(),
            "Initialized Radau phase"
        );
        Ok(())
    }

    /// Fills times, states, controls and static parameters of a fresh
    /// decision vector from the carried-over guesses or the problem.
    fn seed_guess(&self, dec: &mut DecisionVector) -> Result<(), TranscriptionError> {
        let (t0, tf) = self.time_guess.unwrap_or((
            self.problem
                .time_initial_guess()
                .unwrap_or(self.problem.time_lower_bound()),
            self.problem
                .time_final_guess()
                .unwrap_or(self.problem.time_upper_bound()),
        ));
        dec.set_time_vector(t0, tf);

        let shape = (dec.num_state_points(), dec.num_state_vars());
        match self.state_guess.as_ref().filter(|g| g.shape() == shape) {
            Some(guess) => dec.set_state_array(guess)?,
            None => {
                if let Some(guess) = &self.state_guess {
                    warn!(expected = ?shape, got = ?guess.shape(), "Ignoring state guess of the wrong shape");
                }
                dec.set_state_array(&self.linear_state_guess(shape)?)?;
            }
        }

        if dec.num_control_vars() > 0 {
            let shape = (dec.num_control_points(), dec.num_control_vars());
            match self.control_guess.as_ref().filter(|g| g.shape() == shape) {
                Some(guess) => dec.set_control_array(guess)?,
                None => {
                    if let Some(guess) = &self.control_guess {
                        warn!(expected = ?shape, got = ?guess.shape(), "Ignoring control guess of the wrong shape");
                    }
                    dec.set_control_array(&DMatrix::zeros(shape.0, shape.1))?;
                }
            }
        }

        if self.problem.has_static_vars() {
            let static_params = self
                .static_guess
                .clone()
                .unwrap_or_else(|| self.problem.static_vector());
            dec.set_static_vector(&static_params)?;
        }
        Ok(())
    }

    /// Straight line in normalized time from the initial to the final
    /// state guess.
    fn linear_state_guess(&self, shape: (usize, usize)) -> Result<DMatrix<f64>, TranscriptionError> {
        let x0 = self
            .problem
            .state_initial_guess()
            .cloned()
            .unwrap_or_else(|| DVector::zeros(shape.1));
        let xf = self.problem.state_final_guess().cloned().unwrap_or_else(|| x0.clone());
        let points = &self.radau.discretization()?.points;
        if points.len() != shape.0 {
            return Err(TranscriptionError::length("RadauPhase::linear_state_guess", shape.0, points.len()));
        }
        Ok(DMatrix::from_fn(shape.0, shape.1, |i, v| {
            let frac = (points[i] + 1.0) / 2.0;
            x0[v] + (xf[v] - x0[v]) * frac
        }))
    }

    fn set_decision_vector_bounds(&mut self) -> Result<(), TranscriptionError> {
        let dec = self.decision_vector()?;
        let n = dec.num_decision_params();
        let mut lower = DVector::from_element(n, f64::NEG_INFINITY);
        let mut upper = DVector::from_element(n, f64::INFINITY);

        for idx in dec.time_idxs() {
            lower[idx] = self.problem.time_lower_bound();
            upper[idx] = self.problem.time_upper_bound();
        }
        for point in 0..dec.num_state_points() {
            let idxs = dec.state_idxs_at_mesh_point(point, 0)?;
            lower.rows_mut(idxs.start, idxs.len()).copy_from(self.problem.state_lower_bound());
            upper.rows_mut(idxs.start, idxs.len()).copy_from(self.problem.state_upper_bound());
        }
        if dec.num_control_vars() > 0 {
            for point in 0..dec.num_control_points() {
                let idxs = dec.control_idxs_at_mesh_point(point, 0)?;
                lower.rows_mut(idxs.start, idxs.len()).copy_from(self.problem.control_lower_bound());
                upper.rows_mut(idxs.start, idxs.len()).copy_from(self.problem.control_upper_bound());
            }
        }
        let static_idxs = dec.static_idxs();
        if !static_idxs.is_empty() {
            lower
                .rows_mut(static_idxs.start, static_idxs.len())
                .copy_from(self.problem.static_lower_bound());
            upper
                .rows_mut(static_idxs.start, static_idxs.len())
                .copy_from(self.problem.static_upper_bound());
        }

        self.dec_lower_bound = lower;
        self.dec_upper_bound = upper;
        Ok(())
    }

    /// Defects are equalities at zero; algebraic path bounds are tiled
    /// over every path-constraint point.
    fn set_constraint_bounds(&mut self) {
        let num_defects = self.problem.num_defect_con_nlp();
        let num_points = self.radau.collocation_data().num_path_constraint_points();
        let (alg_lower, alg_upper) = self.path_functions.alg_bounds();
        let num_alg = if self.problem.has_alg_path_cons() {
            alg_lower.len()
        } else {
            0
        };
        let n = num_defects + num_alg * num_points;

        let mut lower = DVector::zeros(n);
        let mut upper = DVector::zeros(n);
        for point in 0..num_points {
            let start = num_defects + point * num_alg;
            for j in 0..num_alg {
                lower[start + j] = alg_lower[j];
                upper[start + j] = alg_upper[j];
            }
        }
        self.con_lower_bound = lower;
        self.con_upper_bound = upper;
    }

    /// Row and column indices of the `[cost; constraints]` Jacobian pattern.
    fn stacked_jacobian_pattern(&mut self) -> Result<(Vec<usize>, Vec<usize>), TranscriptionError> {
        let cost = self.cost_sparsity_pattern()?;
        let cons = self.constraint_sparsity_pattern()?;
        let stacked = stack_rows(&cost, &cons)?;
        let form = stacked.three_vector_form();
        Ok((form.rows, form.cols))
    }

    pub fn decision_vector(&self) -> Result<&DecisionVector, TranscriptionError> {
        self.decision_vector
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("RadauPhase"))
    }

    /// Installs a new NLP iterate and remaps the time vector to it.
    pub fn set_decision_vector(&mut self, values: &DVector<f64>) -> Result<(), TranscriptionError> {
        let dec = self
            .decision_vector
            .as_mut()
            .ok_or(TranscriptionError::NotInitialized("RadauPhase"))?;
        dec.set_decision_vector(values)?;
        let (t0, tf) = (dec.first_time(), dec.last_time());
        NlpFuncUtilRadau::new(&self.problem, &mut self.radau).set_time_vector(t0, tf)?;
        self.evaluation = None;
        Ok(())
    }

    /// Evaluates the user function at every discretization point and
    /// assembles the NLP functions. Cached until the iterate changes.
    fn evaluate(&mut self) -> Result<&NlpEvaluation, TranscriptionError> {
        if self.evaluation.is_none() {
            let dec = self
                .decision_vector
                .as_ref()
                .ok_or(TranscriptionError::NotInitialized("RadauPhase"))?;
            let mut util = NlpFuncUtilRadau::new(&self.problem, &mut self.radau);
            let func_data = util
                .func_input_data(dec)?
                .iter()
                .map(|input| self.path_functions.evaluate(input))
                .collect::<Result<Vec<_>, _>>()?;

            let (defects, defect_jac) = util.compute_defect_fun_and_jac(&func_data, dec)?;
            let (cost, cost_jac) = util.compute_cost_fun_and_jac(&func_data, dec)?;
            let (constraints, constraint_jac) = if self.alg_path.num_functions() > 0 {
                let (alg, alg_jac) = self.alg_path.compute_func_and_jac(&func_data, dec)?;
                (stack_vectors(&defects, &alg), stack_rows(&defect_jac, &alg_jac)?)
            } else {
                (defects, defect_jac)
            };
            debug!(cost, constraint_norm = constraints.norm(), "Evaluated NLP functions");
            self.evaluation = Some(NlpEvaluation {
                constraints,
                constraint_jac,
                cost,
                cost_jac,
            });
        }
        self.evaluation
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("NLP evaluation"))
    }

    /// Defect constraints followed by algebraic path constraints.
    pub fn constraint_vector(&mut self) -> Result<DVector<f64>, TranscriptionError> {
        Ok(self.evaluate()?.constraints.clone())
    }

    pub fn constraint_jacobian(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        Ok(self.evaluate()?.constraint_jac.clone())
    }

    pub fn cost_function(&mut self) -> Result<f64, TranscriptionError> {
        Ok(self.evaluate()?.cost)
    }

    pub fn cost_jacobian(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        Ok(self.evaluate()?.cost_jac.clone())
    }

    pub fn constraint_sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        let defects = NlpFuncUtilRadau::new(&self.problem, &mut self.radau).defect_sparsity_pattern()?;
        if self.alg_path.num_functions() > 0 {
            stack_rows(&defects, &self.alg_path.sparsity_pattern()?)
        } else {
            Ok(defects)
        }
    }

    pub fn cost_sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        NlpFuncUtilRadau::new(&self.problem, &mut self.radau).cost_sparsity_pattern()
    }

    /// Nonzeros of the constraint Jacobian plus the cost gradient.
    pub fn num_nlp_non_zeros(&mut self) -> Result<usize, TranscriptionError> {
        Ok(self.constraint_sparsity_pattern()?.nnz() + self.cost_sparsity_pattern()?.nnz())
    }

    pub fn num_constraints(&self) -> usize {
        self.con_lower_bound.len()
    }

    pub fn decision_vector_bounds(&self) -> (&DVector<f64>, &DVector<f64>) {
        (&self.dec_lower_bound, &self.dec_upper_bound)
    }

    pub fn constraint_bounds(&self) -> (&DVector<f64>, &DVector<f64>) {
        (&self.con_lower_bound, &self.con_upper_bound)
    }

    pub fn time_vector(&self) -> &DVector<f64> {
        self.radau.collocation_data().time_vector()
    }

    pub fn state_array(&self) -> Result<DMatrix<f64>, TranscriptionError> {
        self.decision_vector()?.state_array()
    }

    pub fn control_array(&self) -> Result<DMatrix<f64>, TranscriptionError> {
        self.decision_vector()?.control_array()
    }

    /// Estimates the discretization error of the current iterate. With
    /// `update`, a refined mesh replaces the current one and the phase is
    /// re-initialized with the interpolated solution as its guess.
    pub fn refine_mesh(&mut self, update: bool) -> Result<MeshRefinementResult, TranscriptionError> {
        let dec = self
            .decision_vector
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("RadauPhase"))?;
        let result = NlpFuncUtilRadau::new(&self.problem, &mut self.radau).refine_mesh(dec, &self.path_functions)?;
        info!(
            is_mesh_refined = result.is_mesh_refined,
            max_rel_error = result.max_rel_error(),
            num_intervals = result.new_mesh_interval_num_points.len(),
            "Estimated mesh error"
        );

        if result.is_mesh_refined && update {
            self.time_guess = Some((dec.first_time(), dec.last_time()));
            if self.problem.has_static_vars() {
                self.static_guess = Some(dec.static_vector());
            }
            self.state_guess = Some(result.new_state_guess.clone());
            self.control_guess = Some(result.new_control_guess.clone());
            self.problem
                .set_mesh_interval_fractions(result.new_mesh_interval_fractions.clone());
            self.problem
                .set_mesh_interval_num_points(result.new_mesh_interval_num_points.clone());
            self.initialize()?;
        }
        Ok(result)
    }

    /// Scales decision variables from their bounds and constraints from the
    /// Jacobian at the current iterate, with defect rows scaled like the
    /// state they constrain.
    pub fn configure_scaling(&mut self) -> Result<(), TranscriptionError> {
        for (idx, (&lower, &upper)) in self
            .dec_lower_bound
            .iter()
            .zip(self.dec_upper_bound.iter())
            .enumerate()
        {
            if !(lower.is_finite() && upper.is_finite() && upper > lower) {
                return Err(ConfigError::UnscalableBounds { idx, lower, upper }.into());
            }
        }
        self.scale_utility
            .set_dec_vec_scaling_bounds(&self.dec_upper_bound, &self.dec_lower_bound)?;

        let num_cons = self.num_constraints();
        let num_defects = self.problem.num_defect_con_nlp();
        let num_state = self.problem.num_state_vars().max(1);
        self.scale_utility
            .set_if_defect((0..num_cons).map(|i| i < num_defects).collect())?;
        self.scale_utility
            .set_which_state_var((0..num_cons).map(|i| i % num_state).collect())?;

        let jac = self.constraint_jacobian()?;
        self.scale_utility.set_constraint_scaling_defect_and_user(&jac)?;
        debug!(num_cons, num_defects, "Configured NLP scaling");
        Ok(())
    }

    pub fn print_mesh(&self) {
        println!("------- mesh -------");
        println!("  interval fractions: {:?}", self.problem.mesh_interval_fractions());
        println!("  points per interval: {:?}", self.problem.mesh_interval_num_points());
        println!("  time vector: {:?}", self.time_vector().as_slice());
    }

    pub fn print_bounds(&self) {
        println!("------- decision vector bounds -------");
        for (i, (l, u)) in self
            .dec_lower_bound
            .iter()
            .zip(self.dec_upper_bound.iter())
            .enumerate()
        {
            println!("  z[{i:>4}]: [{l:.6e}, {u:.6e}]");
        }
        println!("------- constraint bounds -------");
        for (i, (l, u)) in self
            .con_lower_bound
            .iter()
            .zip(self.con_upper_bound.iter())
            .enumerate()
        {
            println!("  c[{i:>4}]: [{l:.6e}, {u:.6e}]");
        }
    }

    pub fn print_decision_vector(&self) -> Result<(), TranscriptionError> {
        let dec = self.decision_vector()?;
        println!("------- decision vector -------");
        println!("  t0: {:.6e}, tf: {:.6e}", dec.first_time(), dec.last_time());
        println!("  states:\n{}", dec.state_array()?);
        if dec.num_control_vars() > 0 {
            println!("  controls:\n{}", dec.control_array()?);
        }
        if self.problem.has_static_vars() {
            println!("  static: {:?}", dec.static_vector().as_slice());
        }
        Ok(())
    }

    pub fn print_defect_constraints(&mut self) -> Result<(), TranscriptionError> {
        let num_defects = self.problem.num_defect_con_nlp();
        let num_state = self.problem.num_state_vars();
        let cons = self.constraint_vector()?;
        println!("------- defect constraints -------");
        for (point, chunk) in cons.as_slice()[..num_defects].chunks(num_state.max(1)).enumerate() {
            println!("  point {point:>3}: {chunk:?}");
        }
        println!(
            "  max |defect|: {:.6e}",
            cons.rows(0, num_defects).amax()
        );
        Ok(())
    }
}
