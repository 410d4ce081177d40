//! Legendre-Gauss-Radau collocation.
//!
//! Defects at collocation point `i` of state `s`:
//!
//! `c = sum_j D[i, j] x_j[s] - (tf - t0) / 2 * f_s(t_i, x_i, u_i, p)`
//!
//! The differentiation-matrix term is linear in the decision vector and
//! lives in A; the dynamics term goes through `B Q` with `B = I`.

use std::borrow::Cow;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::{
    config::{TranscriptionConfig, validate_degree_range, MAX_POLYNOMIAL_DEGREE_UB, MIN_POLYNOMIAL_DEGREE_LB},
    decision_vector::DecisionVector,
    error::{ConfigError, TranscriptionError},
    interpolation::BaryLagrangeInterpolator,
    nlp_function_data::{MatrixNonZeros, NlpMatrix},
    problem_characteristics::ProblemCharacteristics,
    radau_math::{compute_multi_segment_lgr_nodes, compute_single_seg_lgr_nodes, LgrDiscretization},
    sparse::{BlockMode, SparseMatrix},
    transcription::{
        alg_path::{insert_pattern_rows, set_in_pattern, PointColumns},
        mesh_refinement::{
            collocation_integration_matrix, equal_sub_interval_bounds, interval_refinement,
            max_relative_error, IntervalRefinement,
        },
        CollocationData, MeshRefinementResult, NlpCounts, TranscriptionScheme,
    },
    user_functions::{
        manager::{PathFunctionManager, UserFunctionProperties},
        FunctionInputData, FunctionOutputData, JacobianType, PathFunctionContainer, PathOutput,
    },
};

/// Interpolators used to up-sample one interval of a given degree onto the
/// LGR points of the next degree.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeInterpolators {
    /// Abscissae: the interval's LGR points plus its end.
    pub state: BaryLagrangeInterpolator,
    /// Abscissae: the interval's LGR points only.
    pub control: BaryLagrangeInterpolator,
}

impl DegreeInterpolators {
    /// Both interpolators target the LGR points of degree `num_points + 1`,
    /// without the leading `-1`.
    pub fn build(num_points: usize, max_iters: usize) -> Result<Self, TranscriptionError> {
        let nodes = compute_single_seg_lgr_nodes(num_points, max_iters)?;
        let aug_nodes = compute_single_seg_lgr_nodes(num_points + 1, max_iters)?;
        let targets = &aug_nodes.points.as_slice()[1..=num_points];

        let state = BaryLagrangeInterpolator::new(nodes.points.as_slice())?.with_interp_points(targets)?;
        let control =
            BaryLagrangeInterpolator::new(&nodes.points.as_slice()[..num_points])?.with_interp_points(targets)?;
        Ok(Self { state, control })
    }
}

/// Every interval must have between 3 and 16 collocation points
/// (polynomial degree at most 15).
pub fn check_mesh_interval_num_points(num_points: &[usize]) -> Result<(), ConfigError> {
    for (interval, &n) in num_points.iter().enumerate() {
        if n < MIN_POLYNOMIAL_DEGREE_LB || n - 1 > MAX_POLYNOMIAL_DEGREE_UB {
            return Err(ConfigError::IntervalPointsOutOfRange {
                interval,
                num_points: n,
                min: MIN_POLYNOMIAL_DEGREE_LB,
                max: MAX_POLYNOMIAL_DEGREE_UB + 1,
            });
        }
    }
    Ok(())
}

/// Everything the Radau transcription owns. Lives in the phase; a
/// [`NlpFuncUtilRadau`] borrows it together with the problem.
#[derive(Debug, Clone)]
pub struct RadauState {
    coll: CollocationData,
    min_polynomial_degree: usize,
    max_polynomial_degree: usize,
    relative_error_tol: f64,
    lgr_max_iterations: usize,
    discretization: Option<LgrDiscretization>,
    /// Indexed by `degree - min_polynomial_degree`.
    interpolators: Vec<DegreeInterpolators>,
}

impl Default for RadauState {
    fn default() -> Self {
        Self::new(&TranscriptionConfig::default())
    }
}

impl RadauState {
    pub fn new(config: &TranscriptionConfig) -> Self {
        Self {
            coll: CollocationData::default(),
            min_polynomial_degree: config.min_polynomial_degree,
            max_polynomial_degree: config.max_polynomial_degree,
            relative_error_tol: config.relative_error_tol,
            lgr_max_iterations: config.lgr_max_iterations,
            discretization: None,
            interpolators: Vec::new(),
        }
    }

    /// Applies a validated config. Takes effect at the next initialize.
    pub fn configure(&mut self, config: &TranscriptionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.min_polynomial_degree = config.min_polynomial_degree;
        self.max_polynomial_degree = config.max_polynomial_degree;
        self.relative_error_tol = config.relative_error_tol;
        self.lgr_max_iterations = config.lgr_max_iterations;
        Ok(())
    }

    pub fn set_polynomial_degree_range(&mut self, min: usize, max: usize) -> Result<(), ConfigError> {
        validate_degree_range(min, max)?;
        self.min_polynomial_degree = min;
        self.max_polynomial_degree = max;
        Ok(())
    }

    pub fn polynomial_degree_range(&self) -> (usize, usize) {
        (self.min_polynomial_degree, self.max_polynomial_degree)
    }

    pub fn set_relative_error_tol(&mut self, tol: f64) -> Result<(), ConfigError> {
        if !(tol > 0.0 && tol.is_finite()) {
            return Err(ConfigError::BadTolerance {
                name: "relative_error_tol",
                value: tol,
            });
        }
        self.relative_error_tol = tol;
        Ok(())
    }

    pub fn relative_error_tol(&self) -> f64 {
        self.relative_error_tol
    }

    pub fn collocation_data(&self) -> &CollocationData {
        &self.coll
    }

    pub fn discretization(&self) -> Result<&LgrDiscretization, TranscriptionError> {
        self.discretization
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("Radau discretization"))
    }

    pub fn num_cached_interpolators(&self) -> usize {
        self.interpolators.len()
    }
}

/// Radau transcription of one phase. Built per call from the phase's
/// problem description and [`RadauState`].
pub struct NlpFuncUtilRadau<'a> {
    problem: &'a ProblemCharacteristics,
    state: &'a mut RadauState,
}

impl<'a> NlpFuncUtilRadau<'a> {
    pub fn new(problem: &'a ProblemCharacteristics, state: &'a mut RadauState) -> Self {
        Self { problem, state }
    }

    fn lgr_iters(&self) -> usize {
        self.state.lgr_max_iterations
    }

    /// dt/dt0 at point `idx`: `(1 - tau) / 2`.
    pub fn d_current_time_d_ti(&self, idx: usize) -> Result<f64, TranscriptionError> {
        let tau = self.point(idx)?;
        Ok((1.0 - tau) / 2.0)
    }

    /// dt/dtf at point `idx`: `(1 + tau) / 2`.
    pub fn d_current_time_d_tf(&self, idx: usize) -> Result<f64, TranscriptionError> {
        let tau = self.point(idx)?;
        Ok((1.0 + tau) / 2.0)
    }

    fn point(&self, idx: usize) -> Result<f64, TranscriptionError> {
        let points = &self.state.discretization()?.points;
        points.get(idx).copied().ok_or(TranscriptionError::IndexOutOfRange {
            context: "NlpFuncUtilRadau::point",
            row: idx,
            col: 0,
            nrows: points.len(),
            ncols: 1,
        })
    }

    fn init_state_and_control_interpolators(&mut self) -> Result<(), TranscriptionError> {
        let iters = self.lgr_iters();
        self.state.interpolators = (self.state.min_polynomial_degree..=self.state.max_polynomial_degree)
            .map(|degree| DegreeInterpolators::build(degree, iters))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Cached interpolators for `num_points`, or fresh ones when that
    /// degree is outside the configured range.
    fn interpolators_for(&self, num_points: usize) -> Result<Cow<'_, DegreeInterpolators>, TranscriptionError> {
        let cached = num_points
            .checked_sub(self.state.min_polynomial_degree)
            .and_then(|idx| self.state.interpolators.get(idx));
        match cached {
            Some(interp) => Ok(Cow::Borrowed(interp)),
            None => Ok(Cow::Owned(DegreeInterpolators::build(num_points, self.lgr_iters())?)),
        }
    }

    fn initialize_constant_defect_matrices(
        &mut self,
        props: &UserFunctionProperties,
        dec: &DecisionVector,
    ) -> Result<(), TranscriptionError> {
        let problem = self.problem;
        let num_state_vars = problem.num_state_vars();
        let num_mesh = self.state.coll.num_mesh_points;
        let disc = self
            .state
            .discretization
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("Radau discretization"))?;
        let data = &mut self.state.coll.defect_data;

        // A holds the differentiation matrix, replicated per state variable
        let mut con_idx = 0;
        let mut low_idx = 0;
        for &n in problem.mesh_interval_num_points() {
            for row in 0..n {
                for s in 0..num_state_vars {
                    for p in 0..=n {
                        let col = dec.state_idxs_at_mesh_point(low_idx + p, 0)?.start + s;
                        let value = disc.diff_matrix.get(low_idx + row, low_idx + p)?;
                        data.insert_element(NlpMatrix::A, con_idx, col, value, BlockMode::Replace)?;
                    }
                    data.insert_element(NlpMatrix::B, con_idx, con_idx, 1.0, BlockMode::Replace)?;
                    con_idx += 1;
                }
            }
            low_idx += n;
        }

        for func_idx in 0..num_mesh {
            let con_start = func_idx * num_state_vars;
            for r in 0..num_state_vars {
                data.insert_element(NlpMatrix::D, con_start + r, 0, 1.0, BlockMode::Replace)?;
                data.insert_element(NlpMatrix::D, con_start + r, 1, 1.0, BlockMode::Replace)?;
            }
            let cols = PointColumns::at(dec, func_idx)?;
            for ty in [JacobianType::State, JacobianType::Control, JacobianType::Static] {
                if let (Some(pattern), Some(range)) = (props.pattern(PathOutput::Dynamics, ty), cols.for_type(ty)) {
                    insert_pattern_rows(data, con_start, pattern, &range)?;
                }
            }
        }

        self.state.coll.defect_matrices_initialized = true;
        debug!(
            nnz = ?self.state.coll.defect_data.matrix_num_non_zeros(),
            "Built constant defect matrices"
        );
        Ok(())
    }

    fn initialize_constant_cost_matrices(
        &mut self,
        props: &UserFunctionProperties,
        dec: &DecisionVector,
    ) -> Result<(), TranscriptionError> {
        if !self.problem.has_integral_cost() {
            return Ok(());
        }
        let num_mesh = self.state.coll.num_mesh_points;
        let disc = self
            .state
            .discretization
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("Radau discretization"))?;
        let data = &mut self.state.coll.cost_data;

        for func_idx in 0..num_mesh {
            data.insert_element(NlpMatrix::B, 0, func_idx, -disc.weights[func_idx], BlockMode::Replace)?;
            data.insert_element(NlpMatrix::D, func_idx, 0, 1.0, BlockMode::Replace)?;
            data.insert_element(NlpMatrix::D, func_idx, 1, 1.0, BlockMode::Replace)?;
            let cols = PointColumns::at(dec, func_idx)?;
            for ty in [JacobianType::State, JacobianType::Control, JacobianType::Static] {
                if let (Some(pattern), Some(range)) = (props.pattern(PathOutput::Cost, ty), cols.for_type(ty)) {
                    insert_pattern_rows(data, func_idx, pattern, &range)?;
                }
            }
        }

        self.state.coll.cost_matrices_initialized = true;
        debug!(
            nnz = ?self.state.coll.cost_data.matrix_num_non_zeros(),
            "Built constant cost matrices"
        );
        Ok(())
    }

    /// Q and dQ/dz for `func_values` (one output per collocation point),
    /// laid out `rows_per_point` rows per point. Dynamics get scaled by
    /// `-(tf - t0) / 2`, with the chain rule through `t(tau)` in the two
    /// time columns.
    fn fill_dynamic_matrices(
        &self,
        outputs: &[&FunctionOutputData],
        dec: &DecisionVector,
        d_matrix: &SparseMatrix,
    ) -> Result<(DVector<f64>, SparseMatrix), TranscriptionError> {
        let dt_by_2 = 0.5 * (dec.last_time() - dec.first_time());
        let rows_per_point = outputs.first().map_or(0, |o| o.num_functions());
        let mut q = DVector::zeros(outputs.len() * rows_per_point);
        let mut par_q = d_matrix.sparsity_pattern(true);

        for (func_idx, out) in outputs.iter().enumerate() {
            let d_ti = self.d_current_time_d_ti(func_idx)?;
            let d_tf = self.d_current_time_d_tf(func_idx)?;
            let cols = PointColumns::at(dec, func_idx)?;
            let values = out.values();
            let jac_t = out.jacobian(JacobianType::Time)?;
            let con_start = func_idx * rows_per_point;

            for i in 0..rows_per_point {
                let row = con_start + i;
                q[row] = -dt_by_2 * values[i];
                set_in_pattern(&mut par_q, row, 0, 0.5 * values[i] - dt_by_2 * d_ti * jac_t[(i, 0)])?;
                set_in_pattern(&mut par_q, row, 1, -0.5 * values[i] - dt_by_2 * d_tf * jac_t[(i, 0)])?;

                for ty in [JacobianType::State, JacobianType::Control, JacobianType::Static] {
                    let Some(range) = cols.for_type(ty) else {
                        continue;
                    };
                    let jac = out.jacobian(ty)?;
                    for (c, col) in range.enumerate() {
                        let v = jac[(i, c)];
                        if v != 0.0 {
                            set_in_pattern(&mut par_q, row, col, -dt_by_2 * v)?;
                        }
                    }
                }
            }
        }
        Ok((q, par_q))
    }

    fn collocation_outputs<'f>(
        &self,
        func_data: &'f [PathFunctionContainer],
        which: PathOutput,
    ) -> Result<Vec<&'f FunctionOutputData>, TranscriptionError> {
        let num_mesh = self.state.coll.num_mesh_points;
        if func_data.len() < num_mesh {
            return Err(TranscriptionError::length(
                "NlpFuncUtilRadau function data",
                num_mesh,
                func_data.len(),
            ));
        }
        func_data[..num_mesh]
            .iter()
            .map(|c| {
                c.output(which)
                    .ok_or(TranscriptionError::NotInitialized("path function output"))
            })
            .collect()
    }

    /// States and controls of interval `interval`, one row per point.
    /// `has_final_state`/`has_final_control` include the interval end.
    pub fn state_and_control_in_mesh(
        &self,
        interval: usize,
        state_array: &DMatrix<f64>,
        control_array: &DMatrix<f64>,
        has_final_state: bool,
        has_final_control: bool,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>), TranscriptionError> {
        let nums = self.problem.mesh_interval_num_points();
        let n = *nums.get(interval).ok_or(TranscriptionError::IndexOutOfRange {
            context: "NlpFuncUtilRadau::state_and_control_in_mesh",
            row: interval,
            col: 0,
            nrows: nums.len(),
            ncols: 1,
        })?;
        let point_sum: usize = nums[..interval].iter().sum();

        let num_states = n + usize::from(has_final_state);
        let num_controls = n + usize::from(has_final_control);
        if point_sum + num_states > state_array.nrows() || point_sum + num_controls > control_array.nrows() {
            return Err(TranscriptionError::IndexOutOfRange {
                context: "NlpFuncUtilRadau::state_and_control_in_mesh",
                row: point_sum + num_controls.max(num_states),
                col: 0,
                nrows: control_array.nrows().min(state_array.nrows()),
                ncols: state_array.ncols(),
            });
        }
        Ok((
            state_array.rows(point_sum, num_states).into_owned(),
            control_array.rows(point_sum, num_controls).into_owned(),
        ))
    }

    /// Estimated max relative error of interval `interval`.
    ///
    /// The interval's state and control are interpolated onto the LGR
    /// points of one degree higher; the dynamics there are integrated with
    /// the inverse collocation matrix and compared against the
    /// interpolated state.
    pub fn max_rel_error_in_mesh(
        &self,
        interval: usize,
        dec: &DecisionVector,
        state_array: &DMatrix<f64>,
        control_array: &DMatrix<f64>,
        manager: &PathFunctionManager,
    ) -> Result<f64, TranscriptionError> {
        let fractions = self.problem.mesh_interval_fractions();
        let n = self.problem.mesh_interval_num_points()[interval];
        let (lo, hi) = (fractions[interval], fractions[interval + 1]);
        let (half_len, center) = (0.5 * (hi - lo), 0.5 * (hi + lo));
        let num_new = n + 1;

        // num_new LGR points of the interval plus its end
        let new_nodes = compute_single_seg_lgr_nodes(num_new, self.lgr_iters())?;
        let aug: Vec<f64> = new_nodes.points.iter().map(|x| half_len * x + center).collect();
        let (t0, tf) = (dec.first_time(), dec.last_time());
        let times: Vec<f64> = aug.iter().map(|x| (tf - t0) * (x + 1.0) / 2.0 + t0).collect();

        let (states, controls) = self.state_and_control_in_mesh(interval, state_array, control_array, true, false)?;
        let interps = self.interpolators_for(n)?;
        let state_interp = interps.state.interpolate_columns(&states)?;
        let control_interp = interps.control.interpolate_columns(&controls)?;

        let static_params = dec.static_vector();
        let num_state_vars = states.ncols();
        let mut dynamics = DMatrix::zeros(num_new, num_state_vars);
        for k in 0..num_new {
            let (x, u) = if k == 0 {
                (states.row(0).transpose(), controls.row(0).transpose())
            } else {
                (state_interp.row(k - 1).transpose(), control_interp.row(k - 1).transpose())
            };
            let input = FunctionInputData::new(times[k], x, u, static_params.clone());
            let out = manager.evaluate_values(&input)?;
            dynamics.set_row(k, &out.dyn_data().values().transpose());
        }

        let integration = collocation_integration_matrix(&aug)?;
        let integral = (integration * dynamics) * (0.5 * (tf - t0));

        // the last new node is the interval end, a decision-vector state
        let mut states_at_nodes = DMatrix::zeros(num_new, num_state_vars);
        states_at_nodes
            .rows_mut(0, num_new - 1)
            .copy_from(&state_interp.rows(0, num_new - 1));
        states_at_nodes.set_row(num_new - 1, &states.row(n));

        max_relative_error(&states.row(0).transpose(), &states_at_nodes, &integral)
    }
}

impl TranscriptionScheme for NlpFuncUtilRadau<'_> {
    fn initialize(&mut self) -> Result<NlpCounts, TranscriptionError> {
        let problem = self.problem;
        let fractions = problem.mesh_interval_fractions();
        let num_points = problem.mesh_interval_num_points();
        check_mesh_interval_num_points(num_points)?;

        let disc = compute_multi_segment_lgr_nodes(fractions, num_points, self.lgr_iters())?;
        let num_mesh = disc.num_collocation_points();

        let coll = &mut self.state.coll;
        coll.num_mesh_points = num_mesh;
        coll.num_state_points = num_mesh + 1;
        coll.num_control_points = num_mesh;
        coll.num_path_constraint_points = num_mesh;
        coll.time_vector = DVector::zeros(num_mesh + 1);
        coll.reset_matrices();
        self.state.discretization = Some(disc);

        self.init_state_and_control_interpolators()?;

        let num_state_vars_nlp = problem.num_state_vars() * (num_mesh + 1);
        let num_control_vars_nlp = problem.num_control_vars() * num_mesh;
        let counts = NlpCounts {
            num_state_vars_nlp,
            num_control_vars_nlp,
            num_decision_vars_nlp: num_state_vars_nlp
                + num_control_vars_nlp
                + problem.num_time_vars_nlp()
                + problem.num_static_vars(),
            num_defect_con_nlp: problem.num_state_vars() * num_mesh,
        };

        info!(
            intervals = num_points.len(),
            collocation_points = num_mesh,
            decision_vars = counts.num_decision_vars_nlp,
            defect_cons = counts.num_defect_con_nlp,
            "Initialized Radau transcription"
        );
        Ok(counts)
    }

    fn set_time_vector(&mut self, t0: f64, tf: f64) -> Result<(), TranscriptionError> {
        let delta_time = tf - t0;
        let points = self.state.discretization()?.points.clone();
        self.state.coll.time_vector = points.map(|tau| delta_time * (tau + 1.0) / 2.0 + t0);
        Ok(())
    }

    fn discretization_points(&self) -> Result<&DVector<f64>, TranscriptionError> {
        Ok(&self.state.discretization()?.points)
    }

    fn time_vector(&self) -> &DVector<f64> {
        &self.state.coll.time_vector
    }

    fn num_mesh_points(&self) -> usize {
        self.state.coll.num_mesh_points
    }

    fn num_state_points(&self) -> usize {
        self.state.coll.num_state_points
    }

    fn num_control_points(&self) -> usize {
        self.state.coll.num_control_points
    }

    fn num_path_constraint_points(&self) -> usize {
        self.state.coll.num_path_constraint_points
    }

    fn func_input_data(&self, dec: &DecisionVector) -> Result<Vec<FunctionInputData>, TranscriptionError> {
        let states = dec.state_array()?;
        let controls = dec.control_array()?;
        let static_params = dec.static_vector();
        let times = &self.state.coll.time_vector;
        if times.len() != states.nrows() {
            return Err(TranscriptionError::length(
                "NlpFuncUtilRadau::func_input_data time vector",
                states.nrows(),
                times.len(),
            ));
        }

        Ok((0..states.nrows())
            .map(|idx| {
                // no control at the terminal point; repeat the last one
                let control = match controls.nrows() {
                    0 => DVector::zeros(controls.ncols()),
                    rows => controls.row(idx.min(rows - 1)).transpose(),
                };
                FunctionInputData::new(times[idx], states.row(idx).transpose(), control, static_params.clone())
                    .at_point(idx)
            })
            .collect())
    }

    fn prepare_to_optimize(
        &mut self,
        manager: &PathFunctionManager,
        dec: &DecisionVector,
    ) -> Result<(), TranscriptionError> {
        let props = manager.properties()?;
        let num_dec = dec.num_decision_params();
        let num_defect = self.problem.num_state_vars() * self.state.coll.num_mesh_points;

        self.state.coll.reset_matrices();
        self.state.coll.defect_data.initialize(num_defect, num_dec, num_defect);
        self.state
            .coll
            .cost_data
            .initialize(1, num_dec, self.state.coll.num_mesh_points);

        self.initialize_constant_defect_matrices(props, dec)?;
        self.initialize_constant_cost_matrices(props, dec)
    }

    fn compute_defect_fun_and_jac(
        &mut self,
        func_data: &[PathFunctionContainer],
        dec: &DecisionVector,
    ) -> Result<(DVector<f64>, SparseMatrix), TranscriptionError> {
        if !self.state.coll.defect_matrices_initialized {
            return Err(TranscriptionError::NotInitialized("Radau defect matrices"));
        }
        let outputs = self.collocation_outputs(func_data, PathOutput::Dynamics)?;
        let data = &self.state.coll.defect_data;
        let (q, par_q) = self.fill_dynamic_matrices(&outputs, dec, data.d_matrix())?;
        let values = data.compute_functions(&q, dec.decision_vector())?;
        let jac = data.compute_jacobian(&par_q)?;
        Ok((values, jac))
    }

    fn compute_cost_fun_and_jac(
        &mut self,
        func_data: &[PathFunctionContainer],
        dec: &DecisionVector,
    ) -> Result<(f64, SparseMatrix), TranscriptionError> {
        if !self.problem.has_integral_cost() {
            return Ok((0.0, SparseMatrix::new(1, dec.num_decision_params())));
        }
        if !self.state.coll.cost_matrices_initialized {
            return Err(TranscriptionError::NotInitialized("Radau cost matrices"));
        }
        let outputs = self.collocation_outputs(func_data, PathOutput::Cost)?;
        let data = &self.state.coll.cost_data;
        let (q, par_q) = self.fill_dynamic_matrices(&outputs, dec, data.d_matrix())?;
        let values = data.compute_functions_b_only(&q)?;
        let jac = data.compute_jacobian(&par_q)?;
        Ok((values[0], jac))
    }

    fn defect_sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        self.state.coll.defect_data.compute_jac_sparsity_pattern().cloned()
    }

    fn cost_sparsity_pattern(&mut self) -> Result<SparseMatrix, TranscriptionError> {
        self.state.coll.cost_data.compute_jac_sparsity_pattern().cloned()
    }

    fn defect_matrix_num_non_zeros(&self) -> MatrixNonZeros {
        self.state.coll.defect_data.matrix_num_non_zeros()
    }

    fn cost_matrix_num_non_zeros(&self) -> MatrixNonZeros {
        self.state.coll.cost_data.matrix_num_non_zeros()
    }

    fn refine_mesh(
        &mut self,
        dec: &DecisionVector,
        manager: &PathFunctionManager,
    ) -> Result<MeshRefinementResult, TranscriptionError> {
        let problem = self.problem;
        let fractions = problem.mesh_interval_fractions();
        let num_points = problem.mesh_interval_num_points();
        let (min_degree, max_degree) = self.state.polynomial_degree_range();
        let tol = self.state.relative_error_tol;
        let iters = self.lgr_iters();

        let state_array = dec.state_array()?;
        let control_array = dec.control_array()?;

        let mut new_fractions = vec![fractions[0]];
        let mut new_num_points = Vec::new();
        let mut max_rel_errors = Vec::with_capacity(num_points.len());
        let mut state_rows: Vec<DMatrix<f64>> = Vec::new();
        let mut control_rows: Vec<DMatrix<f64>> = Vec::new();
        let mut is_mesh_refined = false;

        for (interval, &n) in num_points.iter().enumerate() {
            let err = self.max_rel_error_in_mesh(interval, dec, &state_array, &control_array, manager)?;
            max_rel_errors.push(err);

            let (lo, hi) = (fractions[interval], fractions[interval + 1]);
            let (states, controls) = self.state_and_control_in_mesh(interval, &state_array, &control_array, false, false)?;

            let decision = interval_refinement(err, tol, n, min_degree, max_degree);
            debug!(interval, max_rel_error = err, ?decision, "Mesh interval error estimate");

            // normalized sub-interval fractions and degrees inside [-1, 1]
            let (norm_fractions, sub_degrees) = match decision {
                IntervalRefinement::Unchanged => {
                    new_fractions.push(hi);
                    new_num_points.push(n);
                    state_rows.push(states);
                    control_rows.push(controls);
                    continue;
                }
                IntervalRefinement::Raised { num_points } => {
                    new_fractions.push(hi);
                    (vec![-1.0, 1.0], vec![num_points])
                }
                IntervalRefinement::Subdivided {
                    num_sub_intervals,
                    num_points,
                } => {
                    new_fractions.extend(equal_sub_interval_bounds(lo, hi, num_sub_intervals));
                    let mut norm = vec![-1.0];
                    norm.extend(equal_sub_interval_bounds(-1.0, 1.0, num_sub_intervals));
                    (norm, vec![num_points; num_sub_intervals])
                }
            };
            is_mesh_refined = true;
            new_num_points.extend(sub_degrees.iter().copied());

            let new_disc = compute_multi_segment_lgr_nodes(&norm_fractions, &sub_degrees, iters)?;
            let total = new_disc.num_collocation_points();
            let old_nodes = compute_single_seg_lgr_nodes(n, iters)?;
            let targets = &new_disc.points.as_slice()[1..total];
            let interp = BaryLagrangeInterpolator::new(&old_nodes.points.as_slice()[..n])?.with_interp_points(targets)?;

            let mut new_states = DMatrix::zeros(total, states.ncols());
            new_states.set_row(0, &states.row(0));
            new_states
                .rows_mut(1, total - 1)
                .copy_from(&interp.interpolate_columns(&states)?);
            let mut new_controls = DMatrix::zeros(total, controls.ncols());
            if controls.ncols() > 0 {
                new_controls.set_row(0, &controls.row(0));
                new_controls
                    .rows_mut(1, total - 1)
                    .copy_from(&interp.interpolate_columns(&controls)?);
            }
            state_rows.push(new_states);
            control_rows.push(new_controls);
        }

        let total_new: usize = new_num_points.iter().sum();
        let num_state_vars = state_array.ncols();
        let mut new_state_guess = DMatrix::zeros(total_new + 1, num_state_vars);
        let mut new_control_guess = DMatrix::zeros(total_new, control_array.ncols());
        let mut row = 0;
        for (states, controls) in state_rows.iter().zip(control_rows.iter()) {
            new_state_guess.rows_mut(row, states.nrows()).copy_from(states);
            new_control_guess
                .rows_mut(row, controls.nrows())
                .copy_from(controls);
            row += states.nrows();
        }
        new_state_guess.set_row(total_new, &dec.last_state_vector()?.transpose());

        let result = MeshRefinementResult {
            is_mesh_refined,
            new_mesh_interval_fractions: new_fractions,
            new_mesh_interval_num_points: new_num_points,
            max_rel_error_array: max_rel_errors,
            new_state_guess,
            new_control_guess,
        };
        info!(
            refined = result.is_mesh_refined,
            max_rel_error = result.max_rel_error(),
            new_intervals = result.new_mesh_interval_num_points.len(),
            "Mesh refinement pass"
        );
        Ok(result)
    }
}
