use nalgebra::DVector;

use crate::error::ConfigError;

/// Default minimum gap between a lower and an upper bound.
pub const BOUND_TOLERANCE: f64 = 1.0e-5;

/// Shape metadata of one phase: variable counts, bounds, guesses and the
/// mesh. Owned by the phase and borrowed by the transcription, which only
/// writes the NLP counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemCharacteristics {
    num_state_vars: usize,
    num_control_vars: usize,
    num_integral_vars: usize,
    num_static_vars: usize,

    num_state_vars_nlp: usize,
    num_control_vars_nlp: usize,
    num_decision_vars_nlp: usize,
    num_defect_con_nlp: usize,
    num_total_con_nlp: usize,

    has_integral_cost: bool,
    has_alg_path_cons: bool,

    mesh_interval_fractions: Vec<f64>,
    mesh_interval_num_points: Vec<usize>,

    state_lower_bound: DVector<f64>,
    state_upper_bound: DVector<f64>,
    state_initial_guess: Option<DVector<f64>>,
    state_final_guess: Option<DVector<f64>>,

    control_lower_bound: DVector<f64>,
    control_upper_bound: DVector<f64>,

    time_lower_bound: f64,
    time_upper_bound: f64,
    time_initial_guess: Option<f64>,
    time_final_guess: Option<f64>,

    static_lower_bound: DVector<f64>,
    static_upper_bound: DVector<f64>,
    static_vector: Option<DVector<f64>>,

    bound_tolerance: f64,
}

impl Default for ProblemCharacteristics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemCharacteristics {
    pub fn new() -> Self {
        Self {
            num_state_vars: 0,
            num_control_vars: 0,
            num_integral_vars: 0,
            num_static_vars: 0,
            num_state_vars_nlp: 0,
            num_control_vars_nlp: 0,
            num_decision_vars_nlp: 0,
            num_defect_con_nlp: 0,
            num_total_con_nlp: 0,
            has_integral_cost: false,
            has_alg_path_cons: false,
            mesh_interval_fractions: Vec::new(),
            mesh_interval_num_points: Vec::new(),
            state_lower_bound: DVector::zeros(0),
            state_upper_bound: DVector::zeros(0),
            state_initial_guess: None,
            state_final_guess: None,
            control_lower_bound: DVector::zeros(0),
            control_upper_bound: DVector::zeros(0),
            time_lower_bound: 0.0,
            time_upper_bound: 0.0,
            time_initial_guess: None,
            time_final_guess: None,
            static_lower_bound: DVector::zeros(0),
            static_upper_bound: DVector::zeros(0),
            static_vector: None,
            bound_tolerance: BOUND_TOLERANCE,
        }
    }

    // ---- counts ----

    pub fn set_num_state_vars(&mut self, n: usize) {
        self.num_state_vars = n;
    }
    pub fn set_num_control_vars(&mut self, n: usize) {
        self.num_control_vars = n;
    }
    pub fn set_num_integral_vars(&mut self, n: usize) {
        self.num_integral_vars = n;
    }
    pub fn set_num_static_vars(&mut self, n: usize) {
        self.num_static_vars = n;
    }
    pub fn set_bound_tolerance(&mut self, tol: f64) {
        self.bound_tolerance = tol;
    }

    pub fn num_state_vars(&self) -> usize {
        self.num_state_vars
    }
    pub fn num_control_vars(&self) -> usize {
        self.num_control_vars
    }
    pub fn num_integral_vars(&self) -> usize {
        self.num_integral_vars
    }
    pub fn num_static_vars(&self) -> usize {
        self.num_static_vars
    }
    /// Initial and final time are always decision variables.
    pub fn num_time_vars_nlp(&self) -> usize {
        2
    }
    pub fn bound_tolerance(&self) -> f64 {
        self.bound_tolerance
    }

    pub fn has_state_vars(&self) -> bool {
        self.num_state_vars > 0
    }
    pub fn has_control_vars(&self) -> bool {
        self.num_control_vars > 0
    }
    pub fn has_integral_vars(&self) -> bool {
        self.num_integral_vars > 0
    }
    pub fn has_static_vars(&self) -> bool {
        self.num_static_vars > 0
    }
    pub fn has_defect_cons(&self) -> bool {
        self.has_state_vars()
    }

    pub fn set_has_integral_cost(&mut self, has_cost: bool) {
        self.has_integral_cost = has_cost;
    }
    pub fn has_integral_cost(&self) -> bool {
        self.has_integral_cost
    }
    pub fn set_has_alg_path_cons(&mut self, has_cons: bool) {
        self.has_alg_path_cons = has_cons;
    }
    pub fn has_alg_path_cons(&self) -> bool {
        self.has_alg_path_cons
    }

    // ---- NLP counts, written by the transcription ----

    pub fn set_num_state_vars_nlp(&mut self, n: usize) {
        self.num_state_vars_nlp = n;
    }
    pub fn set_num_control_vars_nlp(&mut self, n: usize) {
        self.num_control_vars_nlp = n;
    }
    pub fn set_num_decision_vars_nlp(&mut self, n: usize) {
        self.num_decision_vars_nlp = n;
    }
    pub fn set_num_defect_con_nlp(&mut self, n: usize) {
        self.num_defect_con_nlp = n;
    }
    pub fn set_num_total_con_nlp(&mut self, n: usize) {
        self.num_total_con_nlp = n;
    }
    pub fn num_state_vars_nlp(&self) -> usize {
        self.num_state_vars_nlp
    }
    pub fn num_control_vars_nlp(&self) -> usize {
        self.num_control_vars_nlp
    }
    pub fn num_decision_vars_nlp(&self) -> usize {
        self.num_decision_vars_nlp
    }
    pub fn num_defect_con_nlp(&self) -> usize {
        self.num_defect_con_nlp
    }
    pub fn num_total_con_nlp(&self) -> usize {
        self.num_total_con_nlp
    }

    // ---- mesh ----

    pub fn set_mesh_interval_fractions(&mut self, fractions: Vec<f64>) {
        self.mesh_interval_fractions = fractions;
    }
    pub fn set_mesh_interval_num_points(&mut self, num_points: Vec<usize>) {
        self.mesh_interval_num_points = num_points;
    }
    pub fn mesh_interval_fractions(&self) -> &[f64] {
        &self.mesh_interval_fractions
    }
    pub fn mesh_interval_num_points(&self) -> &[usize] {
        &self.mesh_interval_num_points
    }
    pub fn num_mesh_intervals(&self) -> usize {
        self.mesh_interval_num_points.len()
    }
    pub fn num_points_in_mesh_interval(&self, interval: usize) -> Option<usize> {
        self.mesh_interval_num_points.get(interval).copied()
    }
    pub fn mesh_interval_fraction(&self, idx: usize) -> Option<f64> {
        self.mesh_interval_fractions.get(idx).copied()
    }

    pub fn validate_mesh_config(&self) -> Result<(), ConfigError> {
        if self.mesh_interval_fractions.len() < 2 {
            return Err(ConfigError::MalformedMesh {
                fractions: self.mesh_interval_fractions.clone(),
            });
        }
        if self.mesh_interval_num_points.is_empty()
            || self.mesh_interval_num_points.len() + 1 != self.mesh_interval_fractions.len()
        {
            return Err(ConfigError::MeshLengthMismatch {
                num_fractions: self.mesh_interval_fractions.len(),
                num_intervals: self.mesh_interval_num_points.len(),
            });
        }
        Ok(())
    }

    // ---- state ----

    pub fn set_state_lower_bound(&mut self, bound: DVector<f64>) {
        self.state_lower_bound = bound;
    }
    pub fn set_state_upper_bound(&mut self, bound: DVector<f64>) {
        self.state_upper_bound = bound;
    }
    pub fn set_state_initial_guess(&mut self, guess: DVector<f64>) {
        self.state_initial_guess = Some(guess);
    }
    pub fn set_state_final_guess(&mut self, guess: DVector<f64>) {
        self.state_final_guess = Some(guess);
    }
    pub fn state_lower_bound(&self) -> &DVector<f64> {
        &self.state_lower_bound
    }
    pub fn state_upper_bound(&self) -> &DVector<f64> {
        &self.state_upper_bound
    }
    pub fn state_initial_guess(&self) -> Option<&DVector<f64>> {
        self.state_initial_guess.as_ref()
    }
    pub fn state_final_guess(&self) -> Option<&DVector<f64>> {
        self.state_final_guess.as_ref()
    }

    pub fn validate_state_properties(&self) -> Result<(), ConfigError> {
        let n = self.num_state_vars;
        check_len("state_lower_bound", n, self.state_lower_bound.len())?;
        check_len("state_upper_bound", n, self.state_upper_bound.len())?;
        if let Some(guess) = &self.state_initial_guess {
            check_len("state_initial_guess", n, guess.len())?;
            check_guess(
                "state_initial_guess",
                guess,
                &self.state_lower_bound,
                &self.state_upper_bound,
            )?;
        }
        if let Some(guess) = &self.state_final_guess {
            check_len("state_final_guess", n, guess.len())?;
            check_guess(
                "state_final_guess",
                guess,
                &self.state_lower_bound,
                &self.state_upper_bound,
            )?;
        }
        check_bound_gap(
            "state",
            &self.state_lower_bound,
            &self.state_upper_bound,
            self.bound_tolerance,
        )
    }

    // ---- control ----

    pub fn set_control_lower_bound(&mut self, bound: DVector<f64>) {
        self.control_lower_bound = bound;
    }
    pub fn set_control_upper_bound(&mut self, bound: DVector<f64>) {
        self.control_upper_bound = bound;
    }
    pub fn control_lower_bound(&self) -> &DVector<f64> {
        &self.control_lower_bound
    }
    pub fn control_upper_bound(&self) -> &DVector<f64> {
        &self.control_upper_bound
    }

    pub fn validate_control_properties(&self) -> Result<(), ConfigError> {
        let n = self.num_control_vars;
        check_len("control_lower_bound", n, self.control_lower_bound.len())?;
        check_len("control_upper_bound", n, self.control_upper_bound.len())?;
        check_bound_gap(
            "control",
            &self.control_lower_bound,
            &self.control_upper_bound,
            self.bound_tolerance,
        )
    }

    // ---- time ----

    pub fn set_time_lower_bound(&mut self, bound: f64) {
        self.time_lower_bound = bound;
    }
    pub fn set_time_upper_bound(&mut self, bound: f64) {
        self.time_upper_bound = bound;
    }
    pub fn set_time_initial_guess(&mut self, guess: f64) {
        self.time_initial_guess = Some(guess);
    }
    pub fn set_time_final_guess(&mut self, guess: f64) {
        self.time_final_guess = Some(guess);
    }
    pub fn time_lower_bound(&self) -> f64 {
        self.time_lower_bound
    }
    pub fn time_upper_bound(&self) -> f64 {
        self.time_upper_bound
    }
    pub fn time_initial_guess(&self) -> Option<f64> {
        self.time_initial_guess
    }
    pub fn time_final_guess(&self) -> Option<f64> {
        self.time_final_guess
    }

    pub fn validate_time_properties(&self) -> Result<(), ConfigError> {
        let lower = DVector::from_element(1, self.time_lower_bound);
        let upper = DVector::from_element(1, self.time_upper_bound);
        if let Some(t0) = self.time_initial_guess {
            check_guess("time_initial_guess", &DVector::from_element(1, t0), &lower, &upper)?;
        }
        if let Some(tf) = self.time_final_guess {
            check_guess("time_final_guess", &DVector::from_element(1, tf), &lower, &upper)?;
        }
        check_bound_gap("time", &lower, &upper, self.bound_tolerance)
    }

    // ---- static ----

    pub fn set_static_lower_bound(&mut self, bound: DVector<f64>) {
        self.static_lower_bound = bound;
    }
    pub fn set_static_upper_bound(&mut self, bound: DVector<f64>) {
        self.static_upper_bound = bound;
    }
    pub fn set_static_vector(&mut self, guess: DVector<f64>) {
        self.static_vector = Some(guess);
    }
    pub fn static_lower_bound(&self) -> &DVector<f64> {
        &self.static_lower_bound
    }
    pub fn static_upper_bound(&self) -> &DVector<f64> {
        &self.static_upper_bound
    }
    /// Current static parameters; zeros when no guess was given.
    pub fn static_vector(&self) -> DVector<f64> {
        self.static_vector
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.num_static_vars))
    }

    pub fn validate_static_properties(&self) -> Result<(), ConfigError> {
        if !self.has_static_vars() {
            return Ok(());
        }
        let n = self.num_static_vars;
        check_len("static_lower_bound", n, self.static_lower_bound.len())?;
        check_len("static_upper_bound", n, self.static_upper_bound.len())?;
        if let Some(guess) = &self.static_vector {
            check_len("static_vector", n, guess.len())?;
            check_guess(
                "static_vector",
                guess,
                &self.static_lower_bound,
                &self.static_upper_bound,
            )?;
        }
        check_bound_gap(
            "static",
            &self.static_lower_bound,
            &self.static_upper_bound,
            self.bound_tolerance,
        )
    }

    /// Runs every validation step.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_state_vars == 0 {
            return Err(ConfigError::NonPositiveCount {
                name: "num_state_vars",
                value: 0,
            });
        }
        self.validate_mesh_config()?;
        self.validate_state_properties()?;
        self.validate_control_properties()?;
        self.validate_time_properties()?;
        self.validate_static_properties()
    }
}

fn check_len(name: &'static str, expected: usize, got: usize) -> Result<(), ConfigError> {
    if expected != got {
        return Err(ConfigError::BoundLength {
            name,
            expected,
            got,
        });
    }
    Ok(())
}

fn check_guess(
    name: &'static str,
    guess: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
) -> Result<(), ConfigError> {
    for (idx, &g) in guess.iter().enumerate() {
        if g > upper[idx] || g < lower[idx] {
            return Err(ConfigError::GuessOutOfBounds {
                name,
                idx,
                guess: g,
                lower: lower[idx],
                upper: upper[idx],
            });
        }
    }
    Ok(())
}

fn check_bound_gap(
    name: &'static str,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    tol: f64,
) -> Result<(), ConfigError> {
    for (idx, (&lo, &up)) in lower.iter().zip(upper.iter()).enumerate() {
        if lo > up - tol {
            return Err(ConfigError::BoundsInverted {
                name,
                idx,
                lower: lo,
                upper: up,
                tol,
            });
        }
    }
    Ok(())
}
