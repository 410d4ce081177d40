use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::{
    error::TranscriptionError,
    problem_characteristics::ProblemCharacteristics,
    sparse::SparseMatrix,
    user_functions::{
        FunctionInputData, JacobianType, PathFunction, PathFunctionContainer, PathOutput,
    },
};

/// Relative central-difference step; the absolute step is this times
/// `max(1, |x|)`.
pub const FINITE_DIFF_STEP: f64 = 1.0e-7;

const OUTPUTS: [PathOutput; 3] = [PathOutput::Dynamics, PathOutput::Cost, PathOutput::Algebraic];

/// Jacobian sparsity of every path output with respect to every variable
/// group, discovered by probing the user function.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFunctionProperties {
    /// Indexed `[output][jacobian type]`; `None` when the output is absent.
    patterns: [[Option<SparseMatrix>; 4]; 3],
}

fn output_slot(which: PathOutput) -> usize {
    match which {
        PathOutput::Dynamics => 0,
        PathOutput::Cost => 1,
        PathOutput::Algebraic => 2,
    }
}

fn type_slot(ty: JacobianType) -> usize {
    match ty {
        JacobianType::State => 0,
        JacobianType::Control => 1,
        JacobianType::Time => 2,
        JacobianType::Static => 3,
    }
}

impl UserFunctionProperties {
    /// Union of the nonzero structure of every sample's Jacobians.
    pub fn from_samples(samples: &[PathFunctionContainer]) -> Result<Self, TranscriptionError> {
        let mut patterns: [[Option<SparseMatrix>; 4]; 3] = Default::default();
        for sample in samples {
            for which in OUTPUTS {
                let Some(data) = sample.output(which) else {
                    continue;
                };
                for ty in JacobianType::ALL {
                    let jac = data.jacobian(ty)?;
                    let pattern = patterns[output_slot(which)][type_slot(ty)]
                        .get_or_insert_with(|| SparseMatrix::new(jac.nrows(), jac.ncols()));
                    for c in 0..jac.ncols() {
                        for r in 0..jac.nrows() {
                            if jac[(r, c)] != 0.0 {
                                pattern.set(r, c, 1.0)?;
                            }
                        }
                    }
                }
            }
        }
        Ok(Self { patterns })
    }

    pub fn pattern(&self, which: PathOutput, ty: JacobianType) -> Option<&SparseMatrix> {
        self.patterns[output_slot(which)][type_slot(ty)].as_ref()
    }
}

/// Owns the user path function and evaluates it for the transcription.
pub struct PathFunctionManager {
    func: Box<dyn PathFunction>,
    num_state_vars: usize,
    num_control_vars: usize,
    num_static_vars: usize,
    num_alg_functions: usize,
    has_integral_cost: bool,
    properties: Option<UserFunctionProperties>,
    alg_lower_bounds: DVector<f64>,
    alg_upper_bounds: DVector<f64>,
}

impl std::fmt::Debug for PathFunctionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathFunctionManager")
            .field("num_state_vars", &self.num_state_vars)
            .field("num_control_vars", &self.num_control_vars)
            .field("num_static_vars", &self.num_static_vars)
            .field("num_alg_functions", &self.num_alg_functions)
            .field("has_integral_cost", &self.has_integral_cost)
            .finish_non_exhaustive()
    }
}

impl PathFunctionManager {
    pub fn new(func: Box<dyn PathFunction>, problem: &ProblemCharacteristics) -> Self {
        let num_alg_functions = func.num_alg_functions();
        let has_integral_cost = func.has_integral_cost();
        Self {
            func,
            num_state_vars: problem.num_state_vars(),
            num_control_vars: problem.num_control_vars(),
            num_static_vars: problem.num_static_vars(),
            num_alg_functions,
            has_integral_cost,
            properties: None,
            alg_lower_bounds: DVector::zeros(num_alg_functions),
            alg_upper_bounds: DVector::zeros(num_alg_functions),
        }
    }

    pub fn has_integral_cost(&self) -> bool {
        self.has_integral_cost
    }

    pub fn num_alg_functions(&self) -> usize {
        self.num_alg_functions
    }

    pub fn alg_bounds(&self) -> (&DVector<f64>, &DVector<f64>) {
        (&self.alg_lower_bounds, &self.alg_upper_bounds)
    }

    pub fn properties(&self) -> Result<&UserFunctionProperties, TranscriptionError> {
        self.properties
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("PathFunctionManager"))
    }

    fn empty_container(&self) -> PathFunctionContainer {
        PathFunctionContainer::new(
            self.num_state_vars,
            self.num_control_vars,
            self.num_static_vars,
            self.has_integral_cost,
            self.num_alg_functions,
        )
    }

    /// Evaluates the function at `guess` and at a perturbed copy to discover
    /// Jacobian sparsity, and reads the algebraic path-constraint bounds.
    pub fn initialize(&mut self, guess: &FunctionInputData) -> Result<(), TranscriptionError> {
        let first = self.evaluate(guess)?;

        let mut shifted = guess.clone();
        shifted.time += 1.0e-3 * guess.time.abs().max(1.0);
        for x in shifted
            .state
            .iter_mut()
            .chain(shifted.control.iter_mut())
            .chain(shifted.static_params.iter_mut())
        {
            *x += 1.0e-3 * x.abs().max(1.0);
        }
        let second = self.evaluate(&shifted)?;

        if let Some(alg) = first.alg_data() {
            if let (Some(lo), Some(up)) = (alg.lower_bounds(), alg.upper_bounds()) {
                self.alg_lower_bounds = lo.clone();
                self.alg_upper_bounds = up.clone();
            }
        }

        let properties = UserFunctionProperties::from_samples(&[first, second])?;
        debug!(
            dyn_state_nnz = properties
                .pattern(PathOutput::Dynamics, JacobianType::State)
                .map_or(0, |p| p.nnz()),
            has_cost = self.has_integral_cost,
            num_alg = self.num_alg_functions,
            "Discovered path function sparsity"
        );
        self.properties = Some(properties);
        Ok(())
    }

    /// Evaluates values only, plus whatever Jacobians the function sets
    /// itself. Used off-mesh during error estimation.
    pub fn evaluate_values(&self, input: &FunctionInputData) -> Result<PathFunctionContainer, TranscriptionError> {
        let mut out = self.empty_container();
        self.func
            .evaluate(input, &mut out)
            .map_err(|source| TranscriptionError::UserFunction {
                context: match input.point_idx {
                    Some(idx) => format!("path function at point {idx} (t = {})", input.time),
                    None => format!("off-mesh path function at t = {}", input.time),
                },
                source,
            })?;
        Ok(out)
    }

    /// Evaluates the function and completes every Jacobian it did not set
    /// with central finite differences.
    pub fn evaluate(&self, input: &FunctionInputData) -> Result<PathFunctionContainer, TranscriptionError> {
        let mut out = self.evaluate_values(input)?;
        self.fill_missing_jacobians(input, &mut out)?;
        Ok(out)
    }

    fn fill_missing_jacobians(
        &self,
        input: &FunctionInputData,
        out: &mut PathFunctionContainer,
    ) -> Result<(), TranscriptionError> {
        for ty in JacobianType::ALL {
            let missing: Vec<PathOutput> = OUTPUTS
                .into_iter()
                .filter(|&w| out.output(w).is_some_and(|d| !d.has_jacobian(ty)))
                .collect();
            if missing.is_empty() {
                continue;
            }
            let n = input.num_vars(ty);
            let mut jacs: Vec<DMatrix<f64>> = missing
                .iter()
                .map(|&w| DMatrix::zeros(out.output(w).map_or(0, |d| d.num_functions()), n))
                .collect();

            for j in 0..n {
                let h = FINITE_DIFF_STEP * input.var(ty, j).abs().max(1.0);
                let plus = self.evaluate_values(&input.perturbed(ty, j, h))?;
                let minus = self.evaluate_values(&input.perturbed(ty, j, -h))?;
                for (jac, &w) in jacs.iter_mut().zip(&missing) {
                    if let (Some(p), Some(m)) = (plus.output(w), minus.output(w)) {
                        let col = (p.values() - m.values()) / (2.0 * h);
                        jac.set_column(j, &col);
                    }
                }
            }

            for (jac, w) in jacs.into_iter().zip(missing) {
                if let Some(data) = out.output_mut(w) {
                    data.set_jacobian(ty, jac)?;
                }
            }
        }
        Ok(())
    }
}
