//! Boundary between the transcription and user-supplied path functions
//! (dynamics, integral cost and algebraic path constraints).

use nalgebra::{DMatrix, DVector};

use crate::error::TranscriptionError;

pub mod autodiff;
pub mod manager;

/// Variable group a Jacobian is taken with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JacobianType {
    State,
    Control,
    Time,
    Static,
}

impl JacobianType {
    pub const ALL: [JacobianType; 4] = [
        JacobianType::State,
        JacobianType::Control,
        JacobianType::Time,
        JacobianType::Static,
    ];

    fn slot(self) -> usize {
        match self {
            JacobianType::State => 0,
            JacobianType::Control => 1,
            JacobianType::Time => 2,
            JacobianType::Static => 3,
        }
    }
}

/// Which of the path-function outputs a [`FunctionOutputData`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutput {
    Dynamics,
    Cost,
    Algebraic,
}

/// Where a path function is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInputData {
    pub time: f64,
    pub state: DVector<f64>,
    pub control: DVector<f64>,
    pub static_params: DVector<f64>,
    /// Discretization point index; `None` for off-mesh evaluation.
    pub point_idx: Option<usize>,
}

impl FunctionInputData {
    pub fn new(time: f64, state: DVector<f64>, control: DVector<f64>, static_params: DVector<f64>) -> Self {
        Self {
            time,
            state,
            control,
            static_params,
            point_idx: None,
        }
    }

    pub fn at_point(mut self, point_idx: usize) -> Self {
        self.point_idx = Some(point_idx);
        self
    }

    pub fn num_vars(&self, ty: JacobianType) -> usize {
        match ty {
            JacobianType::State => self.state.len(),
            JacobianType::Control => self.control.len(),
            JacobianType::Time => 1,
            JacobianType::Static => self.static_params.len(),
        }
    }

    pub fn var(&self, ty: JacobianType, idx: usize) -> f64 {
        match ty {
            JacobianType::State => self.state[idx],
            JacobianType::Control => self.control[idx],
            JacobianType::Time => self.time,
            JacobianType::Static => self.static_params[idx],
        }
    }

    /// Copy with variable `idx` of group `ty` shifted by `delta`.
    pub fn perturbed(&self, ty: JacobianType, idx: usize, delta: f64) -> Self {
        let mut out = self.clone();
        match ty {
            JacobianType::State => out.state[idx] += delta,
            JacobianType::Control => out.control[idx] += delta,
            JacobianType::Time => out.time += delta,
            JacobianType::Static => out.static_params[idx] += delta,
        }
        out
    }
}

/// Values, bounds and Jacobians of one group of path functions at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionOutputData {
    num_functions: usize,
    /// Column counts for state, control, time and static Jacobians.
    num_vars: [usize; 4],
    values: DVector<f64>,
    lower_bounds: Option<DVector<f64>>,
    upper_bounds: Option<DVector<f64>>,
    names: Vec<String>,
    jacobians: [Option<DMatrix<f64>>; 4],
}

impl FunctionOutputData {
    pub fn new(num_functions: usize, num_state: usize, num_control: usize, num_static: usize) -> Self {
        Self {
            num_functions,
            num_vars: [num_state, num_control, 1, num_static],
            values: DVector::zeros(num_functions),
            lower_bounds: None,
            upper_bounds: None,
            names: Vec::new(),
            jacobians: [None, None, None, None],
        }
    }

    pub fn num_functions(&self) -> usize {
        self.num_functions
    }

    pub fn num_vars(&self, ty: JacobianType) -> usize {
        self.num_vars[ty.slot()]
    }

    pub fn set_values(&mut self, values: &[f64]) -> Result<(), TranscriptionError> {
        if values.len() != self.num_functions {
            return Err(TranscriptionError::length(
                "FunctionOutputData::set_values",
                self.num_functions,
                values.len(),
            ));
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn set_bounds(&mut self, lower: &[f64], upper: &[f64]) -> Result<(), TranscriptionError> {
        for (context, b) in [
            ("FunctionOutputData::set_bounds lower", lower),
            ("FunctionOutputData::set_bounds upper", upper),
        ] {
            if b.len() != self.num_functions {
                return Err(TranscriptionError::length(context, self.num_functions, b.len()));
            }
        }
        self.lower_bounds = Some(DVector::from_column_slice(lower));
        self.upper_bounds = Some(DVector::from_column_slice(upper));
        Ok(())
    }

    pub fn bounds_set(&self) -> bool {
        self.lower_bounds.is_some() && self.upper_bounds.is_some()
    }

    pub fn lower_bounds(&self) -> Option<&DVector<f64>> {
        self.lower_bounds.as_ref()
    }

    pub fn upper_bounds(&self) -> Option<&DVector<f64>> {
        self.upper_bounds.as_ref()
    }

    pub fn set_names(&mut self, names: Vec<String>) {
        self.names = names;
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Stores a `num_functions x num_vars(ty)` Jacobian.
    pub fn set_jacobian(&mut self, ty: JacobianType, jac: DMatrix<f64>) -> Result<(), TranscriptionError> {
        let expected = (self.num_functions, self.num_vars(ty));
        if jac.shape() != expected {
            return Err(TranscriptionError::shape(
                "FunctionOutputData::set_jacobian",
                expected,
                jac.shape(),
            ));
        }
        self.jacobians[ty.slot()] = Some(jac);
        Ok(())
    }

    pub fn has_jacobian(&self, ty: JacobianType) -> bool {
        self.jacobians[ty.slot()].is_some()
    }

    pub fn jacobian(&self, ty: JacobianType) -> Result<&DMatrix<f64>, TranscriptionError> {
        self.jacobians[ty.slot()]
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("FunctionOutputData jacobian"))
    }

    /// Drops every stored Jacobian.
    pub fn clear_jacobians(&mut self) {
        self.jacobians = [None, None, None, None];
    }
}

/// Output of one path-function evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PathFunctionContainer {
    dynamics: FunctionOutputData,
    cost: Option<FunctionOutputData>,
    algebraic: Option<FunctionOutputData>,
}

impl PathFunctionContainer {
    pub fn new(
        num_state: usize,
        num_control: usize,
        num_static: usize,
        has_integral_cost: bool,
        num_alg_functions: usize,
    ) -> Self {
        Self {
            dynamics: FunctionOutputData::new(num_state, num_state, num_control, num_static),
            cost: has_integral_cost
                .then(|| FunctionOutputData::new(1, num_state, num_control, num_static)),
            algebraic: (num_alg_functions > 0).then(|| {
                FunctionOutputData::new(num_alg_functions, num_state, num_control, num_static)
            }),
        }
    }

    pub fn dyn_data(&self) -> &FunctionOutputData {
        &self.dynamics
    }
    pub fn dyn_data_mut(&mut self) -> &mut FunctionOutputData {
        &mut self.dynamics
    }
    pub fn cost_data(&self) -> Option<&FunctionOutputData> {
        self.cost.as_ref()
    }
    pub fn cost_data_mut(&mut self) -> Option<&mut FunctionOutputData> {
        self.cost.as_mut()
    }
    pub fn alg_data(&self) -> Option<&FunctionOutputData> {
        self.algebraic.as_ref()
    }
    pub fn alg_data_mut(&mut self) -> Option<&mut FunctionOutputData> {
        self.algebraic.as_mut()
    }

    pub fn output(&self, which: PathOutput) -> Option<&FunctionOutputData> {
        match which {
            PathOutput::Dynamics => Some(&self.dynamics),
            PathOutput::Cost => self.cost.as_ref(),
            PathOutput::Algebraic => self.algebraic.as_ref(),
        }
    }

    pub fn output_mut(&mut self, which: PathOutput) -> Option<&mut FunctionOutputData> {
        match which {
            PathOutput::Dynamics => Some(&mut self.dynamics),
            PathOutput::Cost => self.cost.as_mut(),
            PathOutput::Algebraic => self.algebraic.as_mut(),
        }
    }

    pub fn has_integral_cost(&self) -> bool {
        self.cost.is_some()
    }

    pub fn num_alg_functions(&self) -> usize {
        self.algebraic.as_ref().map_or(0, |a| a.num_functions())
    }
}

/// A user path function.
///
/// `evaluate` fills values (and, optionally, Jacobians) into the container.
/// Jacobians left unset are computed by central finite differences.
pub trait PathFunction {
    fn has_integral_cost(&self) -> bool;

    fn num_alg_functions(&self) -> usize {
        0
    }

    fn evaluate(&self, input: &FunctionInputData, out: &mut PathFunctionContainer) -> anyhow::Result<()>;
}

/// A boundary (point) function: residuals on the initial and final time
/// and state, used to close the collocation system for a feasibility solve.
pub trait BoundaryFunction {
    fn num_functions(&self) -> usize;

    /// Residuals at `(t0, x(t0), tf, x(tf), static)`.
    fn evaluate(
        &self,
        t0: f64,
        initial_state: &DVector<f64>,
        tf: f64,
        final_state: &DVector<f64>,
        static_params: &DVector<f64>,
    ) -> anyhow::Result<DVector<f64>>;
}
