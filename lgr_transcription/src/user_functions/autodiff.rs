//! Exact path-function Jacobians through `ad_trait` forward-mode AD.
//!
//! A user writes the path function once, generic over `T: AD`; the adapter
//! flattens `[t, x, u, s]` into the input vector that a `FunctionEngine`
//! differentiates, and slices the resulting Jacobian back into the state,
//! control, time and static blocks.

use std::marker::PhantomData;

use ad_trait::{
    AD,
    differentiable_function::{DifferentiableFunctionTrait, ForwardAD},
    forward_ad::adfn::adfn,
    function_engine::FunctionEngine,
};
use anyhow::bail;
use nalgebra::DMatrix;

use crate::user_functions::{
    FunctionInputData, FunctionOutputData, JacobianType, PathFunction, PathFunctionContainer,
};

/// Sizes of an AD path function's inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathFunctionDims {
    pub num_state_vars: usize,
    pub num_control_vars: usize,
    pub num_static_vars: usize,
    pub num_alg_functions: usize,
    pub has_integral_cost: bool,
}

impl PathFunctionDims {
    fn num_inputs(&self) -> usize {
        1 + self.num_state_vars + self.num_control_vars + self.num_static_vars
    }

    fn num_outputs(&self) -> usize {
        self.num_state_vars + usize::from(self.has_integral_cost) + self.num_alg_functions
    }
}

/// Path-function values for one point.
#[derive(Debug, Clone)]
pub struct PathValues<T> {
    pub dynamics: Vec<T>,
    pub cost: Option<T>,
    pub algebraic: Vec<T>,
}

/// A path function written once for any AD scalar type.
pub trait AutoDiffPathFunction: Clone {
    const NAME: &'static str;

    fn dims(&self) -> PathFunctionDims;

    fn path_values<T: AD>(&self, time: T, state: &[T], control: &[T], static_params: &[T]) -> PathValues<T>;

    /// Lower and upper bounds of the algebraic path constraints.
    fn alg_bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        None
    }
}

/// Flattened form of an [`AutoDiffPathFunction`] for one scalar type.
#[derive(Clone)]
pub struct PathFnAdapter<F, T> {
    func: F,
    dims: PathFunctionDims,
    _scalar: PhantomData<T>,
}

impl<F: AutoDiffPathFunction, T: AD> PathFnAdapter<F, T> {
    pub fn new(func: F) -> Self {
        let dims = func.dims();
        Self {
            func,
            dims,
            _scalar: PhantomData,
        }
    }
}

impl<F: AutoDiffPathFunction, T: AD> DifferentiableFunctionTrait<T> for PathFnAdapter<F, T> {
    const NAME: &'static str = F::NAME;

    fn call(&self, inputs: &[T], _freeze: bool) -> Vec<T> {
        let d = &self.dims;
        let (time, rest) = inputs.split_at(1);
        let (state, rest) = rest.split_at(d.num_state_vars);
        let (control, static_params) = rest.split_at(d.num_control_vars);

        let values = self.func.path_values(time[0], state, control, static_params);

        let mut out = values.dynamics;
        out.extend(values.cost);
        out.extend(values.algebraic);
        out
    }

    fn num_inputs(&self) -> usize {
        self.dims.num_inputs()
    }

    fn num_outputs(&self) -> usize {
        self.dims.num_outputs()
    }
}

/// Adapts an [`AutoDiffPathFunction`] to [`PathFunction`], supplying exact
/// Jacobians for every variable group.
pub struct AutoDiffPath<F: AutoDiffPathFunction> {
    engine: FunctionEngine<PathFnAdapter<F, f64>, PathFnAdapter<F, adfn<1>>, ForwardAD>,
    func: F,
    dims: PathFunctionDims,
}

impl<F: AutoDiffPathFunction> AutoDiffPath<F> {
    pub fn new(func: F) -> Self {
        let engine = FunctionEngine::new(
            PathFnAdapter::new(func.clone()),
            PathFnAdapter::new(func.clone()),
            ForwardAD::new(),
        );
        Self {
            engine,
            dims: func.dims(),
            func,
        }
    }

    pub fn dims(&self) -> PathFunctionDims {
        self.dims
    }
}

impl<F: AutoDiffPathFunction> PathFunction for AutoDiffPath<F> {
    fn has_integral_cost(&self) -> bool {
        self.dims.has_integral_cost
    }

    fn num_alg_functions(&self) -> usize {
        self.dims.num_alg_functions
    }

    fn evaluate(&self, input: &FunctionInputData, out: &mut PathFunctionContainer) -> anyhow::Result<()> {
        let d = self.dims;
        if input.state.len() != d.num_state_vars
            || input.control.len() != d.num_control_vars
            || input.static_params.len() != d.num_static_vars
        {
            bail!(
                "{} expects (state, control, static) lengths ({}, {}, {}), got ({}, {}, {})",
                F::NAME,
                d.num_state_vars,
                d.num_control_vars,
                d.num_static_vars,
                input.state.len(),
                input.control.len(),
                input.static_params.len()
            );
        }

        let mut inputs = Vec::with_capacity(d.num_inputs());
        inputs.push(input.time);
        inputs.extend(input.state.iter());
        inputs.extend(input.control.iter());
        inputs.extend(input.static_params.iter());

        let (values, jac) = self.engine.derivative(&inputs);
        let values: Vec<f64> = values.iter().copied().collect();
        if values.len() != d.num_outputs() {
            bail!(
                "{} returned {} outputs, expected {}",
                F::NAME,
                values.len(),
                d.num_outputs()
            );
        }

        // column blocks of the flattened input
        let state_cols = 1..1 + d.num_state_vars;
        let control_cols = state_cols.end..state_cols.end + d.num_control_vars;
        let static_cols = control_cols.end..control_cols.end + d.num_static_vars;
        let blocks = [
            (JacobianType::Time, 0..1),
            (JacobianType::State, state_cols),
            (JacobianType::Control, control_cols),
            (JacobianType::Static, static_cols),
        ];

        let mut row = 0;
        let fill = |data: &mut FunctionOutputData, row: usize| -> anyhow::Result<()> {
            let n = data.num_functions();
            data.set_values(&values[row..row + n])?;
            for (ty, cols) in blocks.iter() {
                let sub: DMatrix<f64> = jac.view((row, cols.start), (n, cols.len())).into_owned();
                data.set_jacobian(*ty, sub)?;
            }
            Ok(())
        };

        fill(out.dyn_data_mut(), row)?;
        row += d.num_state_vars;
        if let Some(cost) = out.cost_data_mut() {
            fill(cost, row)?;
            row += 1;
        }
        if let Some(alg) = out.alg_data_mut() {
            fill(alg, row)?;
            if let Some((lower, upper)) = self.func.alg_bounds() {
                alg.set_bounds(&lower, &upper)?;
            }
        }
        Ok(())
    }
}
