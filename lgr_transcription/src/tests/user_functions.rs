use ad_trait::AD;
use nalgebra::{DMatrix, DVector, dmatrix};
use pretty_assertions::assert_eq;

use super::fixtures::decay_problem;
use crate::{assert_approx_eq, prelude::*};

/// Two states, one control, one static parameter:
/// `x0' = x1`, `x1' = -x0 + u * x1`, cost `x0^2 + u^2`, alg `x0 + s * t`.
#[derive(Clone)]
struct Oscillator;

impl AutoDiffPathFunction for Oscillator {
    const NAME: &'static str = "Oscillator";

    fn dims(&self) -> PathFunctionDims {
        PathFunctionDims {
            num_state_vars: 2,
            num_control_vars: 1,
            num_static_vars: 1,
            num_alg_functions: 1,
            has_integral_cost: true,
        }
    }

    fn path_values<T: AD>(&self, time: T, state: &[T], control: &[T], static_params: &[T]) -> PathValues<T> {
        PathValues {
            dynamics: vec![state[1], -state[0] + control[0] * state[1]],
            cost: Some(state[0] * state[0] + control[0] * control[0]),
            algebraic: vec![state[0] + static_params[0] * time],
        }
    }

    fn alg_bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        Some((vec![-1.0], vec![T_ALG_UPPER]))
    }
}

const T_ALG_UPPER: f64 = 3.0;

/// Same functions as [`Oscillator`] with values only, so every Jacobian is
/// differenced.
struct PlainOscillator;

impl PathFunction for PlainOscillator {
    fn has_integral_cost(&self) -> bool {
        true
    }

    fn num_alg_functions(&self) -> usize {
        1
    }

    fn evaluate(&self, input: &FunctionInputData, out: &mut PathFunctionContainer) -> anyhow::Result<()> {
        let (x, u, s, t) = (&input.state, input.control[0], input.static_params[0], input.time);
        out.dyn_data_mut().set_values(&[x[1], -x[0] + u * x[1]])?;
        if let Some(cost) = out.cost_data_mut() {
            cost.set_values(&[x[0] * x[0] + u * u])?;
        }
        if let Some(alg) = out.alg_data_mut() {
            alg.set_values(&[x[0] + s * t])?;
        }
        Ok(())
    }
}

/// Supplies the state Jacobian of the dynamics only.
struct PartialJacobian;

impl PathFunction for PartialJacobian {
    fn has_integral_cost(&self) -> bool {
        false
    }

    fn evaluate(&self, input: &FunctionInputData, out: &mut PathFunctionContainer) -> anyhow::Result<()> {
        let x = &input.state;
        let dyn_data = out.dyn_data_mut();
        dyn_data.set_values(&[x[0] * x[0] + input.control[0]])?;
        dyn_data.set_jacobian(JacobianType::State, dmatrix![2.0 * x[0]])?;
        Ok(())
    }
}

struct Failing;

impl PathFunction for Failing {
    fn has_integral_cost(&self) -> bool {
        false
    }

    fn evaluate(&self, _input: &FunctionInputData, _out: &mut PathFunctionContainer) -> anyhow::Result<()> {
        anyhow::bail!("no dynamics available")
    }
}

fn oscillator_problem() -> ProblemCharacteristics {
    let mut problem = decay_problem(vec![-1.0, 1.0], vec![4]);
    problem.set_num_state_vars(2);
    problem.set_num_control_vars(1);
    problem.set_num_static_vars(1);
    problem
}

fn oscillator_input() -> FunctionInputData {
    FunctionInputData::new(
        0.7,
        DVector::from_vec(vec![0.3, -1.2]),
        DVector::from_element(1, 0.5),
        DVector::from_element(1, 2.0),
    )
    .at_point(3)
}

fn assert_matrix_close(a: &DMatrix<f64>, b: &DMatrix<f64>, eps: f64) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_approx_eq!(*x, *y, eps);
    }
}

#[test]
fn test_container_sizes_follow_flags() {
    let container = PathFunctionContainer::new(2, 1, 0, false, 3);
    assert_eq!(container.dyn_data().num_functions(), 2);
    assert!(container.cost_data().is_none());
    assert_eq!(container.num_alg_functions(), 3);
    assert_eq!(container.dyn_data().num_vars(JacobianType::Time), 1);
    assert_eq!(container.dyn_data().num_vars(JacobianType::Static), 0);
}

#[test]
fn test_output_data_rejects_bad_shapes() {
    let mut data = FunctionOutputData::new(2, 3, 1, 0);
    assert!(data.set_values(&[1.0]).is_err());
    assert!(data.set_bounds(&[0.0, 0.0], &[1.0]).is_err());
    assert!(data.set_jacobian(JacobianType::State, DMatrix::zeros(2, 2)).is_err());
    data.set_jacobian(JacobianType::Control, DMatrix::zeros(2, 1)).unwrap();
    assert!(data.has_jacobian(JacobianType::Control));
    assert!(data.jacobian(JacobianType::State).is_err());
    data.clear_jacobians();
    assert!(!data.has_jacobian(JacobianType::Control));
}

#[test]
fn test_perturbed_input_shifts_one_variable() {
    let input = oscillator_input();
    let shifted = input.perturbed(JacobianType::State, 1, 0.5);
    assert_approx_eq!(shifted.state[1], -0.7, 1.0e-15);
    assert_eq!(shifted.state[0], input.state[0]);
    assert_approx_eq!(input.perturbed(JacobianType::Time, 0, 1.0).time, 1.7, 1.0e-15);
    assert_eq!(input.var(JacobianType::Static, 0), 2.0);
}

#[test]
fn test_manager_differences_missing_jacobians() {
    let manager = PathFunctionManager::new(Box::new(PlainOscillator), &oscillator_problem());
    let input = oscillator_input();
    let out = manager.evaluate(&input).unwrap();

    let (x0, x1, u, s, t) = (0.3, -1.2, 0.5, 2.0, 0.7);
    let dyn_data = out.dyn_data();
    assert_matrix_close(
        dyn_data.jacobian(JacobianType::State).unwrap(),
        &dmatrix![0.0, 1.0; -1.0, u],
        1.0e-6,
    );
    assert_matrix_close(
        dyn_data.jacobian(JacobianType::Control).unwrap(),
        &dmatrix![0.0; x1],
        1.0e-6,
    );
    let cost = out.cost_data().unwrap();
    assert_matrix_close(cost.jacobian(JacobianType::State).unwrap(), &dmatrix![2.0 * x0, 0.0], 1.0e-6);
    assert_matrix_close(cost.jacobian(JacobianType::Control).unwrap(), &dmatrix![2.0 * u], 1.0e-6);
    let alg = out.alg_data().unwrap();
    assert_matrix_close(alg.jacobian(JacobianType::Time).unwrap(), &dmatrix![s], 1.0e-6);
    assert_matrix_close(alg.jacobian(JacobianType::Static).unwrap(), &dmatrix![t], 1.0e-6);
}

#[test]
fn test_manager_keeps_user_jacobians() {
    let mut problem = decay_problem(vec![-1.0, 1.0], vec![4]);
    problem.set_num_control_vars(1);
    let manager = PathFunctionManager::new(Box::new(PartialJacobian), &problem);
    let input = FunctionInputData::new(0.0, DVector::from_element(1, 3.0), DVector::from_element(1, 1.0), DVector::zeros(0));
    let out = manager.evaluate(&input).unwrap();
    assert_eq!(out.dyn_data().jacobian(JacobianType::State).unwrap(), &dmatrix![6.0]);
    assert_matrix_close(out.dyn_data().jacobian(JacobianType::Control).unwrap(), &dmatrix![1.0], 1.0e-8);
    assert_eq!(out.dyn_data().jacobian(JacobianType::Time).unwrap(), &dmatrix![0.0]);
}

#[test]
fn test_manager_wraps_user_errors_with_point() {
    let manager = PathFunctionManager::new(Box::new(Failing), &decay_problem(vec![-1.0, 1.0], vec![4]));
    let input = FunctionInputData::new(0.5, DVector::from_element(1, 1.0), DVector::zeros(0), DVector::zeros(0)).at_point(2);
    let err = manager.evaluate(&input).unwrap_err();
    match err {
        TranscriptionError::UserFunction { context, .. } => assert!(context.contains("point 2")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_initialize_discovers_sparsity_and_alg_bounds() {
    let mut manager = PathFunctionManager::new(Box::new(AutoDiffPath::new(Oscillator)), &oscillator_problem());
    assert!(manager.properties().is_err());
    manager.initialize(&oscillator_input()).unwrap();

    let props = manager.properties().unwrap();
    let dyn_state = props.pattern(PathOutput::Dynamics, JacobianType::State).unwrap();
    // x0' does not depend on x0
    assert_eq!(dyn_state.nnz(), 3);
    assert_eq!(dyn_state.get(0, 0).unwrap(), 0.0);
    let dyn_time = props.pattern(PathOutput::Dynamics, JacobianType::Time).unwrap();
    assert_eq!(dyn_time.nnz(), 0);
    let alg_static = props.pattern(PathOutput::Algebraic, JacobianType::Static).unwrap();
    assert_eq!(alg_static.nnz(), 1);

    let (lower, upper) = manager.alg_bounds();
    assert_eq!(lower, &DVector::from_element(1, -1.0));
    assert_eq!(upper, &DVector::from_element(1, T_ALG_UPPER));
}

#[test]
fn test_autodiff_matches_finite_differences() {
    let problem = oscillator_problem();
    let ad = PathFunctionManager::new(Box::new(AutoDiffPath::new(Oscillator)), &problem);
    let fd = PathFunctionManager::new(Box::new(PlainOscillator), &problem);
    let input = oscillator_input();
    let ad_out = ad.evaluate_values(&input).unwrap();
    let fd_out = fd.evaluate(&input).unwrap();

    for which in [PathOutput::Dynamics, PathOutput::Cost, PathOutput::Algebraic] {
        let a = ad_out.output(which).unwrap();
        let f = fd_out.output(which).unwrap();
        for (x, y) in a.values().iter().zip(f.values().iter()) {
            assert_approx_eq!(*x, *y, 1.0e-12);
        }
        for ty in JacobianType::ALL {
            assert_matrix_close(a.jacobian(ty).unwrap(), f.jacobian(ty).unwrap(), 1.0e-6);
        }
    }
}

#[test]
fn test_autodiff_rejects_wrong_input_lengths() {
    let path = AutoDiffPath::new(Oscillator);
    let mut out = PathFunctionContainer::new(2, 1, 1, true, 1);
    let input = FunctionInputData::new(0.0, DVector::zeros(3), DVector::zeros(1), DVector::zeros(1));
    assert!(path.evaluate(&input, &mut out).is_err());
}
