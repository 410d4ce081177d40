use nalgebra::{DMatrix, DVector};
use test_case::test_case;

use super::fixtures::{decay_problem, Decay};
use crate::{assert_approx_eq, prelude::*};

#[test_case(&[3, 16], true; "both ends of the range")]
#[test_case(&[2], false; "too few points")]
#[test_case(&[5, 17], false; "degree above fifteen")]
fn test_mesh_interval_point_limits(num_points: &[usize], ok: bool) {
    assert_eq!(check_mesh_interval_num_points(num_points).is_ok(), ok);
}

#[test]
fn test_initialize_counts() {
    let problem = decay_problem(vec![-1.0, 0.0, 1.0], vec![3, 4]);
    let mut state = RadauState::default();
    let counts = NlpFuncUtilRadau::new(&problem, &mut state).initialize().unwrap();
    assert_eq!(
        counts,
        NlpCounts {
            num_state_vars_nlp: 8,
            num_control_vars_nlp: 0,
            num_decision_vars_nlp: 10,
            num_defect_con_nlp: 7,
        }
    );
    let coll = state.collocation_data();
    assert_eq!(coll.num_mesh_points(), 7);
    assert_eq!(coll.num_state_points(), 8);
    assert_eq!(coll.num_control_points(), 7);
    assert_eq!(coll.num_path_constraint_points(), 7);
    let (min, max) = state.polynomial_degree_range();
    assert_eq!(state.num_cached_interpolators(), max - min + 1);
}

#[test]
fn test_time_vector_and_time_derivatives() {
    let problem = decay_problem(vec![-1.0, 1.0], vec![4]);
    let mut state = RadauState::default();
    let mut util = NlpFuncUtilRadau::new(&problem, &mut state);
    util.initialize().unwrap();
    util.set_time_vector(1.0, 3.0).unwrap();

    let times = util.time_vector().clone();
    assert_eq!(times.len(), 5);
    assert_approx_eq!(times[0], 1.0, 1.0e-14);
    assert_approx_eq!(times[4], 3.0, 1.0e-14);

    assert_approx_eq!(util.d_current_time_d_ti(0).unwrap(), 1.0, 1.0e-14);
    assert_approx_eq!(util.d_current_time_d_tf(0).unwrap(), 0.0, 1.0e-14);
    assert_approx_eq!(util.d_current_time_d_ti(4).unwrap(), 0.0, 1.0e-14);
    let points = util.discretization_points().unwrap().clone();
    for k in 0..5 {
        let sum = util.d_current_time_d_ti(k).unwrap() + util.d_current_time_d_tf(k).unwrap();
        assert_approx_eq!(sum, 1.0, 1.0e-14);
        assert_approx_eq!(times[k], 1.0 + (points[k] + 1.0), 1.0e-14);
    }
    assert!(util.d_current_time_d_ti(5).is_err());
}

#[test]
fn test_defects_need_prepared_matrices() {
    let problem = decay_problem(vec![-1.0, 1.0], vec![4]);
    let mut state = RadauState::default();
    let mut util = NlpFuncUtilRadau::new(&problem, &mut state);
    util.initialize().unwrap();
    let dec = DecisionVector::initialize(DecVecDims::radau(1, 0, 0, 0, 4)).unwrap();
    let err = util.compute_defect_fun_and_jac(&[], &dec).unwrap_err();
    assert!(matches!(err, TranscriptionError::NotInitialized(_)));
}

#[test]
fn test_terminal_point_repeats_last_control() {
    let mut problem = decay_problem(vec![-1.0, 1.0], vec![3]);
    problem.set_num_control_vars(1);
    let mut state = RadauState::default();
    let mut util = NlpFuncUtilRadau::new(&problem, &mut state);
    util.initialize().unwrap();
    util.set_time_vector(0.0, 1.0).unwrap();

    let mut dec = DecisionVector::initialize(DecVecDims::radau(1, 1, 0, 0, 3)).unwrap();
    dec.set_time_vector(0.0, 1.0);
    dec.set_control_array(&DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]))
        .unwrap();
    let inputs = util.func_input_data(&dec).unwrap();
    assert_eq!(inputs.len(), 4);
    assert_eq!(inputs[2].control[0], 3.0);
    assert_eq!(inputs[3].control[0], 3.0);
    assert_eq!(inputs[3].point_idx, Some(3));
}

#[test]
fn test_state_and_control_in_mesh_slices_by_interval() {
    let problem = decay_problem(vec![-1.0, 0.0, 1.0], vec![3, 4]);
    let mut state = RadauState::default();
    let util = NlpFuncUtilRadau::new(&problem, &mut state);
    let states = DMatrix::from_fn(8, 1, |i, _| i as f64);
    let controls = DMatrix::from_fn(7, 2, |i, j| (10 * i + j) as f64);

    let (x, u) = util
        .state_and_control_in_mesh(1, &states, &controls, true, false)
        .unwrap();
    assert_eq!(x.nrows(), 5);
    assert_eq!(x[(0, 0)], 3.0);
    assert_eq!(x[(4, 0)], 7.0);
    assert_eq!(u.nrows(), 4);
    assert_eq!(u[(3, 1)], 61.0);

    assert!(util.state_and_control_in_mesh(2, &states, &controls, false, false).is_err());
    assert!(util.state_and_control_in_mesh(1, &states, &controls, true, true).is_err());
}

#[test]
fn test_degree_interpolators_are_exact_for_the_interval_polynomial() {
    let n = 4;
    let interps = DegreeInterpolators::build(n, 100).unwrap();
    let nodes = compute_single_seg_lgr_nodes(n, 100).unwrap();
    let targets = compute_single_seg_lgr_nodes(n + 1, 100).unwrap();

    let p = |x: f64| 2.0 * x.powi(4) - x + 0.5;
    let values = DMatrix::from_iterator(n + 1, 1, nodes.points.iter().map(|&x| p(x)));
    let out = interps.state.interpolate_columns(&values).unwrap();
    assert_eq!(out.nrows(), n);
    for k in 0..n {
        assert_approx_eq!(out[(k, 0)], p(targets.points[k + 1]), 1.0e-11);
    }
    assert_eq!(interps.control.num_ind_var(), n);
}

#[test]
fn test_defect_jacobian_matches_finite_differences() {
    let problem = decay_problem(vec![-1.0, 0.2, 1.0], vec![3, 5]);
    let mut state = RadauState::default();
    let mut manager = PathFunctionManager::new(Box::new(Decay { rate: 0.7 }), &problem);

    let mut util = NlpFuncUtilRadau::new(&problem, &mut state);
    util.initialize().unwrap();
    let num_mesh = util.num_mesh_points();
    let mut dec = DecisionVector::initialize(DecVecDims::radau(1, 0, 0, 0, num_mesh)).unwrap();
    let z0 = DVector::from_fn(dec.num_decision_params(), |i, _| 0.3 + 0.05 * i as f64);
    dec.set_decision_vector(&z0).unwrap();
    dec.set_time_vector(0.1, 1.3);
    util.set_time_vector(0.1, 1.3).unwrap();
    let inputs = util.func_input_data(&dec).unwrap();
    manager.initialize(&inputs[0]).unwrap();
    util.prepare_to_optimize(&manager, &dec).unwrap();

    let z = dec.decision_vector().clone();
    let mut evaluate = |z: &DVector<f64>| -> (DVector<f64>, DMatrix<f64>) {
        dec.set_decision_vector(z).unwrap();
        util.set_time_vector(dec.first_time(), dec.last_time()).unwrap();
        let func_data: Vec<_> = util
            .func_input_data(&dec)
            .unwrap()
            .iter()
            .map(|input| manager.evaluate(input).unwrap())
            .collect();
        let (defects, jac) = util.compute_defect_fun_and_jac(&func_data, &dec).unwrap();
        (defects, jac.to_dense())
    };

    let (defects, jac) = evaluate(&z);
    assert_eq!(defects.len(), num_mesh);
    assert_eq!(jac.shape(), (num_mesh, z.len()));

    let fd = super::fixtures::finite_difference_jacobian(&z, |zz| evaluate(zz).0);
    for (a, b) in jac.iter().zip(fd.iter()) {
        assert_approx_eq!(*a, *b, 1.0e-5);
    }
}

#[test]
fn test_jacobian_values_outside_pattern_are_dropped() {
    use crate::transcription::alg_path::set_in_pattern;

    let mut par_q = SparseMatrix::new(2, 3);
    par_q.set(0, 1, 0.0).unwrap();
    assert!(set_in_pattern(&mut par_q, 0, 1, 2.5).unwrap());
    assert!(!set_in_pattern(&mut par_q, 1, 2, 4.0).unwrap());
    assert!(!set_in_pattern(&mut par_q, 1, 0, 0.0).unwrap());
    assert_eq!(par_q.nnz(), 1);
    assert_eq!(par_q.get(0, 1).unwrap(), 2.5);
    assert!(set_in_pattern(&mut par_q, 5, 5, 1.0).is_ok());
}
