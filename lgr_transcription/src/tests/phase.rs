use nalgebra::{DMatrix, DVector};
use pretty_assertions::assert_eq;

use super::fixtures::{decay_phase, decay_problem, finite_difference_jacobian, ramp_phase, ramp_problem, Decay, Ramp};
use crate::{assert_approx_eq, prelude::*};

/// Decay phase holding `x(t) = exp(-t)` at every state point.
fn exact_decay_phase() -> RadauPhase {
    let mut phase = decay_phase(vec![-1.0, 0.0, 1.0], vec![6, 6]);
    phase.initialize().unwrap();
    let times = phase.time_vector().clone();
    let mut dec = phase.decision_vector().unwrap().clone();
    dec.set_state_array(&DMatrix::from_iterator(times.len(), 1, times.iter().map(|t| (-t).exp())))
        .unwrap();
    phase.set_decision_vector(dec.decision_vector()).unwrap();
    phase
}

#[test]
fn test_uninitialized_phase_errors() {
    let mut phase = decay_phase(vec![-1.0, 1.0], vec![4]);
    assert!(!phase.is_initialized());
    assert!(matches!(
        phase.decision_vector(),
        Err(TranscriptionError::NotInitialized(_))
    ));
    assert!(phase.constraint_vector().is_err());
    assert!(phase.refine_mesh(false).is_err());
}

#[test]
fn test_initialize_sizes_the_nlp() {
    let mut phase = decay_phase(vec![-1.0, 0.0, 1.0], vec![6, 6]);
    phase.initialize().unwrap();

    assert_eq!(phase.problem().num_decision_vars_nlp(), 15);
    assert_eq!(phase.problem().num_defect_con_nlp(), 12);
    assert_eq!(phase.num_constraints(), 12);
    assert_eq!(phase.time_vector().len(), 13);
    assert_approx_eq!(phase.time_vector()[0], 0.0, 1.0e-14);
    assert_approx_eq!(phase.time_vector()[12], 1.0, 1.0e-14);

    let jac = phase.constraint_jacobian().unwrap();
    assert_eq!(jac.shape(), (12, 15));
    assert_eq!(phase.cost_jacobian().unwrap().shape(), (1, 15));

    let (lower, upper) = phase.decision_vector_bounds();
    assert_eq!((lower[0], upper[0]), (0.0, 1.0));
    assert_eq!((lower[1], upper[1]), (0.0, 1.0));
    assert_eq!((lower[2], upper[14]), (-10.0, 10.0));
    let (con_lower, con_upper) = phase.constraint_bounds();
    assert_eq!(con_lower, &DVector::zeros(12));
    assert_eq!(con_upper, &DVector::zeros(12));
}

#[test]
fn test_linear_initial_guess() {
    let mut phase = decay_phase(vec![-1.0, 1.0], vec![5]);
    phase.set_state_guess(DMatrix::zeros(3, 1));
    phase.initialize().unwrap();
    let states = phase.state_array().unwrap();
    assert_eq!(states.nrows(), 6);
    assert_approx_eq!(states[(0, 0)], 1.0, 1.0e-14);
    assert_approx_eq!(states[(5, 0)], 0.5, 1.0e-14);
    assert!(states.as_slice().windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn test_exact_solution_has_small_defects_and_exact_cost() {
    let mut phase = exact_decay_phase();
    let defects = phase.constraint_vector().unwrap();
    assert!(defects.amax() < 1.0e-4, "max defect {}", defects.amax());
    assert_approx_eq!(phase.cost_function().unwrap(), 1.0 - (-1.0_f64).exp(), 1.0e-6);
}

#[test]
fn test_constraint_and_cost_jacobians_match_finite_differences() {
    let mut phase = exact_decay_phase();
    let z = phase.decision_vector().unwrap().decision_vector().clone();
    let jac = phase.constraint_jacobian().unwrap().to_dense();
    let cost_jac = phase.cost_jacobian().unwrap().to_dense();

    let fd = finite_difference_jacobian(&z, |zz| {
        phase.set_decision_vector(zz).unwrap();
        phase.constraint_vector().unwrap()
    });
    for (a, b) in jac.iter().zip(fd.iter()) {
        assert_approx_eq!(*a, *b, 1.0e-5);
    }

    let fd_cost = finite_difference_jacobian(&z, |zz| {
        phase.set_decision_vector(zz).unwrap();
        DVector::from_element(1, phase.cost_function().unwrap())
    });
    for (a, b) in cost_jac.iter().zip(fd_cost.iter()) {
        assert_approx_eq!(*a, *b, 1.0e-6);
    }
}

#[test]
fn test_sparsity_pattern_covers_the_jacobian() {
    let mut phase = exact_decay_phase();
    let pattern = phase.constraint_sparsity_pattern().unwrap();
    let jac = phase.constraint_jacobian().unwrap();
    for (r, c, v) in jac.iter() {
        if v != 0.0 {
            assert!(pattern.contains(r, c), "({r}, {c}) missing from pattern");
        }
    }
    let cost_pattern = phase.cost_sparsity_pattern().unwrap();
    assert_eq!(
        phase.num_nlp_non_zeros().unwrap(),
        pattern.nnz() + cost_pattern.nnz()
    );
}

#[test]
fn test_algebraic_constraints_follow_defects() {
    let mut phase = ramp_phase(4);
    phase.initialize().unwrap();
    assert_eq!(phase.path_functions().num_alg_functions(), 1);
    assert_eq!(phase.num_constraints(), 8);
    let (lower, upper) = phase.constraint_bounds();
    assert_eq!(lower, &DVector::zeros(8));
    assert_eq!(upper, &DVector::zeros(8));

    // zero control guess: every algebraic row reads u - 1 = -1
    let cons = phase.constraint_vector().unwrap();
    for k in 4..8 {
        assert_approx_eq!(cons[k], -1.0, 1.0e-14);
    }

    let z = DVector::from_fn(phase.problem().num_decision_vars_nlp(), |i, _| 0.1 * i as f64 + 0.2);
    phase.set_decision_vector(&z).unwrap();
    let jac = phase.constraint_jacobian().unwrap().to_dense();
    assert_eq!(jac.shape(), (8, 11));
    let fd = finite_difference_jacobian(&z, |zz| {
        phase.set_decision_vector(zz).unwrap();
        phase.constraint_vector().unwrap()
    });
    for (a, b) in jac.iter().zip(fd.iter()) {
        assert_approx_eq!(*a, *b, 1.0e-5);
    }
}

#[test]
fn test_refine_mesh_without_update_keeps_mesh() {
    let mut phase = decay_phase(vec![-1.0, 1.0], vec![3]);
    phase.initialize().unwrap();
    let result = phase.refine_mesh(false).unwrap();
    assert!(result.is_mesh_refined);
    assert_eq!(result.max_rel_error_array.len(), 1);
    assert_eq!(phase.problem().mesh_interval_num_points(), &[3]);
}

#[test]
fn test_refine_mesh_reinitializes_on_new_mesh() {
    let mut phase = decay_phase(vec![-1.0, 1.0], vec![3]);
    phase.initialize().unwrap();
    let result = phase.refine_mesh(true).unwrap();
    assert!(result.is_mesh_refined);

    let new_points = result.new_mesh_interval_num_points.clone();
    assert_eq!(phase.problem().mesh_interval_num_points(), new_points.as_slice());
    assert_eq!(
        phase.problem().mesh_interval_fractions(),
        result.new_mesh_interval_fractions.as_slice()
    );
    let total: usize = new_points.iter().sum();
    assert_eq!(phase.problem().num_decision_vars_nlp(), total + 1 + 2);
    assert_eq!(result.new_state_guess.nrows(), total + 1);

    let states = phase.state_array().unwrap();
    assert_eq!(states, result.new_state_guess);
    assert_approx_eq!(states[(0, 0)], 1.0, 1.0e-14);
    assert_approx_eq!(states[(total, 0)], 0.5, 1.0e-14);
}

/// Every interval at exactly three points, so any refinement splits.
fn fixed_degree_config() -> TranscriptionConfig {
    TranscriptionConfig {
        min_polynomial_degree: 3,
        max_polynomial_degree: 3,
        ..TranscriptionConfig::default()
    }
}

#[test]
fn test_refine_mesh_splits_interval_at_min_degree() {
    let mut phase = RadauPhase::new(
        decay_problem(vec![-1.0, 1.0], vec![3]),
        fixed_degree_config(),
        Box::new(Decay { rate: 1.0 }),
    );
    phase.initialize().unwrap();
    let tol = phase.config().relative_error_tol;
    let result = phase.refine_mesh(true).unwrap();
    assert!(result.is_mesh_refined);

    let err = result.max_rel_error_array[0];
    let IntervalRefinement::Subdivided {
        num_sub_intervals,
        num_points,
    } = interval_refinement(err, tol, 3, 3, 3)
    else {
        panic!("expected a split for error {err}");
    };
    assert!(num_sub_intervals >= 2);
    assert_eq!(num_points, 3);
    assert_eq!(result.new_mesh_interval_num_points, vec![3; num_sub_intervals]);

    let fractions = &result.new_mesh_interval_fractions;
    assert_eq!(fractions.len(), num_sub_intervals + 1);
    let width = 2.0 / num_sub_intervals as f64;
    for (j, fraction) in fractions.iter().enumerate() {
        assert_approx_eq!(*fraction, -1.0 + j as f64 * width, 1.0e-14);
    }
    assert_eq!(phase.problem().mesh_interval_fractions(), fractions.as_slice());

    // the linear guess x = 1 - t/2 is carried onto the new points
    let states = phase.state_array().unwrap();
    let times = phase.time_vector();
    assert_eq!(states.nrows(), 3 * num_sub_intervals + 1);
    assert_eq!(times.len(), states.nrows());
    for (k, t) in times.iter().enumerate() {
        assert_approx_eq!(states[(k, 0)], 1.0 - 0.5 * t, 1.0e-12);
    }
}

#[test]
fn test_refine_mesh_keeps_converged_interval_next_to_split() {
    let mut phase = RadauPhase::new(
        ramp_problem(vec![-1.0, 0.0, 1.0], vec![3, 3]),
        fixed_degree_config(),
        Box::new(Ramp { slope: 1.0 }),
    );
    phase.initialize().unwrap();

    // x = t throughout; u = 1 matches it on [0, 1], u = 3 does not on [1, 2]
    let points = phase.radau_state().discretization().unwrap().points.clone();
    let states = DMatrix::from_fn(points.len(), 1, |i, _| points[i] + 1.0);
    let controls = DMatrix::from_fn(6, 1, |i, _| if i < 3 { 1.0 } else { 3.0 });
    let mut dec = phase.decision_vector().unwrap().clone();
    dec.set_time_vector(0.0, 2.0);
    dec.set_state_array(&states).unwrap();
    dec.set_control_array(&controls).unwrap();
    phase.set_decision_vector(dec.decision_vector()).unwrap();

    let tol = phase.config().relative_error_tol;
    let result = phase.refine_mesh(true).unwrap();
    let errors = &result.max_rel_error_array;
    assert!(errors[0] <= tol, "errors {errors:?}");
    let IntervalRefinement::Subdivided {
        num_sub_intervals,
        num_points,
    } = interval_refinement(errors[1], tol, 3, 3, 3)
    else {
        panic!("expected a split for errors {errors:?}");
    };

    let mut expected_fractions = vec![-1.0, 0.0];
    expected_fractions.extend(equal_sub_interval_bounds(0.0, 1.0, num_sub_intervals));
    assert_eq!(result.new_mesh_interval_fractions, expected_fractions);
    let mut expected_points = vec![3];
    expected_points.extend(vec![num_points; num_sub_intervals]);
    assert_eq!(result.new_mesh_interval_num_points, expected_points);

    // the converged interval keeps its points unchanged
    assert_eq!(result.new_state_guess.rows(0, 3).into_owned(), states.rows(0, 3).into_owned());
    assert_eq!(result.new_control_guess.rows(0, 3).into_owned(), controls.rows(0, 3).into_owned());

    let new_states = phase.state_array().unwrap();
    let new_controls = phase.control_array().unwrap();
    for (k, t) in phase.time_vector().iter().enumerate() {
        assert_approx_eq!(new_states[(k, 0)], *t, 1.0e-12);
    }
    for k in 3..new_controls.nrows() {
        assert_approx_eq!(new_controls[(k, 0)], 3.0, 1.0e-12);
    }
}

#[test]
fn test_exact_solution_needs_no_refinement() {
    let mut phase = exact_decay_phase();
    let result = phase.refine_mesh(true).unwrap();
    assert!(!result.is_mesh_refined, "errors {:?}", result.max_rel_error_array);
    assert!(result.max_rel_error() <= 1.0e-6);
    assert_eq!(phase.problem().mesh_interval_num_points(), &[6, 6]);
}

#[test]
fn test_configure_scaling_weights_defects_like_states() {
    let mut phase = decay_phase(vec![-1.0, 1.0], vec![4]);
    phase.initialize().unwrap();
    assert!(!phase.scale_utility().is_initialized());
    phase.configure_scaling().unwrap();

    let scaling = phase.scale_utility();
    assert!(scaling.is_initialized());
    assert_approx_eq!(scaling.dec_vec_weights()[0], 1.0, 1.0e-15);
    assert_approx_eq!(scaling.dec_vec_weights()[2], 0.05, 1.0e-15);
    for w in scaling.con_vec_weights().iter() {
        assert_approx_eq!(*w, 0.05, 1.0e-15);
    }
}

#[test]
fn test_configure_scaling_needs_finite_bounds() {
    let mut problem = decay_problem(vec![-1.0, 1.0], vec![4]);
    problem.set_state_upper_bound(DVector::from_element(1, f64::INFINITY));
    let mut phase = RadauPhase::new(problem, TranscriptionConfig::default(), Box::new(Decay { rate: 1.0 }));
    phase.initialize().unwrap();
    let err = phase.configure_scaling().unwrap_err();
    assert!(matches!(
        err,
        TranscriptionError::Config(ConfigError::UnscalableBounds { idx: 2, .. })
    ));
}

#[test]
fn test_invalid_mesh_fails_initialize() {
    let mut phase = decay_phase(vec![-1.0, 1.0], vec![2]);
    assert!(matches!(
        phase.initialize(),
        Err(TranscriptionError::Config(ConfigError::IntervalPointsOutOfRange { .. }))
    ));
    let mut phase = decay_phase(vec![-1.0, 0.5, 0.2, 1.0], vec![3, 3, 3]);
    assert!(phase.initialize().is_err());
}

#[test]
fn test_print_helpers_run() {
    let mut phase = exact_decay_phase();
    phase.print_mesh();
    phase.print_bounds();
    phase.print_decision_vector().unwrap();
    phase.print_defect_constraints().unwrap();
}
