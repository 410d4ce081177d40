use std::f64::consts::FRAC_PI_2;

use collocation_example::prelude::*;
use lgr_transcription::assert_approx_eq;
use test_case::test_case;

const MAX_ITERS: u64 = 50;

#[test_case(vec![-1.0, 1.0], vec![10]; "one interval")]
#[test_case(vec![-1.0, 0.0, 1.0], vec![8, 8]; "two intervals")]
#[test_case(vec![-1.0, -0.5, 0.5, 1.0], vec![7, 9, 7]; "uneven intervals")]
fn test_steering_matches_closed_form(fractions: Vec<f64>, num_points: Vec<usize>) {
    let tf = 1.0;
    let steering = LinearSteering {
        gravity: 9.81,
        omega: FRAC_PI_2 / tf,
    };
    let mut phase = steering_phase(steering, tf, fractions, num_points, TranscriptionConfig::default());
    phase.initialize().unwrap();
    let boundary = InitialValueBoundary::new(0.0, tf, &[0.0, 0.0, 0.0]);
    let run = solve_feasibility(&mut phase, &boundary, MAX_ITERS).unwrap();
    assert!(run.max_residual < 1.0e-8, "max residual {}", run.max_residual);

    let times = phase.time_vector().clone();
    let states = phase.state_array().unwrap();
    for (k, &t) in times.iter().enumerate() {
        let exact = steering.exact_state(t);
        for s in 0..3 {
            assert_approx_eq!(states[(k, s)], exact[s], 1.0e-5);
        }
    }
    let controls = phase.control_array().unwrap();
    for (k, theta) in controls.iter().enumerate() {
        assert_approx_eq!(*theta, steering.omega * times[k], 1.0e-8);
    }
}

#[test]
fn test_decay_refines_to_tolerance() {
    let decay = ExponentialDecay { rate: 2.0 };
    let (x0, tf) = (1.0, 1.5);
    let mut phase = decay_phase(
        decay,
        x0,
        tf,
        vec![-1.0, 1.0],
        vec![4],
        TranscriptionConfig::default(),
    );
    phase.initialize().unwrap();
    let boundary = InitialValueBoundary::new(0.0, tf, &[x0]);
    let passes = solve_with_mesh_refinement(&mut phase, &boundary, MAX_ITERS).unwrap();

    let last = passes.last().unwrap();
    assert!(!last.refinement.is_mesh_refined);
    let x_final = phase.decision_vector().unwrap().last_state_vector().unwrap()[0];
    assert_approx_eq!(x_final, decay.exact_state(x0, tf), 1.0e-6);
    assert_approx_eq!(phase.cost_function().unwrap(), decay.exact_cost(x0, tf), 1.0e-6);
}

#[test]
fn test_config_from_toml_drives_refinement_limits() {
    let config = TranscriptionConfig::from_toml_str(
        r#"
        max_mesh_refinement_iterations = 1
        relative_error_tol = 1e-9
        "#,
    )
    .unwrap();
    let decay = ExponentialDecay { rate: 1.0 };
    let mut phase = decay_phase(decay, 2.0, 1.0, vec![-1.0, 1.0], vec![3], config);
    phase.initialize().unwrap();
    let boundary = InitialValueBoundary::new(0.0, 1.0, &[2.0]);
    let passes = solve_with_mesh_refinement(&mut phase, &boundary, MAX_ITERS).unwrap();
    assert_eq!(passes.len(), 1);
    assert!(passes[0].refinement.max_rel_error() > 1.0e-9);
}

#[test]
fn test_boundary_rejects_wrong_state_length() {
    let boundary = InitialValueBoundary::new(0.0, 1.0, &[1.0, 2.0]);
    let state = nalgebra::DVector::from_element(1, 0.0);
    let empty = nalgebra::DVector::zeros(0);
    assert!(boundary.evaluate(0.0, &state, 1.0, &state, &empty).is_err());
}
