//! Bead sliding down a frictionless wire whose heading follows the
//! prescribed law `theta = omega * t`:
//!
//! `x' = v sin(theta)`, `y' = v cos(theta)`, `v' = g cos(theta)`.
//!
//! The heading enters as a control pinned by an algebraic path constraint,
//! so the closed-form trajectory below checks the whole transcription.

use ad_trait::AD;
use lgr_transcription::prelude::*;
use nalgebra::{ComplexField, DVector, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSteering {
    pub gravity: f64,
    /// Heading rate, rad per unit time.
    pub omega: f64,
}

impl AutoDiffPathFunction for LinearSteering {
    const NAME: &'static str = "LinearSteering";

    fn dims(&self) -> PathFunctionDims {
        PathFunctionDims {
            num_state_vars: 3,
            num_control_vars: 1,
            num_static_vars: 0,
            num_alg_functions: 1,
            has_integral_cost: true,
        }
    }

    fn path_values<T: AD>(&self, time: T, state: &[T], control: &[T], _static_params: &[T]) -> PathValues<T> {
        let v = state[2];
        let theta = control[0];
        let (sin, cos) = (ComplexField::sin(theta), ComplexField::cos(theta));
        PathValues {
            dynamics: vec![v * sin, v * cos, T::constant(self.gravity) * cos],
            // kinetic energy per unit mass
            cost: Some(T::constant(0.5) * v * v),
            algebraic: vec![theta - T::constant(self.omega) * time],
        }
    }

    fn alg_bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        Some((vec![0.0], vec![0.0]))
    }
}

impl LinearSteering {
    /// `(x, y, v)` at time `t` when starting from rest at the origin at
    /// `t = 0`.
    pub fn exact_state(&self, t: f64) -> Vector3<f64> {
        let (g, w) = (self.gravity, self.omega);
        Vector3::new(
            g / w * (t / 2.0 - (2.0 * w * t).sin() / (4.0 * w)),
            g / (4.0 * w * w) * (1.0 - (2.0 * w * t).cos()),
            g / w * (w * t).sin(),
        )
    }
}

/// Starts from rest at the origin and runs over `[0, tf]`.
pub fn steering_phase(
    steering: LinearSteering,
    tf: f64,
    fractions: Vec<f64>,
    num_points: Vec<usize>,
    config: TranscriptionConfig,
) -> RadauPhase {
    let reach = 10.0 * steering.gravity * tf.max(1.0) * tf.max(1.0);
    let mut problem = ProblemCharacteristics::new();
    problem.set_num_state_vars(3);
    problem.set_num_control_vars(1);
    problem.set_state_lower_bound(DVector::from_element(3, -reach));
    problem.set_state_upper_bound(DVector::from_element(3, reach));
    problem.set_state_initial_guess(DVector::zeros(3));
    problem.set_state_final_guess(DVector::from_element(3, 1.0));
    problem.set_control_lower_bound(DVector::from_element(1, -10.0));
    problem.set_control_upper_bound(DVector::from_element(1, 10.0));
    problem.set_time_lower_bound(0.0);
    problem.set_time_upper_bound(tf);
    problem.set_time_initial_guess(0.0);
    problem.set_time_final_guess(tf);
    problem.set_mesh_interval_fractions(fractions);
    problem.set_mesh_interval_num_points(num_points);
    RadauPhase::new(problem, config, Box::new(AutoDiffPath::new(steering)))
}
