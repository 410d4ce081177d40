//! `x' = -k x` on `[0, tf]`, with the running cost `x` so the integral
//! cost is `x0 (1 - exp(-k tf)) / k`.

use ad_trait::AD;
use lgr_transcription::prelude::*;
use nalgebra::DVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDecay {
    pub rate: f64,
}

impl AutoDiffPathFunction for ExponentialDecay {
    const NAME: &'static str = "ExponentialDecay";

    fn dims(&self) -> PathFunctionDims {
        PathFunctionDims {
            num_state_vars: 1,
            num_control_vars: 0,
            num_static_vars: 0,
            num_alg_functions: 0,
            has_integral_cost: true,
        }
    }

    fn path_values<T: AD>(&self, _time: T, state: &[T], _control: &[T], _static_params: &[T]) -> PathValues<T> {
        PathValues {
            dynamics: vec![-T::constant(self.rate) * state[0]],
            cost: Some(state[0]),
            algebraic: vec![],
        }
    }
}

impl ExponentialDecay {
    pub fn exact_state(&self, x0: f64, t: f64) -> f64 {
        x0 * (-self.rate * t).exp()
    }

    pub fn exact_cost(&self, x0: f64, tf: f64) -> f64 {
        x0 * (1.0 - (-self.rate * tf).exp()) / self.rate
    }
}

/// Decay from `x0` over `[0, tf]` on the given mesh, with a straight-line
/// guess from `x0` to `x0 / 2`.
pub fn decay_phase(
    decay: ExponentialDecay,
    x0: f64,
    tf: f64,
    fractions: Vec<f64>,
    num_points: Vec<usize>,
    config: TranscriptionConfig,
) -> RadauPhase {
    let mut problem = ProblemCharacteristics::new();
    problem.set_num_state_vars(1);
    problem.set_state_lower_bound(DVector::from_element(1, -10.0 * x0.abs().max(1.0)));
    problem.set_state_upper_bound(DVector::from_element(1, 10.0 * x0.abs().max(1.0)));
    problem.set_state_initial_guess(DVector::from_element(1, x0));
    problem.set_state_final_guess(DVector::from_element(1, 0.5 * x0));
    problem.set_time_lower_bound(0.0);
    problem.set_time_upper_bound(tf);
    problem.set_time_initial_guess(0.0);
    problem.set_time_final_guess(tf);
    problem.set_mesh_interval_fractions(fractions);
    problem.set_mesh_interval_num_points(num_points);
    RadauPhase::new(problem, config, Box::new(AutoDiffPath::new(decay)))
}
