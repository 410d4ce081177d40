pub mod config;
pub mod decision_vector;
pub mod error;
pub mod feasibility;
pub mod interpolation;
pub mod nlp_function_data;
pub mod phase;
pub mod problem_characteristics;
pub mod radau_math;
pub mod scaling;
pub mod sparse;
pub mod transcription;
pub mod user_functions;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::{
        config::*,
        decision_vector::*,
        error::*,
        feasibility::*,
        interpolation::*,
        nlp_function_data::*,
        phase::*,
        problem_characteristics::*,
        radau_math::*,
        scaling::{scale_utility::*, unit_scaling::*},
        sparse::*,
        transcription::{alg_path::*, mesh_refinement::*, radau::*, *},
        user_functions::{autodiff::*, manager::*, *},
    };

    pub use ad_trait;
    pub use nalgebra;
}

/// Asserts two floats agree to an absolute tolerance (default `1e-6`).
#[macro_export]
macro_rules! assert_approx_eq {
    ($a:expr, $b:expr) => {
        $crate::assert_approx_eq!($a, $b, 1.0e-6)
    };
    ($a:expr, $b:expr, $eps:expr) => {{
        let (a, b, eps): (f64, f64, f64) = ($a, $b, $eps);
        assert!(
            (a - b).abs() <= eps,
            "assertion failed: `{} ~= {}` (left: {a:?}, right: {b:?}, diff: {:?}, eps: {eps:?})",
            stringify!($a),
            stringify!($b),
            (a - b).abs(),
        );
    }};
}
