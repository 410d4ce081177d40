//! Mesh-refinement policy and the error-estimate arithmetic that does not
//! touch the user function.

use nalgebra::{DMatrix, DVector};

use crate::{error::TranscriptionError, radau_math::lagrange_diff_matrix};

/// What refinement does with one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalRefinement {
    /// Error within tolerance.
    Unchanged,
    /// Same interval, more collocation points.
    Raised { num_points: usize },
    /// `num_sub_intervals` equal pieces, each with `num_points` points.
    Subdivided {
        num_sub_intervals: usize,
        num_points: usize,
    },
}

impl IntervalRefinement {
    pub fn is_refined(&self) -> bool {
        !matches!(self, IntervalRefinement::Unchanged)
    }
}

/// Decides how to refine an interval with `num_points` collocation points
/// whose estimated error is `max_rel_error`.
///
/// The degree grows by `ceil(ln(err / tol) / ln(num_points))`; if that
/// exceeds `max_degree`, the interval is split into
/// `max(2, ceil(new_degree / min_degree))` pieces at `min_degree`, at most
/// `max_degree` of them. A non-finite or NaN error splits into the maximum
/// number of pieces.
pub fn interval_refinement(
    max_rel_error: f64,
    tolerance: f64,
    num_points: usize,
    min_degree: usize,
    max_degree: usize,
) -> IntervalRefinement {
    if max_rel_error <= tolerance {
        return IntervalRefinement::Unchanged;
    }
    let growth = ((max_rel_error / tolerance).ln() / (num_points as f64).ln()).ceil();
    let growth = if growth.is_nan() { f64::INFINITY } else { growth.max(1.0) };
    let new_degree = num_points as f64 + growth;
    if new_degree <= max_degree as f64 {
        IntervalRefinement::Raised {
            num_points: new_degree as usize,
        }
    } else {
        let pieces = (new_degree / min_degree as f64).ceil().min(max_degree as f64) as usize;
        IntervalRefinement::Subdivided {
            num_sub_intervals: pieces.max(2),
            num_points: min_degree,
        }
    }
}

/// Interior and end boundaries of `num_sub` equal pieces of `[lo, hi]`
/// (`lo` excluded). The last boundary is exactly `hi`.
pub fn equal_sub_interval_bounds(lo: f64, hi: f64, num_sub: usize) -> Vec<f64> {
    let len = hi - lo;
    (1..=num_sub)
        .map(|j| {
            if j == num_sub {
                hi
            } else {
                lo + j as f64 * len / num_sub as f64
            }
        })
        .collect()
}

/// Inverse of the collocation block of the Lagrange differentiation matrix
/// on `nodes`: rows `0..n-1` (the collocation points), columns `1..n`
/// (every node but the first).
///
/// Multiplying it by the dynamics at the collocation points integrates the
/// polynomial from `nodes[0]` to every later node.
pub fn collocation_integration_matrix(nodes: &[f64]) -> Result<DMatrix<f64>, TranscriptionError> {
    let n = nodes.len();
    if n < 2 {
        return Err(TranscriptionError::length(
            "collocation_integration_matrix (at least 2 nodes)",
            2,
            n,
        ));
    }
    let diff = lagrange_diff_matrix(nodes)?;
    let block = diff.to_dense_block(0, n - 2, 1, n - 1)?;
    block
        .try_inverse()
        .ok_or(TranscriptionError::SingularMatrix {
            context: "collocation_integration_matrix",
        })
}

/// Max over state variables of `max_k |x_k - x0 - integral_k| / (1 + max_k |x_k|)`,
/// where the state magnitude also includes `|x0|`.
///
/// `states` and `integral` hold one row per node after the first.
pub fn max_relative_error(
    initial_state: &DVector<f64>,
    states: &DMatrix<f64>,
    integral: &DMatrix<f64>,
) -> Result<f64, TranscriptionError> {
    if states.shape() != integral.shape() {
        return Err(TranscriptionError::shape(
            "max_relative_error",
            states.shape(),
            integral.shape(),
        ));
    }
    if states.ncols() != initial_state.len() {
        return Err(TranscriptionError::length(
            "max_relative_error",
            states.ncols(),
            initial_state.len(),
        ));
    }

    let mut max_abs_state = initial_state.abs();
    let mut max_abs_error = DVector::<f64>::zeros(initial_state.len());
    for k in 0..states.nrows() {
        for v in 0..states.ncols() {
            let x = states[(k, v)];
            let err = (x - initial_state[v] - integral[(k, v)]).abs();
            max_abs_error[v] = max_abs_error[v].max(err);
            max_abs_state[v] = max_abs_state[v].max(x.abs());
        }
    }

    Ok(max_abs_error
        .iter()
        .zip(max_abs_state.iter())
        .map(|(e, s)| e / (1.0 + s))
        .fold(0.0, f64::max))
}
