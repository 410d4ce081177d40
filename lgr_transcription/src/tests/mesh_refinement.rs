use nalgebra::{DMatrix, DVector, dmatrix};
use test_case::test_case;

use crate::{assert_approx_eq, prelude::*};

#[test_case(1.0e-8, 5, IntervalRefinement::Unchanged; "within tolerance")]
#[test_case(1.0e-6, 5, IntervalRefinement::Unchanged; "exactly at tolerance")]
#[test_case(1.0e-3, 5, IntervalRefinement::Raised { num_points: 10 }; "raised by log ratio")]
#[test_case(1.1e-6, 5, IntervalRefinement::Raised { num_points: 6 }; "raised by at least one")]
#[test_case(1.0, 8, IntervalRefinement::Subdivided { num_sub_intervals: 5, num_points: 3 }; "split past max degree")]
#[test_case(1.0e-4, 13, IntervalRefinement::Subdivided { num_sub_intervals: 5, num_points: 3 }; "split near max degree")]
#[test_case(f64::INFINITY, 5, IntervalRefinement::Subdivided { num_sub_intervals: 14, num_points: 3 }; "infinite error splits into max pieces")]
#[test_case(f64::NAN, 5, IntervalRefinement::Subdivided { num_sub_intervals: 14, num_points: 3 }; "nan error splits into max pieces")]
#[test_case(1.0e300, 5, IntervalRefinement::Subdivided { num_sub_intervals: 14, num_points: 3 }; "huge error caps the piece count")]
fn test_interval_refinement(err: f64, num_points: usize, expected: IntervalRefinement) {
    let got = interval_refinement(err, 1.0e-6, num_points, 3, 14);
    assert_eq!(got, expected);
    assert_eq!(got.is_refined(), expected != IntervalRefinement::Unchanged);
}

#[test]
fn test_split_uses_at_least_two_pieces() {
    let got = interval_refinement(1.0e-5, 1.0e-6, 14, 10, 14);
    assert_eq!(
        got,
        IntervalRefinement::Subdivided {
            num_sub_intervals: 2,
            num_points: 10
        }
    );
}

#[test]
fn test_overflowing_error_ratio_subdivides() {
    let got = interval_refinement(1.0e300, 1.0e-300, 5, 3, 14);
    assert_eq!(
        got,
        IntervalRefinement::Subdivided {
            num_sub_intervals: 14,
            num_points: 3
        }
    );
}

#[test]
fn test_equal_sub_interval_bounds() {
    let bounds = equal_sub_interval_bounds(-1.0, 1.0, 4);
    assert_eq!(bounds.len(), 4);
    for (got, expected) in bounds.iter().zip([-0.5, 0.0, 0.5, 1.0]) {
        assert_approx_eq!(*got, expected, 1.0e-15);
    }
    let bounds = equal_sub_interval_bounds(0.1, 0.7, 3);
    assert_eq!(*bounds.last().unwrap(), 0.7);
}

#[test]
fn test_integration_matrix_integrates_polynomials() {
    let nodes = [-1.0, -0.5, 0.2, 1.0];
    let integration = collocation_integration_matrix(&nodes).unwrap();
    assert_eq!(integration.shape(), (3, 3));

    // p = x^3 - x, p' = 3x^2 - 1 at the first three nodes
    let p = |x: f64| x * x * x - x;
    let dp = DVector::from_iterator(3, nodes[..3].iter().map(|x| 3.0 * x * x - 1.0));
    let integral = integration * dp;
    for k in 0..3 {
        assert_approx_eq!(integral[k], p(nodes[k + 1]) - p(nodes[0]), 1.0e-12);
    }
}

#[test]
fn test_integration_matrix_needs_two_nodes() {
    assert!(collocation_integration_matrix(&[0.0]).is_err());
}

#[test]
fn test_max_relative_error() {
    let initial = DVector::from_vec(vec![1.0, 0.0]);
    let states = dmatrix![1.5, 2.0; 2.0, -4.0];
    let integral = dmatrix![0.5, 2.1; 1.0, -4.0];
    let err = max_relative_error(&initial, &states, &integral).unwrap();
    assert_approx_eq!(err, 0.1 / 5.0, 1.0e-14);
}

#[test]
fn test_max_relative_error_is_zero_for_exact_integral() {
    let initial = DVector::from_element(1, 3.0);
    let states = dmatrix![4.0; 5.0];
    let integral = dmatrix![1.0; 2.0];
    assert_eq!(max_relative_error(&initial, &states, &integral).unwrap(), 0.0);
}

#[test]
fn test_max_relative_error_shape_checks() {
    let initial = DVector::from_element(2, 0.0);
    assert!(max_relative_error(&initial, &DMatrix::zeros(2, 2), &DMatrix::zeros(3, 2)).is_err());
    assert!(max_relative_error(&initial, &DMatrix::zeros(2, 3), &DMatrix::zeros(2, 3)).is_err());
}
