use test_case::test_case;

use crate::{assert_approx_eq, prelude::*};

#[test]
fn test_lgr_nodes_structure_for_every_supported_degree() {
    for n in 3..=15 {
        let nodes = compute_single_seg_lgr_nodes(n, 100).unwrap();
        assert_eq!(nodes.points.len(), n + 1, "n = {n}");
        assert_eq!(nodes.weights.len(), n, "n = {n}");
        assert_approx_eq!(nodes.points[0], -1.0, 1.0e-14);
        assert_eq!(nodes.points[n], 1.0);
        assert!(nodes.points.as_slice().windows(2).all(|w| w[1] > w[0]), "n = {n}");
        assert_approx_eq!(nodes.weights.sum(), 2.0, 1.0e-9);
    }
}

#[test_case(1; "one point")]
#[test_case(2; "two points")]
#[test_case(3; "three points")]
fn test_lgr_nodes_known_values(n: usize) {
    // LGR points are the roots of P_{n-1} + P_n
    let expected: &[f64] = match n {
        1 => &[-1.0],
        2 => &[-1.0, 1.0 / 3.0],
        _ => &[-1.0, (1.0 - 6.0_f64.sqrt()) / 5.0, (1.0 + 6.0_f64.sqrt()) / 5.0],
    };
    let nodes = compute_single_seg_lgr_nodes(n, 100).unwrap();
    for (got, want) in nodes.points.iter().zip(expected) {
        assert_approx_eq!(*got, *want, 1.0e-12);
    }
    // first weight is 2 / n^2
    assert_approx_eq!(nodes.weights[0], 2.0 / (n * n) as f64, 1.0e-12);
}

#[test]
fn test_lgr_quadrature_is_exact_to_degree_2n_minus_2() {
    let n = 5;
    let nodes = compute_single_seg_lgr_nodes(n, 100).unwrap();
    for degree in 0..=(2 * n - 2) {
        let integral: f64 = (0..n).map(|k| nodes.weights[k] * nodes.points[k].powi(degree as i32)).sum();
        let exact = if degree % 2 == 0 {
            2.0 / (degree + 1) as f64
        } else {
            0.0
        };
        assert_approx_eq!(integral, exact, 1.0e-12);
    }
}

#[test]
fn test_lgr_zero_points_is_an_error() {
    assert!(compute_single_seg_lgr_nodes(0, 100).is_err());
}

#[test]
fn test_lgr_iteration_cap_is_reported() {
    let err = compute_single_seg_lgr_nodes(12, 1).unwrap_err();
    assert!(matches!(
        err,
        TranscriptionError::LgrNotConverged {
            num_points: 12,
            max_iters: 1
        }
    ));
}

#[test_case(&[-1.0, 1.0], true; "single interval")]
#[test_case(&[-1.0, -0.2, 0.5, 1.0], true; "three intervals")]
#[test_case(&[-1.0, 0.5, 0.2, 1.0], false; "not increasing")]
#[test_case(&[-0.9, 1.0], false; "bad start")]
#[test_case(&[-1.0, 0.9], false; "bad end")]
#[test_case(&[-1.0], false; "too short")]
fn test_is_valid_mesh_fractions(fractions: &[f64], valid: bool) {
    assert_eq!(is_valid_mesh_fractions(fractions), valid);
}

#[test]
fn test_multi_segment_nodes_layout() {
    let disc = compute_multi_segment_lgr_nodes(&[-1.0, 0.0, 1.0], &[4, 5], 100).unwrap();
    assert_eq!(disc.points.len(), 10);
    assert_eq!(disc.weights.len(), 9);
    assert_eq!(disc.diff_matrix.shape(), (9, 10));
    assert_approx_eq!(disc.points[0], -1.0, 1.0e-14);
    // second interval starts at its left boundary
    assert_approx_eq!(disc.points[4], 0.0, 1.0e-14);
    assert_eq!(disc.points[9], 1.0);
    assert_approx_eq!(disc.weights.sum(), 2.0, 1.0e-9);
    // no coupling between the first interval's rows and the second's interior columns
    for (r, c, _) in disc.diff_matrix.iter() {
        if r < 4 {
            assert!(c <= 4, "row {r} reaches column {c}");
        } else {
            assert!(c >= 4, "row {r} reaches column {c}");
        }
    }
}

#[test]
fn test_multi_segment_diff_matrix_differentiates_polynomials() {
    let disc = compute_multi_segment_lgr_nodes(&[-1.0, -0.3, 1.0], &[4, 6], 100).unwrap();
    let cubic = disc.points.map(|t| t.powi(3) - 2.0 * t);
    let derivative = disc.diff_matrix.mul_vector(&cubic).unwrap();
    for k in 0..disc.weights.len() {
        let t = disc.points[k];
        assert_approx_eq!(derivative[k], 3.0 * t * t - 2.0, 1.0e-9);
    }
}

#[test]
fn test_multi_segment_rejects_malformed_mesh() {
    let err = compute_multi_segment_lgr_nodes(&[-1.0, 0.5, 0.2, 1.0], &[3, 3, 3], 100).unwrap_err();
    assert!(matches!(
        err,
        TranscriptionError::Config(ConfigError::MalformedMesh { .. })
    ));
}

#[test]
fn test_multi_segment_rejects_length_mismatch() {
    let err = compute_multi_segment_lgr_nodes(&[-1.0, 0.0, 1.0], &[3], 100).unwrap_err();
    assert!(matches!(
        err,
        TranscriptionError::Config(ConfigError::MeshLengthMismatch { .. })
    ));
}

#[test]
fn test_lagrange_diff_matrix_rows_sum_to_zero() {
    let nodes = [-1.0, -0.4, 0.1, 0.7, 1.0];
    let diff = lagrange_diff_matrix(&nodes).unwrap().to_dense();
    for r in 0..nodes.len() {
        assert_approx_eq!(diff.row(r).sum(), 0.0, 1.0e-12);
    }
}

#[test]
fn test_lagrange_diff_matrix_rejects_repeated_nodes() {
    assert!(lagrange_diff_matrix(&[-1.0, 0.0, 0.0, 1.0]).is_err());
}
