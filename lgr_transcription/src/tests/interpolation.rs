use nalgebra::{DMatrix, DVector};

use crate::{assert_approx_eq, prelude::*};

#[test]
fn test_interpolation_is_exact_for_polynomials() {
    let nodes = [-1.0, -0.5, 0.2, 0.6, 1.0];
    let values = DVector::from_iterator(5, nodes.iter().map(|t| 2.0 * t * t * t - t + 0.5));
    let targets = [-0.9, -0.1, 0.35, 0.99];
    let interp = BaryLagrangeInterpolator::new(&nodes)
        .unwrap()
        .with_interp_points(&targets)
        .unwrap();
    let out = interp.interpolate(&values).unwrap();
    for (t, v) in targets.iter().zip(out.iter()) {
        assert_approx_eq!(*v, 2.0 * t * t * t - t + 0.5, 1.0e-12);
    }
}

#[test]
fn test_interpolation_at_a_node_returns_nodal_value() {
    let nodes = [0.0, 1.0, 2.0];
    let values = DVector::from_vec(vec![3.0, -1.0, 7.0]);
    let interp = BaryLagrangeInterpolator::new(&nodes).unwrap();
    let out = interp.interpolate_at(&values, &[1.0, 2.0]).unwrap();
    assert_eq!(out[0], -1.0);
    assert_eq!(out[1], 7.0);
}

#[test]
fn test_interpolate_columns() {
    let nodes = [-1.0, 0.0, 1.0];
    let values = DMatrix::from_fn(3, 2, |i, j| {
        let t = nodes[i];
        if j == 0 { t } else { t * t }
    });
    let interp = BaryLagrangeInterpolator::new(&nodes)
        .unwrap()
        .with_interp_points(&[0.5])
        .unwrap();
    let out = interp.interpolate_columns(&values).unwrap();
    assert_eq!(out.shape(), (1, 2));
    assert_approx_eq!(out[(0, 0)], 0.5, 1.0e-14);
    assert_approx_eq!(out[(0, 1)], 0.25, 1.0e-14);
}

#[test]
fn test_interpolator_rejects_bad_input() {
    assert!(BaryLagrangeInterpolator::new(&[1.0]).is_err());
    assert!(BaryLagrangeInterpolator::new(&[0.0, 1.0, 0.5]).is_err());
    let interp = BaryLagrangeInterpolator::new(&[0.0, 1.0]).unwrap();
    assert!(interp.interpolate_at(&DVector::zeros(3), &[0.5]).is_err());
    // no target points configured
    assert!(interp.interpolate(&DVector::zeros(2)).is_err());
}
