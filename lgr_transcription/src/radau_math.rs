//! Legendre-Gauss-Radau nodes, quadrature weights and differentiation
//! matrices.
//!
//! Conventions used throughout the crate: an interval with `n` collocation
//! points owns `n` LGR points (the first is `-1`, none is `+1`) plus the
//! interval end, which is a state point but not a collocation point.

use nalgebra::DVector;
use tracing::debug;

use crate::{
    error::{ConfigError, TranscriptionError},
    sparse::{BlockMode, SparseMatrix},
};

/// Nodes and weights of one LGR segment on `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LgrNodes {
    /// `n` LGR points followed by the terminal `1.0`.
    pub points: DVector<f64>,
    /// Quadrature weights of the `n` LGR points; they sum to 2.
    pub weights: DVector<f64>,
}

/// Discretization of a whole multi-interval mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct LgrDiscretization {
    /// All collocation points in normalized time followed by the terminal `1.0`.
    pub points: DVector<f64>,
    /// One weight per collocation point.
    pub weights: DVector<f64>,
    /// `num_collocation x (num_collocation + 1)` block differentiation matrix.
    pub diff_matrix: SparseMatrix,
}

impl LgrDiscretization {
    pub fn num_collocation_points(&self) -> usize {
        self.weights.len()
    }
}

/// Computes `num_points` LGR points with Newton iteration on the Legendre
/// three-term recurrence, seeded with Chebyshev-Gauss-Radau points.
///
/// Returns `num_points + 1` points (the last is exactly `1.0`) and
/// `num_points` weights. Fails with [`TranscriptionError::LgrNotConverged`]
/// if the nodal update is still above ten machine epsilons after `max_iters`
/// iterations.
pub fn compute_single_seg_lgr_nodes(
    num_points: usize,
    max_iters: usize,
) -> Result<LgrNodes, TranscriptionError> {
    if num_points == 0 {
        return Err(ConfigError::NonPositiveCount {
            name: "num_points",
            value: 0,
        }
        .into());
    }
    let n1 = num_points;
    let n1f = n1 as f64;

    let mut x: Vec<f64> = (0..n1)
        .map(|k| -(2.0 * std::f64::consts::PI * k as f64 / (2.0 * n1f - 1.0)).cos())
        .collect();
    // p[d] holds P_d evaluated at every free node, for d = 0..=n1
    let mut p = vec![vec![0.0; n1]; n1 + 1];

    let mut converged = n1 == 1;
    let mut iters = 0;
    while !converged {
        if iters >= max_iters {
            return Err(TranscriptionError::LgrNotConverged {
                num_points,
                max_iters,
            });
        }
        iters += 1;

        legendre_table(&x, &mut p);

        let mut max_update: f64 = 0.0;
        for k in 1..n1 {
            let x_old = x[k];
            let (pa, pb) = (p[n1 - 1][k], p[n1][k]);
            let x_new = x_old - ((1.0 - x_old) / n1f) * (pa + pb) / (pa - pb);
            max_update = max_update.max((x_new - x_old).abs());
            x[k] = x_new;
        }
        converged = max_update < 10.0 * f64::EPSILON;
    }
    legendre_table(&x, &mut p);

    let mut weights = DVector::zeros(n1);
    weights[0] = 2.0 / (n1f * n1f);
    for k in 1..n1 {
        let denom = n1f * p[n1 - 1][k];
        weights[k] = (1.0 - x[k]) / (denom * denom);
    }

    let mut points = DVector::zeros(n1 + 1);
    for (k, xk) in x.iter().enumerate() {
        points[k] = *xk;
    }
    points[n1] = 1.0;

    Ok(LgrNodes { points, weights })
}

/// Fills `p[d][k] = P_d(x[k])`; the node at index 0 is fixed at `-1`.
fn legendre_table(x: &[f64], p: &mut [Vec<f64>]) {
    let max_degree = p.len() - 1;
    for d in 0..=max_degree {
        p[d][0] = if d % 2 == 0 { 1.0 } else { -1.0 };
    }
    for k in 1..x.len() {
        p[0][k] = 1.0;
        if max_degree >= 1 {
            p[1][k] = x[k];
        }
        for d in 2..=max_degree {
            let df = d as f64;
            p[d][k] = ((2.0 * df - 1.0) * x[k] * p[d - 1][k] - (df - 1.0) * p[d - 2][k]) / df;
        }
    }
}

/// True if `fractions` starts at -1, ends at 1 and strictly increases.
pub fn is_valid_mesh_fractions(fractions: &[f64]) -> bool {
    fractions.len() >= 2
        && fractions[0] == -1.0
        && fractions[fractions.len() - 1] == 1.0
        && fractions.windows(2).all(|w| w[1] > w[0])
}

/// Builds the global LGR discretization of a multi-interval mesh.
///
/// Each interval's nodes and weights are mapped from `[-1, 1]` to its
/// fraction range; its differentiation block (the collocation rows of the
/// Lagrange differentiation matrix on the interval's points plus its end)
/// is placed at accumulating row/column offsets, so adjacent blocks share
/// the column of the shared boundary point.
///
/// A malformed mesh is reported as [`ConfigError::MalformedMesh`] without
/// computing anything.
pub fn compute_multi_segment_lgr_nodes(
    fractions: &[f64],
    num_points_per_interval: &[usize],
    max_iters: usize,
) -> Result<LgrDiscretization, TranscriptionError> {
    if !is_valid_mesh_fractions(fractions) {
        return Err(ConfigError::MalformedMesh {
            fractions: fractions.to_vec(),
        }
        .into());
    }
    if num_points_per_interval.len() + 1 != fractions.len() {
        return Err(ConfigError::MeshLengthMismatch {
            num_fractions: fractions.len(),
            num_intervals: num_points_per_interval.len(),
        }
        .into());
    }

    let total: usize = num_points_per_interval.iter().sum();
    let mut points = DVector::zeros(total + 1);
    let mut weights = DVector::zeros(total);
    let mut diff_matrix = SparseMatrix::new(total, total + 1);

    let mut offset = 0;
    for (interval, &n) in num_points_per_interval.iter().enumerate() {
        let (lo, hi) = (fractions[interval], fractions[interval + 1]);
        let half_len = (hi - lo) / 2.0;
        let seg = compute_single_seg_lgr_nodes(n, max_iters)?;

        let mapped: DVector<f64> = seg.points.map(|x| half_len * (x + 1.0) + lo);
        for k in 0..n {
            points[offset + k] = mapped[k];
            weights[offset + k] = seg.weights[k] * half_len;
        }

        let block = lagrange_diff_matrix(mapped.as_slice())?;
        for (r, c, v) in block.iter().filter(|&(r, _, _)| r < n) {
            diff_matrix.set(offset + r, offset + c, v)?;
        }
        offset += n;
    }
    points[total] = 1.0;

    debug!(
        intervals = num_points_per_interval.len(),
        collocation_points = total,
        diff_nnz = diff_matrix.nnz(),
        "Built multi-segment LGR discretization"
    );

    Ok(LgrDiscretization {
        points,
        weights,
        diff_matrix,
    })
}

/// Barycentric weights `w_j = 1 / prod_{k != j} (x_j - x_k)`.
pub fn barycentric_weights(nodes: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        nodes.len(),
        nodes.iter().enumerate().map(|(j, xj)| {
            let prod: f64 = nodes
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != j)
                .map(|(_, xk)| xj - xk)
                .product();
            1.0 / prod
        }),
    )
}

/// Lagrange differentiation matrix for an arbitrary node set.
///
/// Off-diagonal entries come from the barycentric weights; the diagonal is
/// the negative row sum, since the derivative of a constant is zero.
pub fn lagrange_diff_matrix(nodes: &[f64]) -> Result<SparseMatrix, TranscriptionError> {
    let n = nodes.len();
    if nodes.windows(2).any(|w| w[1] == w[0]) {
        return Err(TranscriptionError::SingularMatrix {
            context: "lagrange_diff_matrix (repeated nodes)",
        });
    }
    let w = barycentric_weights(nodes);
    let mut d = SparseMatrix::new(n, n);
    for i in 0..n {
        let mut row_sum = 0.0;
        for j in (0..n).filter(|&j| j != i) {
            let v = (w[j] / w[i]) / (nodes[i] - nodes[j]);
            row_sum += v;
            d.write_entry(i, j, v, BlockMode::Replace);
        }
        d.write_entry(i, i, -row_sum, BlockMode::Replace);
    }
    Ok(d)
}
