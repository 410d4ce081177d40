use nalgebra::{DMatrix, DVector};

use crate::{error::TranscriptionError, radau_math::barycentric_weights};

/// Barycentric Lagrange interpolation through a fixed set of abscissae.
///
/// The interpolation matrix for a set of targets is computed once in
/// [`Self::with_interp_points`] and then applied to any number of value
/// columns.
#[derive(Debug, Clone, PartialEq)]
pub struct BaryLagrangeInterpolator {
    ind_var: DVector<f64>,
    weights: DVector<f64>,
    interp_points: Option<DVector<f64>>,
    barycentric_matrix: Option<DMatrix<f64>>,
}

fn is_strictly_increasing(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[1] > w[0])
}

impl BaryLagrangeInterpolator {
    /// Needs at least two strictly increasing abscissae.
    pub fn new(ind_var: &[f64]) -> Result<Self, TranscriptionError> {
        if ind_var.len() < 2 {
            return Err(TranscriptionError::length(
                "BaryLagrangeInterpolator::new (at least 2 abscissae)",
                2,
                ind_var.len(),
            ));
        }
        if !is_strictly_increasing(ind_var) {
            return Err(TranscriptionError::SingularMatrix {
                context: "BaryLagrangeInterpolator::new (abscissae not strictly increasing)",
            });
        }
        Ok(Self {
            ind_var: DVector::from_column_slice(ind_var),
            weights: barycentric_weights(ind_var),
            interp_points: None,
            barycentric_matrix: None,
        })
    }

    /// Precomputes the interpolation matrix for `points`.
    pub fn with_interp_points(mut self, points: &[f64]) -> Result<Self, TranscriptionError> {
        self.set_interp_points(points)?;
        Ok(self)
    }

    pub fn set_interp_points(&mut self, points: &[f64]) -> Result<(), TranscriptionError> {
        if !is_strictly_increasing(points) {
            return Err(TranscriptionError::SingularMatrix {
                context: "BaryLagrangeInterpolator::set_interp_points (targets not strictly increasing)",
            });
        }
        self.barycentric_matrix = Some(self.barycentric_matrix_for(points));
        self.interp_points = Some(DVector::from_column_slice(points));
        Ok(())
    }

    pub fn num_ind_var(&self) -> usize {
        self.ind_var.len()
    }

    pub fn num_interp_points(&self) -> usize {
        self.interp_points.as_ref().map_or(0, |p| p.len())
    }

    pub fn ind_var(&self) -> &DVector<f64> {
        &self.ind_var
    }

    /// Row `r` maps values at the abscissae to the value at `points[r]`.
    fn barycentric_matrix_for(&self, points: &[f64]) -> DMatrix<f64> {
        let n = self.ind_var.len();
        let mut mat = DMatrix::zeros(points.len(), n);
        for (r, &t) in points.iter().enumerate() {
            if let Some(c) = self.ind_var.iter().position(|&x| x == t) {
                mat[(r, c)] = 1.0;
                continue;
            }
            let mut norm = 0.0;
            for c in 0..n {
                let v = self.weights[c] / (t - self.ind_var[c]);
                mat[(r, c)] = v;
                norm += v;
            }
            mat.row_mut(r).unscale_mut(norm);
        }
        mat
    }

    /// Interpolates one value per abscissa at the precomputed targets.
    pub fn interpolate(&self, values: &DVector<f64>) -> Result<DVector<f64>, TranscriptionError> {
        let mat = self
            .barycentric_matrix
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("BaryLagrangeInterpolator interp points"))?;
        self.check_values(values.len())?;
        Ok(mat * values)
    }

    /// Interpolates every column of `values` (one row per abscissa).
    pub fn interpolate_columns(&self, values: &DMatrix<f64>) -> Result<DMatrix<f64>, TranscriptionError> {
        let mat = self
            .barycentric_matrix
            .as_ref()
            .ok_or(TranscriptionError::NotInitialized("BaryLagrangeInterpolator interp points"))?;
        self.check_values(values.nrows())?;
        Ok(mat * values)
    }

    /// One-shot interpolation at arbitrary targets.
    pub fn interpolate_at(
        &self,
        values: &DVector<f64>,
        points: &[f64],
    ) -> Result<DVector<f64>, TranscriptionError> {
        self.check_values(values.len())?;
        Ok(self.barycentric_matrix_for(points) * values)
    }

    fn check_values(&self, got: usize) -> Result<(), TranscriptionError> {
        if got != self.ind_var.len() {
            return Err(TranscriptionError::length(
                "BaryLagrangeInterpolator::interpolate",
                self.ind_var.len(),
                got,
            ));
        }
        Ok(())
    }
}
