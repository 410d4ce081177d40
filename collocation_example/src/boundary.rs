use lgr_transcription::prelude::*;
use nalgebra::DVector;

/// Pins the initial time, final time and initial state.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialValueBoundary {
    pub t0: f64,
    pub tf: f64,
    pub x0: DVector<f64>,
}

impl InitialValueBoundary {
    pub fn new(t0: f64, tf: f64, x0: &[f64]) -> Self {
        Self {
            t0,
            tf,
            x0: DVector::from_column_slice(x0),
        }
    }
}

impl BoundaryFunction for InitialValueBoundary {
    fn num_functions(&self) -> usize {
        2 + self.x0.len()
    }

    fn evaluate(
        &self,
        t0: f64,
        initial_state: &DVector<f64>,
        tf: f64,
        _final_state: &DVector<f64>,
        _static_params: &DVector<f64>,
    ) -> anyhow::Result<DVector<f64>> {
        if initial_state.len() != self.x0.len() {
            anyhow::bail!(
                "Initial state has {} entries, boundary expects {}",
                initial_state.len(),
                self.x0.len()
            );
        }
        let mut out = DVector::zeros(self.num_functions());
        out[0] = t0 - self.t0;
        out[1] = tf - self.tf;
        out.rows_mut(2, self.x0.len()).copy_from(&(initial_state - &self.x0));
        Ok(out)
    }
}
