//! Flat NLP decision vector in the Betts ordering:
//!
//! `z = [t0, tf, y(0,0) u(0,0), y(0,1) u(0,1), ..., y(n,0), s_1..s_p, w_1..w_q]`
//!
//! where `y(m,s)`/`u(m,s)` are the state and control at mesh point `m` and
//! stage `s`, `s` the static parameters and `w` the integrals.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};

use crate::error::{ConfigError, TranscriptionError};

/// Sizes needed to lay out a decision vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecVecDims {
    pub num_state_vars: usize,
    pub num_control_vars: usize,
    pub num_integral_params: usize,
    pub num_static_params: usize,
    pub num_state_mesh_points: usize,
    pub num_control_mesh_points: usize,
    pub num_state_stage_points: usize,
    pub num_control_stage_points: usize,
}

impl DecVecDims {
    /// Radau layout: one more state mesh point than control mesh points and
    /// no interior stages.
    pub fn radau(
        num_state_vars: usize,
        num_control_vars: usize,
        num_integral_params: usize,
        num_static_params: usize,
        num_collocation_points: usize,
    ) -> Self {
        Self {
            num_state_vars,
            num_control_vars,
            num_integral_params,
            num_static_params,
            num_state_mesh_points: num_collocation_points + 1,
            num_control_mesh_points: num_collocation_points,
            num_state_stage_points: 0,
            num_control_stage_points: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecVecTypeBetts {
    dims: DecVecDims,
    values: DVector<f64>,

    num_state_points: usize,
    num_control_points: usize,
    num_state_params: usize,
    num_control_params: usize,
    num_decision_params: usize,
    has_control_at_final_mesh: bool,

    static_range: Range<usize>,
    integral_range: Range<usize>,
}

/// The only decision-vector layout the crate uses.
pub type DecisionVector = DecVecTypeBetts;

const TIME_START_IDX: usize = 0;
const TIME_STOP_IDX: usize = 1;

impl DecVecTypeBetts {
    /// Validates the sizes, computes every chunk index and zero-fills the
    /// vector.
    pub fn initialize(dims: DecVecDims) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("num_state_vars", dims.num_state_vars),
            ("num_state_mesh_points", dims.num_state_mesh_points),
            ("num_control_mesh_points", dims.num_control_mesh_points),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositiveCount { name, value });
            }
        }
        let num_state_mesh = dims.num_state_mesh_points;
        if dims.num_control_mesh_points != num_state_mesh && dims.num_control_mesh_points + 1 != num_state_mesh {
            return Err(ConfigError::ControlMeshMismatch {
                state: num_state_mesh,
                control: dims.num_control_mesh_points,
            });
        }
        if dims.num_state_stage_points != dims.num_control_stage_points {
            return Err(ConfigError::StageMismatch {
                state: dims.num_state_stage_points,
                control: dims.num_control_stage_points,
            });
        }

        let num_state_points =
            (dims.num_state_mesh_points - 1) * (1 + dims.num_state_stage_points) + 1;
        let has_control_at_final_mesh = dims.num_state_mesh_points == dims.num_control_mesh_points;
        let num_control_points = if has_control_at_final_mesh {
            (dims.num_control_mesh_points - 1) * (1 + dims.num_control_stage_points) + 1
        } else {
            dims.num_control_mesh_points * (1 + dims.num_control_stage_points)
        };

        let num_state_params = dims.num_state_vars * num_state_points;
        let num_control_params = dims.num_control_vars * num_control_points;
        let num_decision_params = num_state_params
            + num_control_params
            + dims.num_integral_params
            + dims.num_static_params
            + 2;

        let static_start = TIME_STOP_IDX + 1 + num_state_params + num_control_params;
        let static_range = static_start..static_start + dims.num_static_params;
        let integral_range = static_range.end..static_range.end + dims.num_integral_params;

        Ok(Self {
            dims,
            values: DVector::zeros(num_decision_params),
            num_state_points,
            num_control_points,
            num_state_params,
            num_control_params,
            num_decision_params,
            has_control_at_final_mesh,
            static_range,
            integral_range,
        })
    }

    pub fn dims(&self) -> &DecVecDims {
        &self.dims
    }
    pub fn num_decision_params(&self) -> usize {
        self.num_decision_params
    }
    pub fn num_state_points(&self) -> usize {
        self.num_state_points
    }
    pub fn num_control_points(&self) -> usize {
        self.num_control_points
    }
    pub fn num_state_params(&self) -> usize {
        self.num_state_params
    }
    pub fn num_control_params(&self) -> usize {
        self.num_control_params
    }
    pub fn num_state_vars(&self) -> usize {
        self.dims.num_state_vars
    }
    pub fn num_control_vars(&self) -> usize {
        self.dims.num_control_vars
    }
    pub fn has_control_at_final_mesh(&self) -> bool {
        self.has_control_at_final_mesh
    }

    // ---- whole vector ----

    pub fn set_decision_vector(&mut self, values: &DVector<f64>) -> Result<(), TranscriptionError> {
        if values.len() != self.num_decision_params {
            return Err(TranscriptionError::length(
                "DecVecTypeBetts::set_decision_vector",
                self.num_decision_params,
                values.len(),
            ));
        }
        self.values.copy_from(values);
        Ok(())
    }

    pub fn decision_vector(&self) -> &DVector<f64> {
        &self.values
    }

    // ---- time ----

    pub fn time_idxs(&self) -> [usize; 2] {
        [TIME_START_IDX, TIME_STOP_IDX]
    }
    pub fn initial_time_idx(&self) -> usize {
        TIME_START_IDX
    }
    pub fn final_time_idx(&self) -> usize {
        TIME_STOP_IDX
    }

    pub fn set_time_vector(&mut self, t0: f64, tf: f64) {
        self.values[TIME_START_IDX] = t0;
        self.values[TIME_STOP_IDX] = tf;
    }

    pub fn time_vector(&self) -> [f64; 2] {
        [self.first_time(), self.last_time()]
    }
    pub fn first_time(&self) -> f64 {
        self.values[TIME_START_IDX]
    }
    pub fn last_time(&self) -> f64 {
        self.values[TIME_STOP_IDX]
    }

    // ---- static and integral ----

    /// Empty when the phase has no static parameters.
    pub fn static_idxs(&self) -> Range<usize> {
        self.static_range.clone()
    }

    pub fn integral_idxs(&self) -> Range<usize> {
        self.integral_range.clone()
    }

    pub fn set_static_vector(&mut self, values: &DVector<f64>) -> Result<(), TranscriptionError> {
        let range = self.static_idxs();
        self.set_range("DecVecTypeBetts::set_static_vector", range, values)
    }

    pub fn static_vector(&self) -> DVector<f64> {
        self.values.rows_range(self.static_range.clone()).into_owned()
    }

    pub fn set_integral_vector(&mut self, values: &DVector<f64>) -> Result<(), TranscriptionError> {
        let range = self.integral_idxs();
        self.set_range("DecVecTypeBetts::set_integral_vector", range, values)
    }

    pub fn integral_vector(&self) -> DVector<f64> {
        self.values.rows_range(self.integral_range.clone()).into_owned()
    }

    fn set_range(
        &mut self,
        context: &'static str,
        range: Range<usize>,
        values: &DVector<f64>,
    ) -> Result<(), TranscriptionError> {
        if values.len() != range.len() {
            return Err(TranscriptionError::length(context, range.len(), values.len()));
        }
        self.values.rows_range_mut(range).copy_from(values);
        Ok(())
    }

    // ---- per-point index arithmetic ----

    fn point_block_start(&self, mesh_idx: usize, stage_idx: usize) -> usize {
        let num_state_and_control = self.dims.num_state_vars + self.dims.num_control_vars;
        TIME_STOP_IDX
            + mesh_idx * (self.dims.num_state_stage_points + 1) * num_state_and_control
            + stage_idx * num_state_and_control
            + 1
    }

    fn validate_mesh_stage(
        &self,
        context: &'static str,
        mesh_idx: usize,
        stage_idx: usize,
        num_mesh: usize,
    ) -> Result<(), TranscriptionError> {
        // the final mesh point carries no stage points
        let num_stage_slots = if mesh_idx + 1 == self.dims.num_state_mesh_points {
            1
        } else {
            self.dims.num_state_stage_points + 1
        };
        if mesh_idx >= num_mesh || stage_idx >= num_stage_slots {
            return Err(TranscriptionError::IndexOutOfRange {
                context,
                row: mesh_idx,
                col: stage_idx,
                nrows: num_mesh,
                ncols: num_stage_slots,
            });
        }
        Ok(())
    }

    /// Decision-vector indices of the state at `(mesh_idx, stage_idx)`.
    pub fn state_idxs_at_mesh_point(
        &self,
        mesh_idx: usize,
        stage_idx: usize,
    ) -> Result<Range<usize>, TranscriptionError> {
        self.validate_mesh_stage(
            "DecVecTypeBetts::state_idxs_at_mesh_point",
            mesh_idx,
            stage_idx,
            self.dims.num_state_mesh_points,
        )?;
        let start = self.point_block_start(mesh_idx, stage_idx);
        Ok(start..start + self.dims.num_state_vars)
    }

    /// Decision-vector indices of the control at `(mesh_idx, stage_idx)`;
    /// they directly follow the state of the same point.
    pub fn control_idxs_at_mesh_point(
        &self,
        mesh_idx: usize,
        stage_idx: usize,
    ) -> Result<Range<usize>, TranscriptionError> {
        self.validate_mesh_stage(
            "DecVecTypeBetts::control_idxs_at_mesh_point",
            mesh_idx,
            stage_idx,
            self.dims.num_control_mesh_points,
        )?;
        let start = self.point_block_start(mesh_idx, stage_idx) + self.dims.num_state_vars;
        Ok(start..start + self.dims.num_control_vars)
    }

    pub fn initial_state_idxs(&self) -> Result<Range<usize>, TranscriptionError> {
        self.state_idxs_at_mesh_point(0, 0)
    }

    pub fn final_state_idxs(&self) -> Result<Range<usize>, TranscriptionError> {
        self.state_idxs_at_mesh_point(self.dims.num_state_mesh_points - 1, 0)
    }

    pub fn state_vector(&self, mesh_idx: usize, stage_idx: usize) -> Result<DVector<f64>, TranscriptionError> {
        let range = self.state_idxs_at_mesh_point(mesh_idx, stage_idx)?;
        Ok(self.values.rows_range(range).into_owned())
    }

    pub fn set_state_vector(
        &mut self,
        mesh_idx: usize,
        stage_idx: usize,
        state: &DVector<f64>,
    ) -> Result<(), TranscriptionError> {
        let range = self.state_idxs_at_mesh_point(mesh_idx, stage_idx)?;
        self.set_range("DecVecTypeBetts::set_state_vector", range, state)
    }

    pub fn control_vector(&self, mesh_idx: usize, stage_idx: usize) -> Result<DVector<f64>, TranscriptionError> {
        let range = self.control_idxs_at_mesh_point(mesh_idx, stage_idx)?;
        Ok(self.values.rows_range(range).into_owned())
    }

    pub fn set_control_vector(
        &mut self,
        mesh_idx: usize,
        stage_idx: usize,
        control: &DVector<f64>,
    ) -> Result<(), TranscriptionError> {
        let range = self.control_idxs_at_mesh_point(mesh_idx, stage_idx)?;
        self.set_range("DecVecTypeBetts::set_control_vector", range, control)
    }

    pub fn first_state_vector(&self) -> Result<DVector<f64>, TranscriptionError> {
        self.state_vector(0, 0)
    }

    pub fn last_state_vector(&self) -> Result<DVector<f64>, TranscriptionError> {
        self.state_vector(self.dims.num_state_mesh_points - 1, 0)
    }

    // ---- bulk transfer ----

    /// `(mesh, stage)` of every state point, in row order of the state array.
    fn state_points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let stages = self.dims.num_state_stage_points;
        (0..self.dims.num_state_mesh_points - 1)
            .flat_map(move |m| (0..=stages).map(move |s| (m, s)))
            .chain(std::iter::once((self.dims.num_state_mesh_points - 1, 0)))
    }

    /// `(mesh, stage)` of every control point, in row order of the control
    /// array. The final mesh point only carries a control when the layout
    /// has one there.
    fn control_points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let stages = self.dims.num_control_stage_points;
        let num_loops = if self.has_control_at_final_mesh {
            self.dims.num_control_mesh_points - 1
        } else {
            self.dims.num_control_mesh_points
        };
        let terminal = self
            .has_control_at_final_mesh
            .then_some((num_loops, 0));
        (0..num_loops)
            .flat_map(move |m| (0..=stages).map(move |s| (m, s)))
            .chain(terminal)
    }

    /// `num_state_points x num_state_vars` array, one row per point.
    pub fn state_array(&self) -> Result<DMatrix<f64>, TranscriptionError> {
        let mut out = DMatrix::zeros(self.num_state_points, self.dims.num_state_vars);
        for (row, (m, s)) in self.state_points().enumerate() {
            let range = self.state_idxs_at_mesh_point(m, s)?;
            for (col, idx) in range.enumerate() {
                out[(row, col)] = self.values[idx];
            }
        }
        Ok(out)
    }

    pub fn set_state_array(&mut self, states: &DMatrix<f64>) -> Result<(), TranscriptionError> {
        let expected = (self.num_state_points, self.dims.num_state_vars);
        if states.shape() != expected {
            return Err(TranscriptionError::shape(
                "DecVecTypeBetts::set_state_array",
                expected,
                states.shape(),
            ));
        }
        let points: Vec<_> = self.state_points().collect();
        for (row, (m, s)) in points.into_iter().enumerate() {
            let range = self.state_idxs_at_mesh_point(m, s)?;
            for (col, idx) in range.enumerate() {
                self.values[idx] = states[(row, col)];
            }
        }
        Ok(())
    }

    /// `num_control_points x num_control_vars` array, one row per point.
    pub fn control_array(&self) -> Result<DMatrix<f64>, TranscriptionError> {
        let mut out = DMatrix::zeros(self.num_control_points, self.dims.num_control_vars);
        if self.dims.num_control_vars == 0 {
            return Ok(out);
        }
        for (row, (m, s)) in self.control_points().enumerate() {
            let range = self.control_idxs_at_mesh_point(m, s)?;
            for (col, idx) in range.enumerate() {
                out[(row, col)] = self.values[idx];
            }
        }
        Ok(out)
    }

    /// No-op for problems without controls.
    pub fn set_control_array(&mut self, controls: &DMatrix<f64>) -> Result<(), TranscriptionError> {
        if self.dims.num_control_vars == 0 {
            return Ok(());
        }
        let expected = (self.num_control_points, self.dims.num_control_vars);
        if controls.shape() != expected {
            return Err(TranscriptionError::shape(
                "DecVecTypeBetts::set_control_array",
                expected,
                controls.shape(),
            ));
        }
        let points: Vec<_> = self.control_points().collect();
        for (row, (m, s)) in points.into_iter().enumerate() {
            let range = self.control_idxs_at_mesh_point(m, s)?;
            for (col, idx) in range.enumerate() {
                self.values[idx] = controls[(row, col)];
            }
        }
        Ok(())
    }
}
