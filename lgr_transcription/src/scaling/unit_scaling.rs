use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::error::{ConfigError, TranscriptionError};

/// Factor and shift of one unit: `scaled = (value - shift) / factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitScale {
    pub factor: f64,
    pub shift: f64,
}

/// Named-unit conversion table.
///
/// Starts with the canonical units (`DU`, `TU`, `VU`, `MU`, `ACCU`, `MFU`)
/// at factor 1 and shift 0. Scaling by a unit the table does not know
/// leaves the value unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingUtility {
    units: BTreeMap<String, UnitScale>,
}

pub const DEFAULT_UNITS: [&str; 6] = ["DU", "TU", "VU", "MU", "ACCU", "MFU"];

impl Default for ScalingUtility {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalingUtility {
    pub fn new() -> Self {
        let mut out = Self {
            units: BTreeMap::new(),
        };
        for unit in DEFAULT_UNITS {
            out.add_unit_and_shift(unit, 1.0, 0.0);
        }
        out
    }

    pub fn validate_unit(&self, unit: &str) -> bool {
        self.units.contains_key(unit)
    }

    fn unit_mut(&mut self, unit: &str) -> Result<&mut UnitScale, ConfigError> {
        self.units
            .get_mut(unit)
            .ok_or_else(|| ConfigError::UnknownUnit(unit.to_string()))
    }

    pub fn set_unit(&mut self, unit: &str, factor: f64) -> Result<(), ConfigError> {
        self.unit_mut(unit)?.factor = factor;
        Ok(())
    }

    pub fn set_shift(&mut self, unit: &str, shift: f64) -> Result<(), ConfigError> {
        self.unit_mut(unit)?.shift = shift;
        Ok(())
    }

    pub fn set_unit_and_shift(&mut self, unit: &str, factor: f64, shift: f64) -> Result<(), ConfigError> {
        *self.unit_mut(unit)? = UnitScale { factor, shift };
        Ok(())
    }

    /// Inserts the unit or overwrites an existing one.
    pub fn add_unit_and_shift(&mut self, unit: &str, factor: f64, shift: f64) {
        self.units.insert(unit.to_string(), UnitScale { factor, shift });
    }

    pub fn unit_and_shift(&self, unit: &str) -> Result<UnitScale, ConfigError> {
        self.units
            .get(unit)
            .copied()
            .ok_or_else(|| ConfigError::UnknownUnit(unit.to_string()))
    }

    pub fn scale_parameter(&self, unscaled: f64, unit: &str) -> f64 {
        match self.units.get(unit) {
            Some(u) => (unscaled - u.shift) / u.factor,
            None => unscaled,
        }
    }

    pub fn unscale_parameter(&self, scaled: f64, unit: &str) -> f64 {
        match self.units.get(unit) {
            Some(u) => scaled * u.factor + u.shift,
            None => scaled,
        }
    }

    pub fn scale_vector(&self, unscaled: &DVector<f64>, units: &[&str]) -> Result<DVector<f64>, TranscriptionError> {
        if unscaled.len() != units.len() {
            return Err(TranscriptionError::length("ScalingUtility::scale_vector", units.len(), unscaled.len()));
        }
        Ok(DVector::from_iterator(
            units.len(),
            unscaled
                .iter()
                .zip(units)
                .map(|(&x, unit)| self.scale_parameter(x, unit)),
        ))
    }

    pub fn unscale_vector(&self, scaled: &DVector<f64>, units: &[&str]) -> Result<DVector<f64>, TranscriptionError> {
        if scaled.len() != units.len() {
            return Err(TranscriptionError::length(
                "ScalingUtility::unscale_vector",
                units.len(),
                scaled.len(),
            ));
        }
        Ok(DVector::from_iterator(
            units.len(),
            scaled
                .iter()
                .zip(units)
                .map(|(&x, unit)| self.unscale_parameter(x, unit)),
        ))
    }

    /// `J[i, j] * factor(var_j) / factor(fun_i)`; entries whose function
    /// or variable unit is unknown are copied unchanged.
    pub fn scale_jacobian(
        &self,
        unscaled: &DMatrix<f64>,
        fun_units: &[&str],
        var_units: &[&str],
    ) -> Result<DMatrix<f64>, TranscriptionError> {
        let expected = (fun_units.len(), var_units.len());
        if unscaled.shape() != expected {
            return Err(TranscriptionError::shape("ScalingUtility::scale_jacobian", expected, unscaled.shape()));
        }
        Ok(DMatrix::from_fn(unscaled.nrows(), unscaled.ncols(), |i, j| {
            match (self.units.get(fun_units[i]), self.units.get(var_units[j])) {
                (Some(fun), Some(var)) => unscaled[(i, j)] * var.factor / fun.factor,
                _ => unscaled[(i, j)],
            }
        }))
    }

    /// Multiplies column `j` by `factor(var_j)`.
    pub fn scale_jacobian_by_vars(
        &self,
        unscaled: &DMatrix<f64>,
        var_units: &[&str],
    ) -> Result<DMatrix<f64>, TranscriptionError> {
        if unscaled.ncols() != var_units.len() {
            return Err(TranscriptionError::length(
                "ScalingUtility::scale_jacobian_by_vars",
                var_units.len(),
                unscaled.ncols(),
            ));
        }
        Ok(DMatrix::from_fn(unscaled.nrows(), unscaled.ncols(), |i, j| {
            self.units
                .get(var_units[j])
                .map_or(unscaled[(i, j)], |var| unscaled[(i, j)] * var.factor)
        }))
    }

    /// Divides row `i` by `factor(fun_i)`.
    pub fn scale_jacobian_by_fun(
        &self,
        unscaled: &DMatrix<f64>,
        fun_units: &[&str],
    ) -> Result<DMatrix<f64>, TranscriptionError> {
        if unscaled.nrows() != fun_units.len() {
            return Err(TranscriptionError::length(
                "ScalingUtility::scale_jacobian_by_fun",
                fun_units.len(),
                unscaled.nrows(),
            ));
        }
        Ok(DMatrix::from_fn(unscaled.nrows(), unscaled.ncols(), |i, j| {
            self.units
                .get(fun_units[i])
                .map_or(unscaled[(i, j)], |fun| unscaled[(i, j)] / fun.factor)
        }))
    }
}
