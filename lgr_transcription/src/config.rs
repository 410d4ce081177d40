//! Tunable parameters of the transcription and mesh-refinement loop.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lowest polynomial degree any mesh interval may use.
pub const MIN_POLYNOMIAL_DEGREE_LB: usize = 3;
/// Highest polynomial degree any mesh interval may use.
pub const MAX_POLYNOMIAL_DEGREE_UB: usize = 15;

/// Transcription configuration.
///
/// Every field has a default, so a TOML document only needs the keys it
/// changes:
///
/// ```toml
/// relative_error_tol = 1e-8
/// max_polynomial_degree = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Degree used for intervals created by subdividing during refinement.
    pub min_polynomial_degree: usize,
    /// Largest degree an interval can grow to before it is subdivided.
    pub max_polynomial_degree: usize,
    /// Mesh-refinement tolerance on the max relative defect error.
    pub relative_error_tol: f64,
    /// Newton iteration cap for LGR node generation.
    pub lgr_max_iterations: usize,
    /// Minimum gap between lower and upper bounds.
    pub bound_tolerance: f64,
    /// Solve/refine passes in `solve_with_mesh_refinement`.
    pub max_mesh_refinement_iterations: usize,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            min_polynomial_degree: 3,
            max_polynomial_degree: 14,
            relative_error_tol: 1.0e-6,
            lgr_max_iterations: 100,
            bound_tolerance: 1.0e-5,
            max_mesh_refinement_iterations: 8,
        }
    }
}

impl TranscriptionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: TranscriptionConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_degree_range(self.min_polynomial_degree, self.max_polynomial_degree)?;
        if !(self.relative_error_tol > 0.0 && self.relative_error_tol.is_finite()) {
            return Err(ConfigError::BadTolerance {
                name: "relative_error_tol",
                value: self.relative_error_tol,
            });
        }
        if !(self.bound_tolerance >= 0.0 && self.bound_tolerance.is_finite()) {
            return Err(ConfigError::BadTolerance {
                name: "bound_tolerance",
                value: self.bound_tolerance,
            });
        }
        if self.lgr_max_iterations == 0 {
            return Err(ConfigError::NonPositiveCount {
                name: "lgr_max_iterations",
                value: 0,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_degree_range(min: usize, max: usize) -> Result<(), ConfigError> {
    if min < MIN_POLYNOMIAL_DEGREE_LB || max > MAX_POLYNOMIAL_DEGREE_UB || min > max {
        return Err(ConfigError::DegreeRange {
            min,
            max,
            lb: MIN_POLYNOMIAL_DEGREE_LB,
            ub: MAX_POLYNOMIAL_DEGREE_UB,
        });
    }
    Ok(())
}
