//! Nondimensionalization: [`scale_utility`] scales the NLP (decision
//! vector, constraints, cost and Jacobian); [`unit_scaling`] converts
//! physical quantities through named units.

pub mod scale_utility;
pub mod unit_scaling;
