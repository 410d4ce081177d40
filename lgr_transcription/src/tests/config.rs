use test_case::test_case;

use crate::prelude::*;

#[test]
fn test_default_config_is_valid() {
    let config = TranscriptionConfig::default();
    config.validate().unwrap();
    assert_eq!(config.min_polynomial_degree, 3);
    assert_eq!(config.max_polynomial_degree, 14);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = TranscriptionConfig::from_toml_str(
        r#"
        relative_error_tol = 1e-8
        max_polynomial_degree = 10
        "#,
    )
    .unwrap();
    assert_eq!(config.relative_error_tol, 1.0e-8);
    assert_eq!(config.max_polynomial_degree, 10);
    assert_eq!(config.min_polynomial_degree, 3);
    assert_eq!(config.lgr_max_iterations, TranscriptionConfig::default().lgr_max_iterations);
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let err = TranscriptionConfig::from_toml_str("relative_error_tol = \"small\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test_case(2, 10; "min below lower limit")]
#[test_case(3, 16; "max above upper limit")]
#[test_case(9, 5; "min above max")]
fn test_bad_degree_range_is_rejected(min: usize, max: usize) {
    let config = TranscriptionConfig {
        min_polynomial_degree: min,
        max_polynomial_degree: max,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::DegreeRange { .. })));
}

#[test_case(0.0; "zero")]
#[test_case(-1.0e-6; "negative")]
#[test_case(f64::NAN; "nan")]
fn test_bad_error_tolerance_is_rejected(tol: f64) {
    let config = TranscriptionConfig {
        relative_error_tol: tol,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::BadTolerance { .. })));
}

#[test]
fn test_zero_lgr_iterations_is_rejected() {
    let config = TranscriptionConfig {
        lgr_max_iterations: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::NonPositiveCount { .. })));
}
