//! Run configuration.
//!
//! Loads [`DistributionConfig`] from TOML with `GRAVITY_*` environment
//! variable overrides. Every key is optional; missing keys take the
//! defaults below.
//!
//! ```toml
//! max_furness_iterations = 3000
//! furness_tolerance = 1e-6
//! max_calibration_iterations = 100
//! calibration_tolerance = 1e-6
//! jacobian_step_size = 1e-4
//! worker_count = -2
//! deterrence_function = "log_normal"
//! target_r_squared = 0.9
//! intrazonal_cost_infill = 0.5
//!
//! [fallback_parameters]
//! function = "log_normal"
//! values = [1.0, 2.0]
//! ```

use crate::math::deterrence::{DeterrenceFunction, DeterrenceParameters};
use crate::math::furness::FurnessConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration for a distribution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Furness iteration cap per balance.
    pub max_furness_iterations: usize,
    /// Largest absolute marginal difference accepted by Furness.
    pub furness_tolerance: f64,
    /// Outer iteration budget per calibration attempt.
    pub max_calibration_iterations: usize,
    /// Sum of squared band-share differences accepted as converged.
    pub calibration_tolerance: f64,
    /// Relative forward-difference step for the Jacobian.
    pub jacobian_step_size: f64,
    /// Restart point for the fallback attempt. `None` uses family defaults.
    pub fallback_parameters: Option<DeterrenceParameters>,
    /// Worker threads: positive is exact, 0 is all CPUs, negative is all
    /// CPUs minus that many (at least one).
    pub worker_count: i64,
    /// Family used for areas that carry no initial parameters.
    pub deterrence_function: DeterrenceFunction,
    /// Optional alternative convergence criterion on R² of band shares.
    pub target_r_squared: Option<f64>,
    /// Start from moment estimates of the target distribution.
    pub estimate_initial_parameters: bool,
    /// Scale attractions to the production total before balancing.
    pub rebalance_trip_ends: bool,
    /// Replace zero intrazonal costs by this factor times the nearest
    /// neighbour cost.
    pub intrazonal_cost_infill: Option<f64>,
    /// Furness clip ceiling.
    pub overflow_ceiling: f64,
    /// Furness infill value for empty rows and columns.
    pub infill_floor: f64,
    /// Starting Gauss-Newton damping.
    pub initial_damping: f64,
    /// Log level for the binary.
    pub log_level: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        let furness = FurnessConfig::default();
        Self {
            max_furness_iterations: furness.max_iterations,
            furness_tolerance: furness.tolerance,
            max_calibration_iterations: 100,
            calibration_tolerance: 1e-6,
            jacobian_step_size: 1e-4,
            fallback_parameters: None,
            worker_count: -2,
            deterrence_function: DeterrenceFunction::LogNormal,
            target_r_squared: None,
            estimate_initial_parameters: false,
            rebalance_trip_ends: true,
            intrazonal_cost_infill: None,
            overflow_ceiling: furness.overflow_ceiling,
            infill_floor: furness.infill_floor,
            initial_damping: 1e-3,
            log_level: "info".to_string(),
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl DistributionConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `GRAVITY_*` environment variable overrides.
    pub fn with_env_override(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by `GRAVITY_*` variable name.
    ///
    /// Unparseable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "GRAVITY_MAX_FURNESS_ITERATIONS") {
            self.max_furness_iterations = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_FURNESS_TOLERANCE") {
            self.furness_tolerance = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_MAX_CALIBRATION_ITERATIONS") {
            self.max_calibration_iterations = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_CALIBRATION_TOLERANCE") {
            self.calibration_tolerance = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_JACOBIAN_STEP_SIZE") {
            self.jacobian_step_size = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_WORKER_COUNT") {
            self.worker_count = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_DETERRENCE_FUNCTION") {
            self.deterrence_function = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_TARGET_R_SQUARED") {
            self.target_r_squared = Some(v);
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_ESTIMATE_INITIAL_PARAMETERS") {
            self.estimate_initial_parameters = v;
        }
        if let Some(v) = parsed(&lookup, "GRAVITY_INTRAZONAL_COST_INFILL") {
            self.intrazonal_cost_infill = Some(v);
        }
        if let Some(level) = lookup("GRAVITY_LOG_LEVEL") {
            self.log_level = level;
        }
        self
    }

    /// Validate the configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let positive = |name: &str, value: f64, errors: &mut Vec<String>| {
            if !(value.is_finite() && value > 0.0) {
                errors.push(format!("{} must be positive and finite, got {}", name, value));
            }
        };

        if self.max_furness_iterations == 0 {
            errors.push("max_furness_iterations must be greater than 0".to_string());
        }
        positive("furness_tolerance", self.furness_tolerance, &mut errors);
        positive("calibration_tolerance", self.calibration_tolerance, &mut errors);
        positive("jacobian_step_size", self.jacobian_step_size, &mut errors);
        if self.jacobian_step_size > 0.1 {
            errors.push(format!(
                "jacobian_step_size {} exceeds maximum allowed (0.1)",
                self.jacobian_step_size
            ));
        }
        positive("overflow_ceiling", self.overflow_ceiling, &mut errors);
        positive("infill_floor", self.infill_floor, &mut errors);
        if self.infill_floor >= self.overflow_ceiling {
            errors.push("infill_floor must be below overflow_ceiling".to_string());
        }
        if !(self.initial_damping.is_finite() && self.initial_damping >= 0.0) {
            errors.push(format!("initial_damping must be non-negative, got {}", self.initial_damping));
        }
        if let Some(r2) = self.target_r_squared {
            if !(r2 > 0.0 && r2 <= 1.0) {
                errors.push(format!("target_r_squared must be in (0, 1], got {}", r2));
            }
        }
        if let Some(factor) = self.intrazonal_cost_infill {
            positive("intrazonal_cost_infill", factor, &mut errors);
        }
        if let Some(fallback) = &self.fallback_parameters {
            if fallback.function() != self.deterrence_function {
                errors.push(format!(
                    "fallback_parameters family {} differs from deterrence_function {}",
                    fallback.function(),
                    self.deterrence_function
                ));
            }
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log_level '{}'. Valid values: {:?}",
                self.log_level, VALID_LOG_LEVELS
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load configuration from file and validate.
    pub fn load_and_validate(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file with environment overrides and validate.
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?.with_env_override();
        config.validate()?;
        Ok(config)
    }

    /// Furness settings implied by this configuration.
    pub fn furness_config(&self) -> FurnessConfig {
        FurnessConfig {
            max_iterations: self.max_furness_iterations,
            tolerance: self.furness_tolerance,
            overflow_ceiling: self.overflow_ceiling,
            infill_floor: self.infill_floor,
        }
    }
}

/// Configuration error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(String),
    /// Parse error in config file.
    #[error("Parse error: {0}")]
    Parse(String),
    /// One or more settings are invalid.
    #[error("Validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn validation_errors(config: &DistributionConfig) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors,
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = DistributionConfig::default();
        assert_eq!(config.max_furness_iterations, 3000);
        assert_eq!(config.max_calibration_iterations, 100);
        assert_eq!(config.worker_count, -2);
        assert!(config.rebalance_trip_ends);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DistributionConfig::from_toml_str(
            r#"
            max_calibration_iterations = 20
            deterrence_function = "tanner"
            intrazonal_cost_infill = 0.5

            [fallback_parameters]
            function = "tanner"
            values = [0.5, -0.2]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_calibration_iterations, 20);
        assert_eq!(config.max_furness_iterations, 3000);
        assert_eq!(config.deterrence_function, DeterrenceFunction::Tanner);
        assert_eq!(config.intrazonal_cost_infill, Some(0.5));
        assert_eq!(config.fallback_parameters.as_ref().map(|p| p.values().to_vec()), Some(vec![0.5, -0.2]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_domain_fallback_is_a_parse_error() {
        let err = DistributionConfig::from_toml_str(
            r#"
            [fallback_parameters]
            function = "power"
            values = [-2.0]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GRAVITY_WORKER_COUNT", "4"),
            ("GRAVITY_CALIBRATION_TOLERANCE", "1e-4"),
            ("GRAVITY_DETERRENCE_FUNCTION", "exponential"),
            ("GRAVITY_TARGET_R_SQUARED", "0.9"),
            ("GRAVITY_MAX_FURNESS_ITERATIONS", "not a number"),
            ("GRAVITY_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let config = DistributionConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.calibration_tolerance, 1e-4);
        assert_eq!(config.deterrence_function, DeterrenceFunction::Exponential);
        assert_eq!(config.target_r_squared, Some(0.9));
        assert_eq!(config.max_furness_iterations, 3000);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("GRAVITY_MAX_CALIBRATION_ITERATIONS", "7");
        let config = DistributionConfig::default().with_env_override();
        assert_eq!(config.max_calibration_iterations, 7);
        std::env::remove_var("GRAVITY_MAX_CALIBRATION_ITERATIONS");
    }

    #[test]
    fn test_validate_multiple_errors() {
        let config = DistributionConfig {
            furness_tolerance: 0.0,
            jacobian_step_size: 0.5,
            target_r_squared: Some(1.5),
            log_level: "loud".to_string(),
            ..Default::default()
        };
        let errors = validation_errors(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("furness_tolerance")));
        assert!(errors.iter().any(|e| e.contains("exceeds maximum")));
        assert!(errors.iter().any(|e| e.contains("target_r_squared")));
        assert!(errors.iter().any(|e| e.contains("log_level")));
    }

    #[test]
    fn test_validate_fallback_family_mismatch() {
        let config = DistributionConfig {
            fallback_parameters: Some(DeterrenceParameters::defaults(DeterrenceFunction::Power)),
            ..Default::default()
        };
        let errors = validation_errors(&config);
        assert!(errors[0].contains("fallback_parameters"));
    }

    #[test]
    fn test_furness_config() {
        let config = DistributionConfig {
            max_furness_iterations: 12,
            ..Default::default()
        };
        let furness = config.furness_config();
        assert_eq!(furness.max_iterations, 12);
        assert_eq!(furness.overflow_ceiling, 1e250);
    }

    #[test]
    fn test_load_missing_file() {
        let err = DistributionConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Validation(vec!["Error 1".to_string(), "Error 2".to_string()]);
        let display = format!("{}", error);
        assert!(display.contains("Error 1; Error 2"));
    }
}
