//! Configuration validation for planner settings.
//!
//! This module checks a loaded configuration for values the planner cannot
//! work with, collecting every problem before reporting the first one.

use crate::error::{ConfigError, Result, StackPlanError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{CacheBackendKind, CacheConfig, PlannerConfig, PlanningConfig, StacksConfig};

/// Fewest passes that can observe a fixed point.
const MIN_ITERATIONS: u32 = 2;

/// Validator for planner configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a planner configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &PlannerConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_planner(&config.planner, &mut result);
        Self::validate_cache(&config.cache, &mut result);
        Self::validate_stacks(&config.stacks, &mut result);

        if config.schema.paths.is_empty() {
            debug!("No schema files configured, using the built-in table only");
        }

        if let Some(first_error) = result.errors.first() {
            Err(StackPlanError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        } else {
            debug!("Configuration validation passed");
            Ok(result)
        }
    }

    /// Validates planning settings.
    fn validate_planner(planner: &PlanningConfig, result: &mut ValidationResult) {
        if let Some(max) = planner.max_iterations
            && max < MIN_ITERATIONS
        {
            result.error(
                "planner.max_iterations",
                format!("max_iterations must be at least {MIN_ITERATIONS}, got {max}"),
            );
        }

        if planner.stack_types.is_empty() {
            result
                .warnings
                .push(String::from("No stack types configured, nested stacks will not be planned"));
        }

        for (field, types) in [
            ("planner.stack_types", &planner.stack_types),
            ("planner.init_replacement_types", &planner.init_replacement_types),
        ] {
            let mut seen = HashSet::new();
            for (i, resource_type) in types.iter().enumerate() {
                if !is_valid_type_name(resource_type) {
                    result.error(
                        format!("{field}[{i}]"),
                        format!("'{resource_type}' is not a valid resource type name"),
                    );
                } else if !seen.insert(resource_type) {
                    result.warnings.push(format!("Duplicate entry '{resource_type}' in {field}"));
                }
            }
        }

        for name in planner.global_parameters.keys() {
            if name.trim().is_empty() {
                result.error("planner.global_parameters", "Parameter names cannot be empty");
            }
        }
    }

    /// Validates cache settings.
    fn validate_cache(cache: &CacheConfig, result: &mut ValidationResult) {
        match cache.backend {
            CacheBackendKind::File => {
                if cache.path.as_ref().is_none_or(|p| p.as_os_str().is_empty()) {
                    result.error("cache.path", "A cache path is required when using the file backend");
                }
            }
            CacheBackendKind::Local => {
                if cache.path.is_some() {
                    result
                        .warnings
                        .push(String::from("cache.path is ignored by the local backend"));
                }
            }
        }

        if cache.lock_timeout_secs == 0 {
            result
                .warnings
                .push(String::from("cache.lock_timeout_secs is 0, contended refreshes will serve stale data"));
        }
    }

    /// Validates stack source settings.
    fn validate_stacks(stacks: &StacksConfig, result: &mut ValidationResult) {
        if stacks.region.trim().is_empty() {
            result.error("stacks.region", "Region cannot be empty");
        }

        if let Some(account_id) = &stacks.account_id
            && !is_valid_account_id(account_id)
        {
            result.error(
                "stacks.account_id",
                format!("Account id '{account_id}' must be 12 digits"),
            );
        }
    }
}

/// Checks for a `Vendor::Service::Resource` shaped type name.
fn is_valid_type_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split("::").collect();
    parts.len() >= 2 && parts.iter().all(|p| !p.is_empty() && p.chars().all(char::is_alphanumeric))
}

fn is_valid_account_id(account_id: &str) -> bool {
    account_id.len() == 12 && account_id.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_valid() {
        let result = ConfigValidator::new()
            .validate(&PlannerConfig::default())
            .expect("defaults are valid");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_single_iteration_rejected() {
        let mut config = PlannerConfig::default();
        config.planner.max_iterations = Some(1);

        let err = ConfigValidator::new().validate(&config).expect_err("too few");
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_file_backend_requires_path() {
        let mut config = PlannerConfig::default();
        config.cache.backend = CacheBackendKind::File;
        assert!(ConfigValidator::new().validate(&config).is_err());

        config.cache.path = Some(PathBuf::from("/tmp/stackplan"));
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = PlannerConfig::default();
        config.planner.stack_types = vec![String::from("Stack")];
        config.stacks.account_id = Some(String::from("abc"));

        let mut result = ValidationResult::default();
        ConfigValidator::validate_planner(&config.planner, &mut result);
        ConfigValidator::validate_stacks(&config.stacks, &mut result);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_type_names() {
        assert!(is_valid_type_name("AWS::EC2::Instance"));
        assert!(is_valid_type_name("Custom::Stack"));
        assert!(!is_valid_type_name("Instance"));
        assert!(!is_valid_type_name("AWS::::Instance"));
    }
}
