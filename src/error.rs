//! Error types for the stack planner.
//!
//! This module provides the error hierarchy for every stage of a planning
//! run: configuration, the stack state cache, the orchestration API,
//! template evaluation, and plan aggregation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the stack planner.
#[derive(Debug, Error)]
pub enum StackPlanError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Stack state cache errors.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Orchestration API errors.
    #[error("Orchestration API error: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// Template evaluation errors.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A parameter override could not be parsed.
    #[error("Invalid parameter override: {spec} (expected KEY=VALUE)")]
    InvalidParameter {
        /// The raw override string.
        spec: String,
    },
}

/// Stack state cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Named lock could not be acquired before the timeout elapsed.
    #[error("Timed out after {timeout_ms}ms waiting for lock '{name}'")]
    LockTimeout {
        /// Name of the lock.
        name: String,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// Lock file is held by another process.
    #[error("Lock '{name}' is held by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Name of the lock.
        name: String,
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Lock acquisition failed for a reason other than contention.
    #[error("Failed to acquire lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Persisted lock data is corrupted.
    #[error("Lock data is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("Cache serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Orchestration API errors.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Stack not found.
    #[error("Stack not found: {name}")]
    StackNotFound {
        /// Name of the missing stack.
        name: String,
    },

    /// API request failed.
    #[error("Orchestration API request failed: {message}")]
    ApiRequestFailed {
        /// Error message from the API.
        message: String,
    },

    /// Throttled by the API.
    #[error("Orchestration API throttled, retry after {retry_after_secs} seconds")]
    Throttled {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Invalid stack data returned by the API.
    #[error("Invalid stack data for {name}: {message}")]
    InvalidResponse {
        /// Stack the data belongs to.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// Template evaluation errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// `Fn::FindInMap` referenced a missing mapping or key.
    #[error("Mapping not found: {map} -> {top_key} -> {second_key}")]
    MappingNotFound {
        /// Mapping table name.
        map: String,
        /// First-level key.
        top_key: String,
        /// Second-level key.
        second_key: String,
    },

    /// An intrinsic function was given arguments of the wrong shape.
    #[error("Malformed {function} arguments: {message}")]
    MalformedFunction {
        /// Function name.
        function: String,
        /// Description of the problem.
        message: String,
    },

    /// A template document could not be parsed.
    #[error("Failed to parse template: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan did not reach a fixed point.
    #[error("Plan for stack {stack} did not converge after {iterations} iterations")]
    NonConvergent {
        /// Stack being planned.
        stack: String,
        /// Number of iterations performed.
        iterations: u32,
    },

    /// A resource landed in both the added and removed buckets.
    #[error("Resource {name} in stack {stack} is both added and removed")]
    ConflictingBuckets {
        /// Stack being planned.
        stack: String,
        /// Resource name.
        name: String,
    },

    /// Plan serialization failed while checking for convergence.
    #[error("Failed to serialize plan: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
    },
}

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, StackPlanError>;

impl StackPlanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Orchestration(OrchestrationError::Throttled { .. })
                | Self::Cache(CacheError::LockTimeout { .. } | CacheError::LockedByOther { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Orchestration(OrchestrationError::Throttled { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Cache(CacheError::LockTimeout { .. } | CacheError::LockedByOther { .. }) => Some(2),
            _ => None,
        }
    }

    /// Returns true if this error is a lock timeout from the state cache.
    #[must_use]
    pub const fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::Cache(CacheError::LockTimeout { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl CacheError {
    /// Creates a lock timeout error.
    #[must_use]
    pub fn lock_timeout(name: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::LockTimeout {
            name: name.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a lock failure error.
    #[must_use]
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::LockFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl OrchestrationError {
    /// Creates a stack-not-found error.
    #[must_use]
    pub fn stack_not_found(name: impl Into<String>) -> Self {
        Self::StackNotFound { name: name.into() }
    }

    /// Creates an API request error.
    #[must_use]
    pub fn api_error(message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            message: message.into(),
        }
    }
}

impl TemplateError {
    /// Creates a malformed-function error.
    #[must_use]
    pub fn malformed(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedFunction {
            function: function.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err = StackPlanError::from(CacheError::lock_timeout("stack:web", Duration::from_secs(3)));
        assert!(err.is_retryable());
        assert!(err.is_lock_timeout());
        assert_eq!(err.retry_delay_secs(), Some(2));
        assert!(err.to_string().contains("3000ms"));
    }

    #[test]
    fn test_mapping_not_found_is_fatal() {
        let err = StackPlanError::from(TemplateError::MappingNotFound {
            map: String::from("RegionMap"),
            top_key: String::from("eu-west-1"),
            second_key: String::from("Ami"),
        });
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay_secs(), None);
        assert!(err.to_string().contains("RegionMap -> eu-west-1 -> Ami"));
    }

    #[test]
    fn test_throttled_delay() {
        let err = StackPlanError::from(OrchestrationError::Throttled { retry_after_secs: 7 });
        assert_eq!(err.retry_delay_secs(), Some(7));
    }
}
