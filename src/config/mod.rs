//! Configuration module for the stack planner.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `stackplan.yaml`
//! - Validation of configuration values
//! - Content hashing for stack identities and plan convergence

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ContentHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file, parse_parameter_overrides};
pub use spec::{
    CacheBackendKind, CacheConfig, PlannerConfig, PlanningConfig, SchemaConfig, StacksConfig,
    TtlConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
