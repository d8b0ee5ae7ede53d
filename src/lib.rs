// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stackplan
//!
//! An update-impact planner for declarative infrastructure stacks.
//!
//! ## Overview
//!
//! Given a live stack and a proposed template with parameters, Stackplan
//! predicts what an update would do to every resource, without modifying
//! anything:
//!
//! - Resources that would be added or removed
//! - Resources that would be replaced, interrupted, or made unavailable
//! - Resources whose update effect is unknown
//! - Outputs that would change
//!
//! ## Architecture
//!
//! Planning is a bounded fixed-point computation over the stack tree:
//!
//! 1. **Translation**: Both templates are dereferenced against their
//!    parameters, with replaced resources tainted as runtime-modified
//! 2. **Classification**: Each property change is mapped to an update cause
//!    through an explicit resource schema registry
//! 3. **Aggregation**: Nested stacks are planned recursively, changed nested
//!    outputs taint the parent, and passes repeat until the plan is stable
//!
//! Live stacks are fetched through a client wrapped by a TTL cache with
//! named locks, so concurrent planning runs share remote lookups.
//!
//! ## Modules
//!
//! - [`template`]: Template model and parameter sets
//! - [`translator`]: Intrinsic function evaluation and taint flags
//! - [`schema`]: Resource update semantics and effect classification
//! - [`planner`]: Diffing, bucketing and plan aggregation
//! - [`stack`]: Live stack access and the caching client
//! - [`cache`]: Stack state cache with named locks
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! planner:
//!   max_iterations: 20
//!   global_parameters:
//!     Environment: prod
//!
//! cache:
//!   backend: file
//!   path: .stackplan/cache
//!
//! stacks:
//!   path: stacks
//!   region: eu-west-1
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod schema;
pub mod stack;
pub mod template;
pub mod translator;

// ============================================================================
// Re-exports
// ============================================================================

pub use cache::{CacheBackend, StackCache};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, ContentHasher, PlannerConfig};
pub use error::{Result, StackPlanError};
pub use planner::{ImpactBucket, PlanResult, Planner, PlannerOptions};
pub use schema::{EffectClassifier, ResourceSchemaProvider, SchemaRegistry, UpdateCause};
pub use stack::{CachedClient, LocalStackSource, OrchestrationClient, StackSnapshot};
pub use template::{Expression, ParameterSet, Template};
pub use translator::{Translator, TranslatorArena};
