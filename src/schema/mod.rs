//! Resource schemas and effect classification.
//!
//! This module provides:
//! - The [`ResourceSchemaProvider`] interface and schema types
//! - A [`SchemaRegistry`] with built-in AWS resource types
//! - The [`EffectClassifier`] used by the planner

mod classifier;
mod provider;
mod registry;

pub use classifier::{DEFAULT_INIT_REPLACEMENT_TYPES, EffectClassifier};
pub use provider::{
    CausePredicate, ConditionalCause, PropertyDescriptor, ResourceSchema, ResourceSchemaProvider,
    UpdateCause, UpdateCauses,
};
pub use registry::SchemaRegistry;
