//! Live stack access.
//!
//! This module provides the orchestration API seam used by the planner:
//! - The [`OrchestrationClient`] trait and [`StackSnapshot`] type
//! - A file-backed [`LocalStackSource`]
//! - A [`CachedClient`] decorator backed by the stack state cache

mod cached;
mod client;
mod local;
mod types;

pub use cached::{CachedClient, DEFAULT_LOCK_TIMEOUT};
pub use client::OrchestrationClient;
pub use local::{DEFAULT_REGION, LocalStackSource};
pub use types::{DEFAULT_STACK_TYPE, NestedStackRef, StackSnapshot};
