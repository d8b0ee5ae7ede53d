//! Orchestration API client trait definition.
//!
//! This module defines the read-only interface the planner uses to look up
//! live stacks.

use async_trait::async_trait;

use crate::error::Result;

use super::types::StackSnapshot;

/// Trait for orchestration API backends.
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Fetches a live stack by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack does not exist or the request fails.
    async fn fetch_stack(&self, name: &str) -> Result<StackSnapshot>;

    /// Gets the account identifier the client operates in.
    ///
    /// # Errors
    ///
    /// Returns an error if the account cannot be determined.
    async fn account_id(&self) -> Result<String>;

    /// Gets the region the client operates in.
    fn region(&self) -> &str;

    /// Gets the resource types that denote nested stacks.
    fn stack_types(&self) -> &[String];

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl OrchestrationClient for Box<dyn OrchestrationClient> {
    async fn fetch_stack(&self, name: &str) -> Result<StackSnapshot> {
        (**self).fetch_stack(name).await
    }

    async fn account_id(&self) -> Result<String> {
        (**self).account_id().await
    }

    fn region(&self) -> &str {
        (**self).region()
    }

    fn stack_types(&self) -> &[String] {
        (**self).stack_types()
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
