//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use stackplan::error::{OrchestrationError, Result};
use stackplan::planner::Planner;
use stackplan::schema::{EffectClassifier, SchemaRegistry};
use stackplan::stack::{DEFAULT_STACK_TYPE, OrchestrationClient, StackSnapshot};
use stackplan::template::Template;

/// Account id embedded in fixture stack ids.
pub const ACCOUNT_ID: &str = "123456789012";

/// In-memory orchestration client.
pub struct MemoryClient {
    stacks: HashMap<String, StackSnapshot>,
    stack_types: Vec<String>,
    fetches: AtomicU32,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            stacks: HashMap::new(),
            stack_types: vec![String::from(DEFAULT_STACK_TYPE)],
            fetches: AtomicU32::new(0),
        }
    }

    pub fn with_stack(mut self, snapshot: StackSnapshot) -> Self {
        self.stacks.insert(snapshot.name.clone(), snapshot);
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrchestrationClient for MemoryClient {
    async fn fetch_stack(&self, name: &str) -> Result<StackSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.stacks
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestrationError::stack_not_found(name).into())
    }

    async fn account_id(&self) -> Result<String> {
        Ok(String::from(ACCOUNT_ID))
    }

    fn region(&self) -> &str {
        "us-east-1"
    }

    fn stack_types(&self) -> &[String] {
        &self.stack_types
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

/// Builds a template from a JSON literal.
pub fn template(value: Value) -> Template {
    serde_json::from_value(value).expect("fixture template")
}

/// ARN-style stack id for a stack name.
pub fn stack_id(name: &str) -> String {
    format!("arn:aws:cloudformation:us-east-1:{ACCOUNT_ID}:stack/{name}/0000")
}

/// Live stack snapshot with an ARN-style id.
pub fn snapshot(name: &str, template: Template) -> StackSnapshot {
    StackSnapshot::new(stack_id(name), name, template)
}

/// Planner over the built-in schema registry.
pub fn planner(client: MemoryClient) -> Planner<MemoryClient> {
    Planner::new(client, EffectClassifier::new(Arc::new(SchemaRegistry::builtin())))
}
