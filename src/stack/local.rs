//! Local file-based stack source.
//!
//! Stack snapshots are read from `<dir>/<name>.json`, `<name>.yaml` or
//! `<name>.yml`. This backs offline planning and tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{OrchestrationError, Result};

use super::client::OrchestrationClient;
use super::types::{DEFAULT_STACK_TYPE, StackSnapshot};

/// Snapshot file extensions, in lookup order.
const SNAPSHOT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Default region when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Stack source reading snapshots from a directory.
#[derive(Debug, Clone)]
pub struct LocalStackSource {
    /// Directory holding snapshot files.
    base_dir: PathBuf,
    /// Region reported to the planner.
    region: String,
    /// Account reported to the planner.
    account_id: Option<String>,
    /// Nested stack resource types.
    stack_types: Vec<String>,
}

impl LocalStackSource {
    /// Creates a source reading from `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            region: String::from(DEFAULT_REGION),
            account_id: None,
            stack_types: vec![String::from(DEFAULT_STACK_TYPE)],
        }
    }

    /// Sets the region (builder style).
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets the account identifier (builder style).
    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Sets the nested stack resource types (builder style).
    #[must_use]
    pub fn with_stack_types(mut self, stack_types: Vec<String>) -> Self {
        self.stack_types = stack_types;
        self
    }

    /// Gets the snapshot directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Finds the snapshot file for a stack.
    fn snapshot_path(&self, name: &str) -> Option<PathBuf> {
        SNAPSHOT_EXTENSIONS
            .iter()
            .map(|ext| self.base_dir.join(format!("{name}.{ext}")))
            .find(|path| path.exists())
    }
}

#[async_trait]
impl OrchestrationClient for LocalStackSource {
    async fn fetch_stack(&self, name: &str) -> Result<StackSnapshot> {
        let Some(path) = self.snapshot_path(name) else {
            debug!("No snapshot for {name} in {}", self.base_dir.display());
            return Err(OrchestrationError::stack_not_found(name).into());
        };

        info!("Loading stack snapshot from: {}", path.display());

        let content = fs::read_to_string(&path).await.map_err(|e| {
            OrchestrationError::api_error(format!("Failed to read {}: {e}", path.display()))
        })?;

        // YAML is a superset of JSON
        let snapshot: StackSnapshot =
            serde_yaml::from_str(&content).map_err(|e| OrchestrationError::InvalidResponse {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(snapshot)
    }

    async fn account_id(&self) -> Result<String> {
        self.account_id
            .clone()
            .ok_or_else(|| OrchestrationError::api_error("No account id configured for local stacks").into())
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn stack_types(&self) -> &[String] {
        &self.stack_types
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackPlanError;
    use tempfile::TempDir;

    fn create_test_source() -> (LocalStackSource, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = LocalStackSource::new(temp_dir.path()).with_region("eu-west-1");
        (source, temp_dir)
    }

    #[tokio::test]
    async fn test_fetch_json_and_yaml() {
        let (source, temp) = create_test_source();
        std::fs::write(
            temp.path().join("app.json"),
            r#"{"id": "app-id", "name": "app", "template": {"Resources": {}}}"#,
        )
        .expect("write json");
        std::fs::write(
            temp.path().join("db.yaml"),
            "id: db-id\nname: db\nparameters:\n  Size: \"10\"\n",
        )
        .expect("write yaml");

        let app = source.fetch_stack("app").await.expect("fetch app");
        assert_eq!(app.id, "app-id");

        let db = source.fetch_stack("db").await.expect("fetch db");
        assert_eq!(db.parameters["Size"], "10");
        assert_eq!(source.region(), "eu-west-1");
    }

    #[tokio::test]
    async fn test_missing_stack() {
        let (source, _temp) = create_test_source();
        let err = source.fetch_stack("ghost").await.expect_err("missing");
        assert!(matches!(
            err,
            StackPlanError::Orchestration(OrchestrationError::StackNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_snapshot() {
        let (source, temp) = create_test_source();
        std::fs::write(temp.path().join("bad.json"), "[1, 2").expect("write");
        let err = source.fetch_stack("bad").await.expect_err("invalid");
        assert!(matches!(
            err,
            StackPlanError::Orchestration(OrchestrationError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_account_id() {
        let (source, _temp) = create_test_source();
        assert!(source.account_id().await.is_err());

        let source = source.with_account_id("123456789012");
        assert_eq!(source.account_id().await.expect("account"), "123456789012");
    }
}
