//! Configuration specification types for the planner.
//!
//! This module defines the structs that map to the `stackplan.yaml` file.
//! Every section is optional; an empty file yields a working local setup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{CacheTtl, DEFAULT_ACCOUNT_TTL, DEFAULT_STACK_TTL};
use crate::planner::PlannerOptions;
use crate::schema::DEFAULT_INIT_REPLACEMENT_TYPES;
use crate::stack::{DEFAULT_LOCK_TIMEOUT, DEFAULT_REGION, DEFAULT_STACK_TYPE};

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Planning behaviour.
    pub planner: PlanningConfig,
    /// Stack state cache.
    pub cache: CacheConfig,
    /// Resource schema sources.
    pub schema: SchemaConfig,
    /// Live stack source.
    pub stacks: StacksConfig,
}

/// Planning behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanningConfig {
    /// Cap on fixed-point passes per stack level; derived per stack when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Parameter overrides applied to every stack.
    pub global_parameters: BTreeMap<String, String>,
    /// Resource types replaced when their init metadata changes.
    pub init_replacement_types: Vec<String>,
    /// Resource types that denote nested stacks.
    pub stack_types: Vec<String>,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_iterations: None,
            global_parameters: BTreeMap::new(),
            init_replacement_types: DEFAULT_INIT_REPLACEMENT_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            stack_types: vec![String::from(DEFAULT_STACK_TYPE)],
        }
    }
}

impl PlanningConfig {
    /// Converts to planner options.
    #[must_use]
    pub fn to_options(&self) -> PlannerOptions {
        PlannerOptions {
            max_iterations: self.max_iterations,
            global_parameters: self.global_parameters.clone(),
            stack_types: Some(self.stack_types.clone()),
        }
    }
}

/// Cache backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// In-process cache.
    #[default]
    Local,
    /// File-backed cache shared between processes.
    File,
}

/// Stack state cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend type.
    pub backend: CacheBackendKind,
    /// Cache directory (required for the file backend).
    pub path: Option<PathBuf>,
    /// Seconds to wait for a named lock.
    pub lock_timeout_secs: u64,
    /// Freshness windows.
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Local,
            path: None,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT.as_secs(),
            ttl: TtlConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Lock timeout as a duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Freshness windows per data kind, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TtlConfig {
    /// Stack snapshots.
    pub stack: u64,
    /// Account identifier.
    pub account: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            stack: DEFAULT_STACK_TTL.as_secs(),
            account: DEFAULT_ACCOUNT_TTL.as_secs(),
        }
    }
}

impl TtlConfig {
    /// Converts to cache TTLs.
    #[must_use]
    pub const fn to_cache_ttl(self) -> CacheTtl {
        CacheTtl {
            stack: Duration::from_secs(self.stack),
            account: Duration::from_secs(self.account),
        }
    }
}

/// Resource schema sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchemaConfig {
    /// Extra schema files layered over the built-in table.
    pub paths: Vec<PathBuf>,
}

/// Live stack source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StacksConfig {
    /// Directory holding stack snapshots.
    pub path: PathBuf,
    /// Region reported to templates.
    pub region: String,
    /// Account reported to templates when stack ids carry none.
    pub account_id: Option<String>,
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stacks"),
            region: String::from(DEFAULT_REGION),
            account_id: None,
        }
    }
}
