//! Plan result types.
//!
//! A [`PlanResult`] describes one stack level: which resources are added,
//! removed, or affected by an update and how, which outputs change, and the
//! plans of the nested stacks below it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::config::ContentHasher;
use crate::error::{PlanError, Result};
use crate::schema::UpdateCause;

use super::diff::DiffEntry;

/// Bucket a resource impact is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImpactBucket {
    /// Resource only in the proposed template.
    Added,
    /// Resource only in the origin template.
    Removed,
    /// Resource will be destroyed and recreated.
    Replace,
    /// Resource will be briefly interrupted.
    Interrupt,
    /// Resource will be unavailable during the update.
    Unavailable,
    /// Effect cannot be determined.
    Unknown,
}

/// Impact of an update on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceImpact {
    /// Logical resource name.
    pub name: String,
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Properties whose change put the resource in this bucket.
    pub properties: BTreeSet<String>,
    /// Differences behind the impact.
    pub diffs: Vec<DiffEntry>,
}

/// Plan for one stack level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// Plans of nested stacks, by logical name.
    pub stacks: BTreeMap<String, PlanResult>,
    /// Resources to be created.
    pub added: BTreeMap<String, ResourceImpact>,
    /// Resources to be deleted.
    pub removed: BTreeMap<String, ResourceImpact>,
    /// Resources to be replaced.
    pub replace: BTreeMap<String, ResourceImpact>,
    /// Resources to be interrupted.
    pub interrupt: BTreeMap<String, ResourceImpact>,
    /// Resources unavailable during the update.
    pub unavailable: BTreeMap<String, ResourceImpact>,
    /// Resources with unknown update effect.
    pub unknown: BTreeMap<String, ResourceImpact>,
    /// Output changes, by output name.
    pub outputs: BTreeMap<String, Vec<DiffEntry>>,
}

impl ImpactBucket {
    /// Bucket for an update cause; `None` has no bucket.
    #[must_use]
    pub const fn for_cause(cause: UpdateCause) -> Option<Self> {
        match cause {
            UpdateCause::Replacement => Some(Self::Replace),
            UpdateCause::Interrupt => Some(Self::Interrupt),
            UpdateCause::Unavailable => Some(Self::Unavailable),
            UpdateCause::Unknown => Some(Self::Unknown),
            UpdateCause::None => None,
        }
    }
}

impl ResourceImpact {
    /// Creates an empty impact record.
    #[must_use]
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            properties: BTreeSet::new(),
            diffs: Vec::new(),
        }
    }
}

impl PlanResult {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a bucket.
    #[must_use]
    pub const fn bucket(&self, bucket: ImpactBucket) -> &BTreeMap<String, ResourceImpact> {
        match bucket {
            ImpactBucket::Added => &self.added,
            ImpactBucket::Removed => &self.removed,
            ImpactBucket::Replace => &self.replace,
            ImpactBucket::Interrupt => &self.interrupt,
            ImpactBucket::Unavailable => &self.unavailable,
            ImpactBucket::Unknown => &self.unknown,
        }
    }

    fn bucket_mut(&mut self, bucket: ImpactBucket) -> &mut BTreeMap<String, ResourceImpact> {
        match bucket {
            ImpactBucket::Added => &mut self.added,
            ImpactBucket::Removed => &mut self.removed,
            ImpactBucket::Replace => &mut self.replace,
            ImpactBucket::Interrupt => &mut self.interrupt,
            ImpactBucket::Unavailable => &mut self.unavailable,
            ImpactBucket::Unknown => &mut self.unknown,
        }
    }

    /// Records an impact, merging with any existing record for the resource.
    ///
    /// Properties accumulate as a set and diffs are kept unique.
    pub fn set_resource(
        &mut self,
        bucket: ImpactBucket,
        name: &str,
        resource_type: &str,
        property: Option<&str>,
        diff: DiffEntry,
    ) {
        let impact = self
            .bucket_mut(bucket)
            .entry(name.to_string())
            .or_insert_with(|| ResourceImpact::new(name, resource_type));
        if let Some(property) = property {
            impact.properties.insert(property.to_string());
        }
        if !impact.diffs.contains(&diff) {
            impact.diffs.push(diff);
        }
    }

    /// Records an output change.
    pub fn set_output(&mut self, name: &str, diff: DiffEntry) {
        let diffs = self.outputs.entry(name.to_string()).or_default();
        if !diffs.contains(&diff) {
            diffs.push(diff);
        }
    }

    /// Returns true if nothing changes at this level or below.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.replace.is_empty()
            && self.interrupt.is_empty()
            && self.unavailable.is_empty()
            && self.unknown.is_empty()
            && self.outputs.is_empty()
            && self.stacks.values().all(Self::is_empty)
    }

    /// Buckets that contain a resource name at this level.
    #[must_use]
    pub fn buckets_of(&self, name: &str) -> Vec<ImpactBucket> {
        [
            ImpactBucket::Added,
            ImpactBucket::Removed,
            ImpactBucket::Replace,
            ImpactBucket::Interrupt,
            ImpactBucket::Unavailable,
            ImpactBucket::Unknown,
        ]
        .into_iter()
        .filter(|bucket| self.bucket(*bucket).contains_key(name))
        .collect()
    }

    /// Leaves each resource only in its most severe bucket.
    ///
    /// Whole-resource additions and removals dominate; among update effects
    /// the order is unavailable, replace, interrupt, unknown.
    pub fn scrub(&mut self) {
        const PRECEDENCE: [ImpactBucket; 6] = [
            ImpactBucket::Added,
            ImpactBucket::Removed,
            ImpactBucket::Unavailable,
            ImpactBucket::Replace,
            ImpactBucket::Interrupt,
            ImpactBucket::Unknown,
        ];

        for (rank, lower) in PRECEDENCE.iter().enumerate().skip(2) {
            let names: Vec<String> = PRECEDENCE[..rank]
                .iter()
                .flat_map(|higher| self.bucket(*higher).keys().cloned().collect::<Vec<_>>())
                .collect();
            let bucket = self.bucket_mut(*lower);
            for name in names {
                if bucket.remove(&name).is_some() {
                    debug!("Scrubbed {name} from {lower}");
                }
            }
        }
    }

    /// Rejects a resource recorded as both added and removed.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ConflictingBuckets`] on the first such resource.
    pub fn check_conflicts(&self, stack: &str) -> Result<()> {
        if let Some(name) = self.added.keys().find(|name| self.removed.contains_key(*name)) {
            return Err(PlanError::ConflictingBuckets {
                stack: stack.to_string(),
                name: name.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Checksum of the serialized plan, used to detect a fixed point.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be serialized.
    pub fn checksum(&self) -> Result<String> {
        ContentHasher::new().hash_value(self)
    }

    /// Number of resources affected at this level and below.
    #[must_use]
    pub fn impact_count(&self) -> usize {
        self.added.len()
            + self.removed.len()
            + self.replace.len()
            + self.interrupt.len()
            + self.unavailable.len()
            + self.unknown.len()
            + self.stacks.values().map(Self::impact_count).sum::<usize>()
    }
}

impl fmt::Display for ImpactBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Replace => "replace",
            Self::Interrupt => "interrupt",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}
