//! Structural diff between two dereferenced documents.
//!
//! Maps are compared key by key and lists index by index. Every leaf
//! difference becomes one [`DiffEntry`] whose path names the location in
//! the document, with list positions rendered as `[n]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::template::Expression;

/// Engine for computing structural diffs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    /// Present only in the proposed document.
    Added,
    /// Present only in the origin document.
    Removed,
    /// Present in both with different values.
    Changed,
}

/// One difference between origin and proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Dot-separated path to the difference.
    pub path: String,
    /// Type of difference.
    pub kind: DiffType,
    /// Origin value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Expression>,
    /// Proposed value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Expression>,
    /// Path segments, list indices attached to their key.
    #[serde(skip)]
    segments: Vec<String>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes every difference between `origin` and `proposed`.
    #[must_use]
    pub fn compute_diff(&self, origin: &Expression, proposed: &Expression) -> Vec<DiffEntry> {
        let mut entries = Vec::new();
        Self::walk(&mut Vec::new(), origin, proposed, &mut entries);
        trace!("Computed {} diff entries", entries.len());
        entries
    }

    fn walk(
        segments: &mut Vec<String>,
        origin: &Expression,
        proposed: &Expression,
        entries: &mut Vec<DiffEntry>,
    ) {
        match (origin, proposed) {
            (Expression::Map(left), Expression::Map(right)) => {
                for (key, value) in left {
                    segments.push(key.clone());
                    match right.get(key) {
                        Some(other) => Self::walk(segments, value, other, entries),
                        None => entries.push(DiffEntry::removed(segments.clone(), value.clone())),
                    }
                    segments.pop();
                }
                for (key, value) in right {
                    if !left.contains_key(key) {
                        segments.push(key.clone());
                        entries.push(DiffEntry::added(segments.clone(), value.clone()));
                        segments.pop();
                    }
                }
            }
            (Expression::List(left), Expression::List(right)) => {
                for index in 0..left.len().max(right.len()) {
                    let mut indexed = segments.clone();
                    push_index(&mut indexed, index);
                    match (left.get(index), right.get(index)) {
                        (Some(l), Some(r)) => Self::walk(&mut indexed, l, r, entries),
                        (Some(l), None) => entries.push(DiffEntry::removed(indexed, l.clone())),
                        (None, Some(r)) => entries.push(DiffEntry::added(indexed, r.clone())),
                        (None, None) => {}
                    }
                }
            }
            (left, right) if left != right => {
                entries.push(DiffEntry::changed(
                    segments.clone(),
                    left.clone(),
                    right.clone(),
                ));
            }
            _ => {}
        }
    }
}

fn push_index(segments: &mut Vec<String>, index: usize) {
    match segments.last_mut() {
        Some(last) => last.push_str(&format!("[{index}]")),
        None => segments.push(format!("[{index}]")),
    }
}

/// Strips trailing `[n]` list indices from a path segment.
#[must_use]
pub fn strip_indices(segment: &str) -> &str {
    segment.find('[').map_or(segment, |pos| &segment[..pos])
}

impl DiffEntry {
    fn new(
        segments: Vec<String>,
        kind: DiffType,
        original: Option<Expression>,
        updated: Option<Expression>,
    ) -> Self {
        Self {
            path: segments.join("."),
            kind,
            original,
            updated,
            segments,
        }
    }

    /// Creates an entry for a value only in the proposed document.
    #[must_use]
    pub fn added(segments: Vec<String>, updated: Expression) -> Self {
        Self::new(segments, DiffType::Added, None, Some(updated))
    }

    /// Creates an entry for a value only in the origin document.
    #[must_use]
    pub fn removed(segments: Vec<String>, original: Expression) -> Self {
        Self::new(segments, DiffType::Removed, Some(original), None)
    }

    /// Creates an entry for a changed value.
    #[must_use]
    pub fn changed(segments: Vec<String>, original: Expression, updated: Expression) -> Self {
        Self::new(segments, DiffType::Changed, Some(original), Some(updated))
    }

    /// Segment at `depth`, with list indices stripped.
    #[must_use]
    pub fn segment(&self, depth: usize) -> Option<&str> {
        self.segments.get(depth).map(|s| strip_indices(s))
    }

    /// Number of path segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}
