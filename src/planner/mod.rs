//! Planning module for stack updates.
//!
//! This module compares the live and proposed documents of a stack tree,
//! buckets every difference by its operational effect, and aggregates the
//! result into a [`PlanResult`].

mod aggregator;
mod diff;
mod plan;

pub use aggregator::{Planner, PlannerOptions};
pub use diff::{DiffEngine, DiffEntry, DiffType, strip_indices};
pub use plan::{ImpactBucket, PlanResult, ResourceImpact};
