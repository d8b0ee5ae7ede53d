//! Stack state cache.
//!
//! This module provides the cache used to avoid re-fetching remote stack
//! state on every planning run:
//! - Named locks with a timeout, process-local or file-backed
//! - Values stamped with their last write time and gated by per-kind TTLs

mod lock;
mod stamped;
mod store;

pub use lock::{CacheLockGuard, LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use stamped::StampedValue;
pub use store::{
    CacheBackend, CacheTtl, DEFAULT_ACCOUNT_TTL, DEFAULT_STACK_TTL, DataKind, StackCache,
};
