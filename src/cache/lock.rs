//! Named locks for the stack state cache.
//!
//! Locks are either process-local (one async mutex per name) or backed by
//! lock files in a shared directory so separate processes coordinate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

/// Lock file expiry in seconds; older lock files are taken over.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Information about a held lock, persisted in lock files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Lock name.
    pub name: String,
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

/// Guard for a held named lock. The lock is released on drop.
#[derive(Debug)]
pub struct CacheLockGuard {
    /// Lock information.
    info: LockInfo,
    /// How the lock is held.
    held: HeldLock,
}

#[derive(Debug)]
enum HeldLock {
    Local { _guard: OwnedMutexGuard<()> },
    File(PathBuf),
}

impl LockInfo {
    /// Creates a new lock info.
    #[must_use]
    pub fn new(name: &str, holder: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

impl CacheLockGuard {
    pub(super) fn local(info: LockInfo, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            info,
            held: HeldLock::Local { _guard: guard },
        }
    }

    pub(super) fn file(info: LockInfo, path: PathBuf) -> Self {
        Self {
            info,
            held: HeldLock::File(path),
        }
    }

    /// Gets the lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Gets the lock info.
    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for CacheLockGuard {
    fn drop(&mut self) {
        match &self.held {
            HeldLock::Local { .. } => debug!("Released lock {}", self.info.name),
            HeldLock::File(path) => {
                // The file may have been taken over after expiry
                let owned = std::fs::read_to_string(path)
                    .ok()
                    .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
                    .is_some_and(|held| held.lock_id == self.info.lock_id);
                if !owned {
                    debug!("Lock file {} no longer ours, leaving it", path.display());
                } else if std::fs::remove_file(path).is_ok() {
                    debug!("Released lock file {}", path.display());
                }
            }
        }
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

/// Turns a lock or value name into a safe file stem.
#[must_use]
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("stack:app", "test-holder");
        assert_eq!(info.holder, "test-holder");
        assert_eq!(info.name, "stack:app");
        assert!(!info.is_expired());
        assert!(info.remaining_secs() > 0);
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);

        let pid = std::process::id().to_string();
        assert!(id1.contains(&pid));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("stack:app/Network"), "stack_app_Network");
        assert_eq!(file_stem("account-id_1"), "account-id_1");
    }
}
