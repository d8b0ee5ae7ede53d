//! Content hashing for stack identity and plan convergence.
//!
//! Values are hashed through their JSON serialization. Every map type
//! hashed here is ordered, so equal values always produce equal digests.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{PlanError, Result};

/// Hasher for computing content checksums.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHasher;

impl ContentHasher {
    /// Creates a new content hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the checksum of a serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn hash_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let bytes = serde_json::to_vec(value).map_err(|e| PlanError::Serialization {
            message: e.to_string(),
        })?;
        Ok(self.hash_bytes(&bytes))
    }

    /// Computes the checksum of raw bytes.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_hash_deterministic() {
        let hasher = ContentHasher::new();
        let mut a = BTreeMap::new();
        a.insert("b", 2);
        a.insert("a", 1);
        let mut b = BTreeMap::new();
        b.insert("a", 1);
        b.insert("b", 2);

        assert_eq!(
            hasher.hash_value(&a).expect("hash"),
            hasher.hash_value(&b).expect("hash")
        );
    }

    #[test]
    fn test_different_values_different_hash() {
        let hasher = ContentHasher::new();
        assert_ne!(
            hasher.hash_value("stack-a").expect("hash"),
            hasher.hash_value("stack-b").expect("hash")
        );
    }
}
