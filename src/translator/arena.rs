//! Translator arena keyed by stack identity.
//!
//! One arena lives for one planning invocation. Rebinding a translator to a
//! new template or parameter set keeps every flag raised so far for that
//! identity, so taint discovered in one fixed-point pass survives the next.

use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::Result;
use crate::template::{ParameterSet, Template};

use super::evaluator::Translator;

/// Stable identity of a stack within one planning invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackIdentity(String);

impl StackIdentity {
    /// Identity of the proposed side of a stack: content checksum + nesting path.
    #[must_use]
    pub fn proposed(checksum: &str, nesting_path: &str) -> Self {
        Self(format!("{checksum}_{nesting_path}"))
    }

    /// Identity of the origin side of a stack.
    #[must_use]
    pub fn origin(checksum: &str) -> Self {
        Self(format!("{checksum}_origin"))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of every translator used by one planning invocation.
#[derive(Debug, Default)]
pub struct TranslatorArena {
    /// Translators by identity.
    translators: HashMap<StackIdentity, Translator>,
}

impl TranslatorArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a fresh translator for `identity`, carrying over existing flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the template's mappings cannot be evaluated.
    pub fn bind(
        &mut self,
        identity: &StackIdentity,
        template: &Template,
        parameters: ParameterSet,
    ) -> Result<&mut Translator> {
        let mut translator = Translator::new(template, parameters)?;
        if let Some(previous) = self.translators.get(identity) {
            translator.inherit_flags(previous);
            debug!(
                "Rebinding translator {identity} with {} carried flags",
                previous.flagged().len()
            );
        }
        self.translators.insert(identity.clone(), translator);
        Ok(self.get_mut(identity))
    }

    /// Gets the translator for `identity`, creating an empty one if needed.
    pub fn get_mut(&mut self, identity: &StackIdentity) -> &mut Translator {
        self.translators.entry(identity.clone()).or_default()
    }

    /// Gets the translator for `identity`, if bound.
    #[must_use]
    pub fn get(&self, identity: &StackIdentity) -> Option<&Translator> {
        self.translators.get(identity)
    }

    /// Number of translators held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.translators.len()
    }

    /// Returns true if no translator has been bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebind_keeps_flags() {
        let mut arena = TranslatorArena::new();
        let id = StackIdentity::proposed("abc123", "root");
        let template = Template::default();

        arena
            .bind(&id, &template, ParameterSet::new())
            .expect("bind")
            .flag_ref("Web");

        let rebound = arena
            .bind(&id, &template, ParameterSet::from_strings([("Env", "prod")]))
            .expect("rebind");
        assert!(rebound.is_flagged("Web"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_identities_are_distinct() {
        let origin = StackIdentity::origin("abc123");
        let proposed = StackIdentity::proposed("abc123", "root");
        assert_ne!(origin, proposed);

        let mut arena = TranslatorArena::new();
        arena.get_mut(&proposed).flag_ref("Web");
        assert!(arena.get(&origin).is_none());
        assert!(!arena.get_mut(&origin).is_flagged("Web"));
    }
}
