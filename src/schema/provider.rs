//! Resource schema types and the provider interface.
//!
//! A provider answers one question per resource type: for each declared
//! property, what happens to a live resource when that property changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::template::Expression;

/// Operational effect of changing one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateCause {
    /// The resource is destroyed and recreated.
    Replacement,
    /// The resource is briefly interrupted.
    Interrupt,
    /// The resource is unavailable while the update is applied.
    Unavailable,
    /// No operational effect.
    None,
    /// The effect cannot be determined.
    Unknown,
}

/// Predicate over (proposed resource, origin resource).
pub type CausePredicate = fn(&Expression, &Expression) -> bool;

/// One branch of a conditional update cause.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalCause {
    /// Cause applied when the predicate matches.
    pub cause: UpdateCause,
    /// Predicate evaluated on both resource definitions.
    pub applies: CausePredicate,
}

/// How a property's update cause is determined.
#[derive(Debug, Clone)]
pub enum UpdateCauses {
    /// Always the same cause.
    Always(UpdateCause),
    /// First matching branch wins; no match is `Unknown`.
    Conditional(Vec<ConditionalCause>),
}

/// Update semantics of one property.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// Update cause rule.
    pub causes: UpdateCauses,
}

/// Update semantics of one resource type.
#[derive(Debug, Clone, Default)]
pub struct ResourceSchema {
    /// Resource type name.
    pub resource_type: String,
    /// Property descriptors by name.
    properties: BTreeMap<String, PropertyDescriptor>,
}

/// Source of resource schemas.
pub trait ResourceSchemaProvider: Send + Sync {
    /// Looks up the schema of a resource type.
    ///
    /// Returns `None` if the type is not known.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider itself fails.
    fn lookup(&self, resource_type: &str) -> Result<Option<&ResourceSchema>>;

    /// Gets the provider name.
    fn provider_name(&self) -> &'static str;
}

impl PropertyDescriptor {
    /// Creates a descriptor with a fixed cause.
    #[must_use]
    pub fn always(name: impl Into<String>, cause: UpdateCause) -> Self {
        Self {
            name: name.into(),
            causes: UpdateCauses::Always(cause),
        }
    }

    /// Creates a descriptor with conditional causes.
    #[must_use]
    pub fn conditional(name: impl Into<String>, branches: Vec<ConditionalCause>) -> Self {
        Self {
            name: name.into(),
            causes: UpdateCauses::Conditional(branches),
        }
    }

    /// Evaluates the update cause for a change from `origin` to `proposed`.
    #[must_use]
    pub fn update_causes(&self, proposed: &Expression, origin: &Expression) -> UpdateCause {
        match &self.causes {
            UpdateCauses::Always(cause) => *cause,
            UpdateCauses::Conditional(branches) => branches
                .iter()
                .find(|branch| (branch.applies)(proposed, origin))
                .map_or(UpdateCause::Unknown, |branch| branch.cause),
        }
    }
}

impl ResourceSchema {
    /// Creates an empty schema for a resource type.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Creates a schema from fixed (property, cause) pairs.
    #[must_use]
    pub fn from_table(resource_type: &str, table: &[(&str, UpdateCause)]) -> Self {
        let mut schema = Self::new(resource_type);
        for (name, cause) in table {
            schema.insert(PropertyDescriptor::always(*name, *cause));
        }
        schema
    }

    /// Adds or replaces a property descriptor.
    pub fn insert(&mut self, descriptor: PropertyDescriptor) {
        self.properties.insert(descriptor.name.clone(), descriptor);
    }

    /// Gets a property descriptor.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    /// Property names.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Merges another schema's properties over this one.
    pub fn merge(&mut self, other: Self) {
        self.properties.extend(other.properties);
    }
}

impl fmt::Display for UpdateCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Replacement => "replacement",
            Self::Interrupt => "interrupt",
            Self::Unavailable => "unavailable",
            Self::None => "none",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for UpdateCauses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always(cause) => write!(f, "{cause}"),
            Self::Conditional(branches) => {
                let causes: Vec<String> = branches.iter().map(|b| b.cause.to_string()).collect();
                write!(f, "conditional({})", causes.join("|"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_standard(proposed: &Expression, _origin: &Expression) -> bool {
        proposed.get_path(&["Properties", "StorageType"]) == Some(&Expression::string("standard"))
    }

    #[test]
    fn test_conditional_first_match_wins() {
        let descriptor = PropertyDescriptor::conditional(
            "AllocatedStorage",
            vec![
                ConditionalCause {
                    cause: UpdateCause::Unavailable,
                    applies: is_standard,
                },
                ConditionalCause {
                    cause: UpdateCause::None,
                    applies: |_, _| true,
                },
            ],
        );

        let standard = Expression::map([(
            "Properties",
            Expression::map([("StorageType", Expression::string("standard"))]),
        )]);
        let gp2 = Expression::map([(
            "Properties",
            Expression::map([("StorageType", Expression::string("gp2"))]),
        )]);

        assert_eq!(descriptor.update_causes(&standard, &gp2), UpdateCause::Unavailable);
        assert_eq!(descriptor.update_causes(&gp2, &gp2), UpdateCause::None);
    }

    #[test]
    fn test_conditional_without_match_is_unknown() {
        let descriptor = PropertyDescriptor::conditional("X", vec![]);
        assert_eq!(
            descriptor.update_causes(&Expression::Null, &Expression::Null),
            UpdateCause::Unknown
        );
    }

    #[test]
    fn test_update_cause_serde() {
        let cause: UpdateCause = serde_json::from_str("\"replacement\"").expect("parse");
        assert_eq!(cause, UpdateCause::Replacement);
        assert_eq!(UpdateCause::Interrupt.to_string(), "interrupt");
    }
}
