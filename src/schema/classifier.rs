//! Resource effect classification.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::template::Expression;

use super::provider::{ResourceSchemaProvider, UpdateCause};

/// Resource types whose init metadata is only applied on creation.
pub const DEFAULT_INIT_REPLACEMENT_TYPES: &[&str] =
    &["AWS::EC2::Instance", "AWS::AutoScaling::LaunchConfiguration"];

/// Decides the operational effect of a property change.
#[derive(Clone)]
pub struct EffectClassifier {
    /// Schema source.
    provider: Arc<dyn ResourceSchemaProvider>,
    /// Types for which init metadata changes force replacement.
    init_replacement_types: Vec<String>,
}

impl EffectClassifier {
    /// Creates a classifier with the default init allow-list.
    #[must_use]
    pub fn new(provider: Arc<dyn ResourceSchemaProvider>) -> Self {
        Self {
            provider,
            init_replacement_types: DEFAULT_INIT_REPLACEMENT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }

    /// Replaces the init allow-list.
    #[must_use]
    pub fn with_init_replacement_types(mut self, types: Vec<String>) -> Self {
        self.init_replacement_types = types;
        self
    }

    /// Classifies a change of `property` on a resource of `resource_type`.
    ///
    /// Never fails: a provider error or a missing schema entry is `Unknown`.
    #[must_use]
    pub fn classify(
        &self,
        resource_type: &str,
        property: &str,
        proposed: &Expression,
        origin: &Expression,
    ) -> UpdateCause {
        let schema = match self.provider.lookup(resource_type) {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                debug!("No schema for resource type {resource_type}");
                return UpdateCause::Unknown;
            }
            Err(e) => {
                warn!(
                    "Schema provider {} failed for {resource_type}: {e}",
                    self.provider.provider_name()
                );
                return UpdateCause::Unknown;
            }
        };

        schema.property(property).map_or_else(
            || {
                debug!("Property {property} not described for {resource_type}");
                UpdateCause::Unknown
            },
            |descriptor| descriptor.update_causes(proposed, origin),
        )
    }

    /// Classifies a change confined to init metadata.
    ///
    /// Returns `None` when the change has no operational effect.
    #[must_use]
    pub fn classify_init(&self, resource_type: &str) -> Option<UpdateCause> {
        self.init_replacement_types
            .iter()
            .any(|t| t == resource_type)
            .then_some(UpdateCause::Replacement)
    }

    /// Gets the init allow-list.
    #[must_use]
    pub fn init_replacement_types(&self) -> &[String] {
        &self.init_replacement_types
    }
}

impl std::fmt::Debug for EffectClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectClassifier")
            .field("provider", &self.provider.provider_name())
            .field("init_replacement_types", &self.init_replacement_types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, StackPlanError};
    use crate::schema::{ResourceSchema, SchemaRegistry};

    struct FailingProvider;

    impl ResourceSchemaProvider for FailingProvider {
        fn lookup(&self, _resource_type: &str) -> Result<Option<&ResourceSchema>> {
            Err(StackPlanError::internal("schema service unreachable"))
        }

        fn provider_name(&self) -> &'static str {
            "failing"
        }
    }

    fn classifier() -> EffectClassifier {
        EffectClassifier::new(Arc::new(SchemaRegistry::builtin()))
    }

    #[test]
    fn test_known_property() {
        let c = classifier();
        assert_eq!(
            c.classify("AWS::EC2::Instance", "ImageId", &Expression::Null, &Expression::Null),
            UpdateCause::Replacement
        );
        assert_eq!(
            c.classify("AWS::EC2::Instance", "InstanceType", &Expression::Null, &Expression::Null),
            UpdateCause::Interrupt
        );
        assert_eq!(
            c.classify("AWS::S3::Bucket", "Tags", &Expression::Null, &Expression::Null),
            UpdateCause::None
        );
    }

    #[test]
    fn test_unknown_type_and_property() {
        let c = classifier();
        assert_eq!(
            c.classify("Custom::Thing", "Size", &Expression::Null, &Expression::Null),
            UpdateCause::Unknown
        );
        assert_eq!(
            c.classify("AWS::S3::Bucket", "Nonexistent", &Expression::Null, &Expression::Null),
            UpdateCause::Unknown
        );
    }

    #[test]
    fn test_provider_failure_is_unknown() {
        let c = EffectClassifier::new(Arc::new(FailingProvider));
        assert_eq!(
            c.classify("AWS::EC2::Instance", "ImageId", &Expression::Null, &Expression::Null),
            UpdateCause::Unknown
        );
    }

    #[test]
    fn test_init_allow_list() {
        let c = classifier();
        assert_eq!(
            c.classify_init("AWS::EC2::Instance"),
            Some(UpdateCause::Replacement)
        );
        assert_eq!(c.classify_init("AWS::AutoScaling::AutoScalingGroup"), None);

        let custom = classifier().with_init_replacement_types(vec![String::from("Custom::Box")]);
        assert_eq!(custom.classify_init("Custom::Box"), Some(UpdateCause::Replacement));
        assert_eq!(custom.classify_init("AWS::EC2::Instance"), None);
    }
}
