//! Live stack snapshot types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::template::{ParameterSet, Template};

/// Default nested stack resource type.
pub const DEFAULT_STACK_TYPE: &str = "AWS::CloudFormation::Stack";

/// Snapshot of a live stack as reported by the orchestration API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSnapshot {
    /// Stack identifier (an ARN for real stacks).
    pub id: String,
    /// Stack name.
    pub name: String,
    /// Current parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Current template.
    #[serde(default)]
    pub template: Template,
    /// Notification topics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notification_topics: Vec<String>,
    /// Nested stacks created by this stack.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<NestedStackRef>,
}

/// Link from a parent stack to one of its nested stacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedStackRef {
    /// Logical resource name in the parent template.
    pub logical_id: String,
    /// Name of the nested stack.
    pub stack_name: String,
}

impl StackSnapshot {
    /// Creates a snapshot with no parameters or nested stacks.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, template: Template) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters: BTreeMap::new(),
            template,
            notification_topics: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// Adds a parameter value (builder style).
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds a nested stack link (builder style).
    #[must_use]
    pub fn with_nested(mut self, logical_id: impl Into<String>, stack_name: impl Into<String>) -> Self {
        self.nested.push(NestedStackRef {
            logical_id: logical_id.into(),
            stack_name: stack_name.into(),
        });
        self
    }

    /// Current parameters as a parameter set.
    #[must_use]
    pub fn parameter_set(&self) -> ParameterSet {
        ParameterSet::from_strings(self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Name of the nested stack behind a logical resource.
    #[must_use]
    pub fn nested_stack_name(&self, logical_id: &str) -> Option<&str> {
        self.nested
            .iter()
            .find(|n| n.logical_id == logical_id)
            .map(|n| n.stack_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot_yaml() {
        let snapshot: StackSnapshot = serde_yaml::from_str(
            r"
id: arn:aws:cloudformation:us-east-1:123456789012:stack/app/1
name: app
parameters:
  Env: prod
template:
  Resources:
    Network:
      Type: AWS::CloudFormation::Stack
      Properties:
        TemplateURL: https://example.com/network.json
nested:
  - logical_id: Network
    stack_name: app-Network-1
",
        )
        .expect("parse snapshot");

        assert_eq!(snapshot.parameters["Env"], "prod");
        assert_eq!(snapshot.nested_stack_name("Network"), Some("app-Network-1"));
        assert_eq!(snapshot.nested_stack_name("Missing"), None);
        assert_eq!(snapshot.template.resources.len(), 1);
    }

    #[test]
    fn test_parameter_set() {
        let snapshot = StackSnapshot::new("id", "app", Template::default()).with_parameter("Env", "dev");
        let params = snapshot.parameter_set();
        assert_eq!(params.get("Env").and_then(|v| v.as_str()), Some("dev"));
    }
}
