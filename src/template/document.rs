//! Template document types.
//!
//! These types map to the JSON/YAML template layout: parameters, mappings,
//! resources and outputs. A template is an immutable snapshot once it has
//! been captured for a planning pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TemplateError};

use super::expression::Expression;

/// Root key holding resources.
pub const RESOURCES_KEY: &str = "Resources";

/// Root key holding outputs.
pub const OUTPUTS_KEY: &str = "Outputs";

/// Resource key holding declared properties.
pub const PROPERTIES_KEY: &str = "Properties";

/// Resource key holding metadata.
pub const METADATA_KEY: &str = "Metadata";

/// Resource key holding the resource type.
pub const TYPE_KEY: &str = "Type";

/// Metadata key holding embedded initialization configuration.
pub const INIT_METADATA_KEY: &str = "AWS::CloudFormation::Init";

/// Reserved property key carrying a nested stack's embedded template.
pub const NESTED_TEMPLATE_KEY: &str = "Stack";

/// Property key carrying a nested stack's parameters.
pub const NESTED_PARAMETERS_KEY: &str = "Parameters";

/// Mapping tables: map name -> top key -> second key -> value.
pub type Mappings = BTreeMap<String, BTreeMap<String, BTreeMap<String, Expression>>>;

/// A declarative stack template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template format version.
    #[serde(
        rename = "AWSTemplateFormatVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub format_version: Option<String>,
    /// Free-form description.
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared parameters.
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParamDef>,
    /// Lookup tables for `Fn::FindInMap`.
    #[serde(rename = "Mappings", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mappings: Mappings,
    /// Resource definitions.
    #[serde(rename = "Resources", default)]
    pub resources: BTreeMap<String, ResourceDef>,
    /// Output definitions.
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Expression>,
}

/// A single resource definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Resource type (e.g. `AWS::EC2::Instance`).
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Declared properties.
    #[serde(rename = "Properties", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Expression>,
    /// Explicit dependencies.
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Expression>,
    /// Resource metadata, including embedded init configuration.
    #[serde(rename = "Metadata", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Expression>,
}

/// A declared template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    /// Parameter type.
    #[serde(rename = "Type", default = "default_param_type")]
    pub param_type: String,
    /// Default value.
    #[serde(rename = "Default", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Expression>,
    /// Description.
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the value is masked.
    #[serde(rename = "NoEcho", default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
    /// Allowed values.
    #[serde(rename = "AllowedValues", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Expression>,
}

fn default_param_type() -> String {
    String::from("String")
}

impl Template {
    /// Parses a template from a JSON or YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid template.
    pub fn parse(content: &str) -> Result<Self> {
        // YAML is a superset of JSON
        serde_yaml::from_str(content).map_err(|e| {
            TemplateError::ParseError {
                message: e.to_string(),
                location: None,
            }
            .into()
        })
    }

    /// Builds a template from an expression tree (an embedded nested stack).
    ///
    /// # Errors
    ///
    /// Returns an error if the tree does not have template shape.
    pub fn from_expression(expr: &Expression) -> Result<Self> {
        serde_json::from_value(expr.to_value()).map_err(|e| {
            TemplateError::ParseError {
                message: format!("Embedded stack template is invalid: {e}"),
                location: None,
            }
            .into()
        })
    }

    /// Returns true if the named parameter is declared.
    #[must_use]
    pub fn declares_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Returns the names of resources whose type is one of `stack_types`.
    #[must_use]
    pub fn nested_stack_names(&self, stack_types: &[String]) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| stack_types.contains(&r.resource_type))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl ResourceDef {
    /// Creates a resource with the given type and no properties.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a property (builder style).
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns the embedded nested stack template, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded template is malformed.
    pub fn nested_template(&self) -> Result<Option<Template>> {
        self.properties
            .get(NESTED_TEMPLATE_KEY)
            .map(Template::from_expression)
            .transpose()
    }

    /// Returns the nested stack parameter expressions.
    #[must_use]
    pub fn nested_parameters(&self) -> BTreeMap<String, Expression> {
        self.properties
            .get(NESTED_PARAMETERS_KEY)
            .and_then(Expression::as_map)
            .cloned()
            .unwrap_or_default()
    }
}
