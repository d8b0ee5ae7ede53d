//! Output formatting for CLI commands.
//!
//! Results are serialized as JSON or YAML; there is no styled text mode.

use serde::Serialize;

use crate::error::{PlanError, Result};
use crate::planner::PlanResult;
use crate::schema::ResourceSchema;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

#[derive(Serialize)]
struct SchemaJson<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
    properties: Vec<PropertyJson<'a>>,
}

#[derive(Serialize)]
struct PropertyJson<'a> {
    name: &'a str,
    update_causes: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be serialized.
    pub fn format_plan(&self, plan: &PlanResult) -> Result<String> {
        self.serialize(plan)
    }

    /// Formats a resource schema for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be serialized.
    pub fn format_schema(&self, schema: &ResourceSchema) -> Result<String> {
        let properties = schema
            .property_names()
            .filter_map(|name| {
                schema.property(name).map(|descriptor| PropertyJson {
                    name,
                    update_causes: descriptor.causes.to_string(),
                })
            })
            .collect();

        self.serialize(&SchemaJson {
            resource_type: &schema.resource_type,
            properties,
        })
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<String> {
        let output = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        };
        output.map_err(|message| PlanError::Serialization { message }.into())
    }
}
