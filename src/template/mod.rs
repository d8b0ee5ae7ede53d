//! Template model.
//!
//! This module holds the typed view of a stack template and the values
//! flowing through it:
//! - [`Expression`] trees with intrinsic-function nodes
//! - [`Template`] documents and their resources
//! - [`ParameterSet`] values used for dereferencing

mod document;
mod expression;
mod parameters;

use std::path::Path;
use tracing::info;

use crate::error::{Result, TemplateError};

pub use document::{
    INIT_METADATA_KEY, METADATA_KEY, Mappings, NESTED_PARAMETERS_KEY, NESTED_TEMPLATE_KEY,
    OUTPUTS_KEY, PROPERTIES_KEY, ParamDef, RESOURCES_KEY, ResourceDef, TYPE_KEY, Template,
};
pub use expression::{
    Expression, FN_FIND_IN_MAP, FN_GET_ATT, FN_JOIN, FN_REF, FN_SELECT, RUNTIME_MODIFIED,
};
pub use parameters::{
    PSEUDO_ACCOUNT_ID, PSEUDO_NOTIFICATION_ARNS, PSEUDO_REGION, PSEUDO_STACK_ID,
    PSEUDO_STACK_NAME, ParameterSet, PseudoParameters,
};

/// Loads a template from a JSON or YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid template.
pub fn load_template(path: impl AsRef<Path>) -> Result<Template> {
    let path = path.as_ref();
    info!("Loading template from: {}", path.display());

    let content = std::fs::read_to_string(path)?;
    Template::parse(&content).map_err(|e| match e {
        crate::error::StackPlanError::Template(TemplateError::ParseError { message, .. }) => {
            TemplateError::ParseError {
                message,
                location: Some(path.display().to_string()),
            }
            .into()
        }
        other => other,
    })
}
