//! Intrinsic function evaluation.
//!
//! A [`Translator`] is bound to one template and one parameter set. It turns
//! expression trees into literal values where it can, leaves references it
//! cannot resolve intact, and substitutes [`Expression::RuntimeModified`] for
//! any reference that has been flagged as changing during the update.

use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::error::{Result, TemplateError};
use crate::template::{
    Expression, FN_FIND_IN_MAP, FN_SELECT, METADATA_KEY, Mappings, NESTED_TEMPLATE_KEY,
    OUTPUTS_KEY, PROPERTIES_KEY, ParameterSet, RESOURCES_KEY, TYPE_KEY, Template,
};

/// Attribute prefix used to read nested stack outputs.
pub const OUTPUTS_ATTRIBUTE_PREFIX: &str = "Outputs.";

/// Which intrinsic functions may be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedFunctions {
    /// Only `Ref` and `Fn::GetAtt`.
    References,
    /// Every supported function.
    All,
}

/// Evaluator for one (template, parameters) pair.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    /// Mapping tables, with references already resolved.
    mappings: Mappings,
    /// Declared parameters and their defaults.
    declared: BTreeMap<String, Option<Expression>>,
    /// Parameter values.
    parameters: ParameterSet,
    /// References that must resolve to the runtime-modified sentinel.
    flagged: BTreeSet<String>,
}

impl Translator {
    /// Creates a translator bound to a template and parameter set.
    ///
    /// # Errors
    ///
    /// Returns an error if the template's mappings cannot be evaluated.
    pub fn new(template: &Template, parameters: ParameterSet) -> Result<Self> {
        let mut translator = Self {
            mappings: Mappings::new(),
            declared: template
                .parameters
                .iter()
                .map(|(name, def)| (name.clone(), def.default.clone()))
                .collect(),
            parameters,
            flagged: BTreeSet::new(),
        };

        let mut mappings = Mappings::new();
        for (map_name, table) in &template.mappings {
            let mut resolved_table = BTreeMap::new();
            for (top_key, entries) in table {
                let mut resolved_entries = BTreeMap::new();
                for (second_key, value) in entries {
                    resolved_entries.insert(
                        second_key.clone(),
                        translator.dereference_with(value, AllowedFunctions::References)?,
                    );
                }
                resolved_table.insert(top_key.clone(), resolved_entries);
            }
            mappings.insert(map_name.clone(), resolved_table);
        }
        translator.mappings = mappings;

        Ok(translator)
    }

    /// Marks a reference name as runtime-modified. Repeated flagging is a no-op.
    pub fn flag_ref(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.flagged.insert(name.clone()) {
            trace!("Flagged reference: {name}");
        }
    }

    /// Returns true if the reference name is flagged.
    #[must_use]
    pub fn is_flagged(&self, name: &str) -> bool {
        self.flagged.contains(name)
    }

    /// Returns the flagged reference names.
    #[must_use]
    pub const fn flagged(&self) -> &BTreeSet<String> {
        &self.flagged
    }

    /// Copies flags from another translator.
    pub fn inherit_flags(&mut self, other: &Self) {
        self.flagged.extend(other.flagged.iter().cloned());
    }

    /// Composite flag key for a nested stack output.
    #[must_use]
    pub fn output_flag(stack_name: &str, output_name: &str) -> String {
        format!("{stack_name}_{OUTPUTS_ATTRIBUTE_PREFIX}{output_name}")
    }

    /// Dereferences an expression with every function allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if a mapping lookup fails or a function is malformed.
    pub fn dereference(&self, expr: &Expression) -> Result<Expression> {
        self.dereference_with(expr, AllowedFunctions::All)
    }

    /// Recursively dereferences an expression, applying allowed functions.
    ///
    /// # Errors
    ///
    /// Returns an error if a mapping lookup fails or a function is malformed.
    pub fn dereference_with(&self, expr: &Expression, allowed: AllowedFunctions) -> Result<Expression> {
        match expr {
            Expression::List(items) => items
                .iter()
                .map(|item| self.dereference_with(item, allowed))
                .collect::<Result<Vec<_>>>()
                .map(Expression::List),
            Expression::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.dereference_with(v, allowed)?)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Expression::Map),
            node if node.is_function() => self.apply_function(node, allowed),
            literal => Ok(literal.clone()),
        }
    }

    /// Evaluates a single function node.
    ///
    /// # Errors
    ///
    /// Returns an error if a mapping lookup fails or a function is malformed.
    pub fn apply_function(&self, node: &Expression, allowed: AllowedFunctions) -> Result<Expression> {
        match node {
            Expression::Ref(name) => self.resolve_ref(name, allowed),
            Expression::GetAtt {
                resource,
                attribute,
            } => Ok(self.resolve_get_att(resource, attribute, node)),
            _ if allowed == AllowedFunctions::References => Ok(node.clone()),
            Expression::Join { delimiter, parts } => self.fn_join(delimiter, parts),
            Expression::FindInMap {
                map,
                top_key,
                second_key,
            } => self.fn_find_in_map(map, top_key, second_key),
            Expression::Select { index, list } => self.fn_select(index, list),
            Expression::Function { name, args } => Ok(Expression::Function {
                name: name.clone(),
                args: Box::new(self.dereference_with(args, allowed)?),
            }),
            other => Ok(other.clone()),
        }
    }

    /// Dereferences a whole template into a document tree for diffing.
    ///
    /// The document holds `Resources` and `Outputs`. Every resource carries
    /// `Type`, `Properties` and `Metadata`; embedded templates of nested
    /// stack resources are stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if any expression fails to evaluate.
    pub fn dereference_template(&self, template: &Template, stack_types: &[String]) -> Result<Expression> {
        let mut resources = BTreeMap::new();
        for (name, resource) in &template.resources {
            let mut properties = BTreeMap::new();
            for (key, value) in &resource.properties {
                if key == NESTED_TEMPLATE_KEY && stack_types.contains(&resource.resource_type) {
                    continue;
                }
                properties.insert(key.clone(), self.dereference(value)?);
            }

            let mut metadata = BTreeMap::new();
            for (key, value) in &resource.metadata {
                metadata.insert(key.clone(), self.dereference(value)?);
            }

            let mut node = BTreeMap::new();
            node.insert(
                String::from(TYPE_KEY),
                Expression::String(resource.resource_type.clone()),
            );
            node.insert(String::from(PROPERTIES_KEY), Expression::Map(properties));
            node.insert(String::from(METADATA_KEY), Expression::Map(metadata));
            if let Some(depends_on) = &resource.depends_on {
                node.insert(String::from("DependsOn"), depends_on.clone());
            }
            resources.insert(name.clone(), Expression::Map(node));
        }

        let mut outputs = BTreeMap::new();
        for (name, output) in &template.outputs {
            outputs.insert(name.clone(), self.dereference(output)?);
        }

        Ok(Expression::map([
            (RESOURCES_KEY, Expression::Map(resources)),
            (OUTPUTS_KEY, Expression::Map(outputs)),
        ]))
    }

    fn resolve_ref(&self, name: &str, allowed: AllowedFunctions) -> Result<Expression> {
        if self.is_flagged(name) {
            return Ok(Expression::RuntimeModified);
        }
        if let Some(value) = self.parameters.get(name) {
            return Ok(value.clone());
        }
        if let Some(Some(default)) = self.declared.get(name) {
            return self.dereference_with(default, allowed);
        }
        // Inter-resource reference, left for the orchestrator
        Ok(Expression::Ref(name.to_string()))
    }

    fn resolve_get_att(&self, resource: &str, attribute: &str, node: &Expression) -> Expression {
        if attribute.starts_with(OUTPUTS_ATTRIBUTE_PREFIX)
            && self.is_flagged(&format!("{resource}_{attribute}"))
        {
            return Expression::RuntimeModified;
        }
        if self.is_flagged(resource) {
            return Expression::RuntimeModified;
        }
        node.clone()
    }

    fn fn_join(&self, delimiter: &str, parts: &Expression) -> Result<Expression> {
        let items = match self.dereference(parts)? {
            Expression::List(items) => items,
            Expression::RuntimeModified => return Ok(Expression::RuntimeModified),
            other => {
                return Ok(Expression::Join {
                    delimiter: delimiter.to_string(),
                    parts: Box::new(other),
                });
            }
        };

        if items.iter().any(Expression::is_runtime_modified) {
            return Ok(Expression::RuntimeModified);
        }

        let strings: Option<Vec<String>> = items.iter().map(Expression::scalar_string).collect();
        match strings {
            Some(strings) => Ok(Expression::String(strings.join(delimiter))),
            None => Ok(Expression::Join {
                delimiter: delimiter.to_string(),
                parts: Box::new(Expression::List(items)),
            }),
        }
    }

    fn fn_find_in_map(
        &self,
        map: &Expression,
        top_key: &Expression,
        second_key: &Expression,
    ) -> Result<Expression> {
        let map = self.dereference(map)?;
        let top_key = self.dereference(top_key)?;
        let second_key = self.dereference(second_key)?;

        if [&map, &top_key, &second_key]
            .iter()
            .any(|e| e.is_runtime_modified())
        {
            return Ok(Expression::RuntimeModified);
        }

        let (Some(map_name), Some(top), Some(second)) = (
            map.scalar_string(),
            top_key.scalar_string(),
            second_key.scalar_string(),
        ) else {
            return Ok(Expression::FindInMap {
                map: Box::new(map),
                top_key: Box::new(top_key),
                second_key: Box::new(second_key),
            });
        };

        let value = self
            .mappings
            .get(&map_name)
            .and_then(|table| table.get(&top))
            .and_then(|entries| entries.get(&second))
            .ok_or_else(|| TemplateError::MappingNotFound {
                map: map_name.clone(),
                top_key: top.clone(),
                second_key: second.clone(),
            })?;

        trace!("{FN_FIND_IN_MAP} {map_name}.{top}.{second} resolved");
        self.dereference(value)
    }

    fn fn_select(&self, index: &Expression, list: &Expression) -> Result<Expression> {
        let index = self.dereference(index)?;
        let list = self.dereference(list)?;

        if index.is_runtime_modified() || list.is_runtime_modified() {
            return Ok(Expression::RuntimeModified);
        }

        match (index.scalar_string(), &list) {
            (Some(raw), Expression::List(items)) => {
                let position: usize = raw.parse().map_err(|_| {
                    TemplateError::malformed(FN_SELECT, format!("index '{raw}' is not a number"))
                })?;
                items.get(position).cloned().ok_or_else(|| {
                    TemplateError::malformed(
                        FN_SELECT,
                        format!("index {position} out of range for {} items", items.len()),
                    )
                    .into()
                })
            }
            _ => Ok(Expression::Select {
                index: Box::new(index),
                list: Box::new(list),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackPlanError;
    use serde_json::json;

    fn template() -> Template {
        Template::parse(
            r#"{
                "Parameters": {
                    "Env": {"Type": "String", "Default": "dev"},
                    "Size": {"Type": "String"}
                },
                "Mappings": {
                    "RegionMap": {
                        "us-east-1": {"Ami": "ami-east"},
                        "eu-west-1": {"Ami": "ami-west"}
                    }
                },
                "Resources": {}
            }"#,
        )
        .expect("template")
    }

    fn translator() -> Translator {
        let params = ParameterSet::from_strings([("AWS::Region", "us-east-1"), ("Size", "large")]);
        Translator::new(&template(), params).expect("translator")
    }

    fn deref(translator: &Translator, value: serde_json::Value) -> Expression {
        translator
            .dereference(&Expression::from(value))
            .expect("dereference")
    }

    #[test]
    fn test_ref_parameter_and_default() {
        let t = translator();
        assert_eq!(deref(&t, json!({"Ref": "Size"})), Expression::string("large"));
        assert_eq!(deref(&t, json!({"Ref": "Env"})), Expression::string("dev"));
    }

    #[test]
    fn test_ref_resource_left_intact() {
        let t = translator();
        assert_eq!(deref(&t, json!({"Ref": "Bucket"})), Expression::reference("Bucket"));
    }

    #[test]
    fn test_join_resolves_literals() {
        let t = translator();
        assert_eq!(
            deref(&t, json!({"Fn::Join": ["-", [{"Ref": "Env"}, "web", 1]]})),
            Expression::string("dev-web-1")
        );
    }

    #[test]
    fn test_join_with_unresolved_part_keeps_node() {
        let t = translator();
        let result = deref(&t, json!({"Fn::Join": ["-", [{"Ref": "Env"}, {"Ref": "Bucket"}]]}));
        assert!(matches!(result, Expression::Join { .. }));
    }

    #[test]
    fn test_find_in_map() {
        let t = translator();
        assert_eq!(
            deref(&t, json!({"Fn::FindInMap": ["RegionMap", {"Ref": "AWS::Region"}, "Ami"]})),
            Expression::string("ami-east")
        );
    }

    #[test]
    fn test_find_in_map_missing_key_fails() {
        let t = translator();
        let err = t
            .dereference(&Expression::from(json!({"Fn::FindInMap": ["RegionMap", "ap-south-1", "Ami"]})))
            .expect_err("missing key must fail");
        assert!(matches!(
            err,
            StackPlanError::Template(TemplateError::MappingNotFound { ref top_key, .. }) if top_key == "ap-south-1"
        ));
    }

    #[test]
    fn test_flagged_ref_wins_over_literal() {
        let mut t = translator();
        t.flag_ref("Size");
        assert_eq!(deref(&t, json!({"Ref": "Size"})), Expression::RuntimeModified);
        assert_eq!(
            deref(&t, json!({"Fn::Join": ["-", [{"Ref": "Size"}, "x"]]})),
            Expression::RuntimeModified
        );
    }

    #[test]
    fn test_flagged_nested_output() {
        let mut t = translator();
        let node = json!({"Fn::GetAtt": ["Network", "Outputs.VpcId"]});
        assert_eq!(deref(&t, node.clone()), Expression::get_att("Network", "Outputs.VpcId"));

        t.flag_ref(Translator::output_flag("Network", "VpcId"));
        assert_eq!(deref(&t, node), Expression::RuntimeModified);
    }

    #[test]
    fn test_flag_ref_idempotent() {
        let mut t = translator();
        t.flag_ref("Web");
        t.flag_ref("Web");
        assert_eq!(t.flagged().len(), 1);
        assert!(t.is_flagged("Web"));
    }

    #[test]
    fn test_select() {
        let t = translator();
        assert_eq!(
            deref(&t, json!({"Fn::Select": ["1", ["a", {"Ref": "Size"}]]})),
            Expression::string("large")
        );
    }

    #[test]
    fn test_references_only_leaves_join() {
        let t = translator();
        let expr = Expression::from(json!({"Fn::Join": ["-", ["a", "b"]]}));
        assert_eq!(
            t.dereference_with(&expr, AllowedFunctions::References).expect("deref"),
            expr
        );
    }

    #[test]
    fn test_dereference_template_strips_nested_template() {
        let template = Template::parse(
            r#"{
                "Resources": {
                    "Child": {
                        "Type": "AWS::CloudFormation::Stack",
                        "Properties": {"Stack": {"Resources": {}}, "TimeoutInMinutes": 5}
                    }
                }
            }"#,
        )
        .expect("template");
        let t = Translator::new(&template, ParameterSet::new()).expect("translator");
        let doc = t
            .dereference_template(&template, &[String::from("AWS::CloudFormation::Stack")])
            .expect("doc");

        let props = doc
            .get_path(&["Resources", "Child", "Properties"])
            .and_then(Expression::as_map)
            .expect("properties");
        assert!(!props.contains_key("Stack"));
        assert!(props.contains_key("TimeoutInMinutes"));
    }
}
