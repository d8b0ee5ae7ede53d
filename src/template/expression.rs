//! Template expression tree.
//!
//! Every value inside a template is an [`Expression`]: either a literal
//! (scalar, list, map) or an intrinsic-function node that must be
//! dereferenced against a parameter set before two templates can be
//! compared meaningfully.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Serialized form of the runtime-modified sentinel.
pub const RUNTIME_MODIFIED: &str = "__MODIFIED_REFERENCE_VALUE__";

/// Intrinsic function names.
pub const FN_REF: &str = "Ref";
/// `Fn::Join` function key.
pub const FN_JOIN: &str = "Fn::Join";
/// `Fn::FindInMap` function key.
pub const FN_FIND_IN_MAP: &str = "Fn::FindInMap";
/// `Fn::GetAtt` function key.
pub const FN_GET_ATT: &str = "Fn::GetAtt";
/// `Fn::Select` function key.
pub const FN_SELECT: &str = "Fn::Select";

/// A template value, literal or intrinsic.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// JSON null.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal.
    Number(Number),
    /// String literal.
    String(String),
    /// List of expressions.
    List(Vec<Expression>),
    /// Map of expressions.
    Map(BTreeMap<String, Expression>),
    /// `{"Ref": name}`.
    Ref(String),
    /// `{"Fn::Join": [delimiter, parts]}`.
    Join {
        /// Join delimiter.
        delimiter: String,
        /// Parts to join (a list, or an expression yielding one).
        parts: Box<Expression>,
    },
    /// `{"Fn::FindInMap": [map, top, second]}`.
    FindInMap {
        /// Mapping table name.
        map: Box<Expression>,
        /// First-level key.
        top_key: Box<Expression>,
        /// Second-level key.
        second_key: Box<Expression>,
    },
    /// `{"Fn::GetAtt": [resource, attribute]}`.
    GetAtt {
        /// Logical resource name.
        resource: String,
        /// Attribute path (nested stack outputs use `Outputs.Name`).
        attribute: String,
    },
    /// `{"Fn::Select": [index, list]}`.
    Select {
        /// Element index.
        index: Box<Expression>,
        /// List to select from.
        list: Box<Expression>,
    },
    /// Any other `Fn::*` node, kept opaque.
    Function {
        /// Function key.
        name: String,
        /// Raw arguments.
        args: Box<Expression>,
    },
    /// A value that will change during the update but cannot be predicted.
    RuntimeModified,
}

impl Expression {
    /// Creates a string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Creates a `Ref` node.
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }

    /// Creates a `Fn::GetAtt` node.
    #[must_use]
    pub fn get_att(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a map literal from key/value pairs.
    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for the runtime-modified sentinel.
    #[must_use]
    pub const fn is_runtime_modified(&self) -> bool {
        matches!(self, Self::RuntimeModified)
    }

    /// Returns true for intrinsic-function nodes.
    #[must_use]
    pub const fn is_function(&self) -> bool {
        matches!(
            self,
            Self::Ref(_)
                | Self::Join { .. }
                | Self::FindInMap { .. }
                | Self::GetAtt { .. }
                | Self::Select { .. }
                | Self::Function { .. }
        )
    }

    /// Returns true if no function node or sentinel occurs anywhere in the tree.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        match self {
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => true,
            Self::List(items) => items.iter().all(Self::is_literal),
            Self::Map(entries) => entries.values().all(Self::is_literal),
            _ => false,
        }
    }

    /// Returns true if the sentinel occurs anywhere in the tree.
    #[must_use]
    pub fn contains_runtime_modified(&self) -> bool {
        match self {
            Self::RuntimeModified => true,
            Self::List(items) => items.iter().any(Self::contains_runtime_modified),
            Self::Map(entries) => entries.values().any(Self::contains_runtime_modified),
            _ => false,
        }
    }

    /// Returns the string slice of a string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the entries of a map literal.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Renders a scalar literal as a string, as parameters and joins see it.
    #[must_use]
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Looks up a nested value by a sequence of map keys.
    #[must_use]
    pub fn get_path(&self, keys: &[&str]) -> Option<&Self> {
        keys.iter()
            .try_fold(self, |node, key| node.as_map().and_then(|m| m.get(*key)))
    }

    /// Converts the expression into its JSON document form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Self::Ref(name) => function_value(FN_REF, Value::String(name.clone())),
            Self::Join { delimiter, parts } => function_value(
                FN_JOIN,
                Value::Array(vec![Value::String(delimiter.clone()), parts.to_value()]),
            ),
            Self::FindInMap {
                map,
                top_key,
                second_key,
            } => function_value(
                FN_FIND_IN_MAP,
                Value::Array(vec![map.to_value(), top_key.to_value(), second_key.to_value()]),
            ),
            Self::GetAtt {
                resource,
                attribute,
            } => function_value(
                FN_GET_ATT,
                Value::Array(vec![
                    Value::String(resource.clone()),
                    Value::String(attribute.clone()),
                ]),
            ),
            Self::Select { index, list } => function_value(
                FN_SELECT,
                Value::Array(vec![index.to_value(), list.to_value()]),
            ),
            Self::Function { name, args } => function_value(name, args.to_value()),
            Self::RuntimeModified => Value::String(String::from(RUNTIME_MODIFIED)),
        }
    }

    /// Parses a single-key function object, if it is one.
    fn parse_function(key: &str, args: &Value) -> Option<Self> {
        match (key, args) {
            (FN_REF, Value::String(name)) => Some(Self::Ref(name.clone())),
            (FN_JOIN, Value::Array(items)) if items.len() == 2 => {
                let delimiter = items[0].as_str()?.to_string();
                Some(Self::Join {
                    delimiter,
                    parts: Box::new(Self::from(items[1].clone())),
                })
            }
            (FN_FIND_IN_MAP, Value::Array(items)) if items.len() == 3 => Some(Self::FindInMap {
                map: Box::new(Self::from(items[0].clone())),
                top_key: Box::new(Self::from(items[1].clone())),
                second_key: Box::new(Self::from(items[2].clone())),
            }),
            (FN_GET_ATT, Value::Array(items)) if items.len() == 2 => Some(Self::GetAtt {
                resource: items[0].as_str()?.to_string(),
                attribute: items[1].as_str()?.to_string(),
            }),
            // Short form: "Resource.Attribute"
            (FN_GET_ATT, Value::String(dotted)) => {
                let (resource, attribute) = dotted.split_once('.')?;
                Some(Self::get_att(resource, attribute))
            }
            (FN_SELECT, Value::Array(items)) if items.len() == 2 => Some(Self::Select {
                index: Box::new(Self::from(items[0].clone())),
                list: Box::new(Self::from(items[1].clone())),
            }),
            _ if key.starts_with("Fn::") => Some(Self::Function {
                name: key.to_string(),
                args: Box::new(Self::from(args.clone())),
            }),
            _ => None,
        }
    }
}

fn function_value(name: &str, args: Value) -> Value {
    let mut object = Map::new();
    object.insert(name.to_string(), args);
    Value::Object(object)
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(object) => {
                if object.len() == 1
                    && let Some((key, args)) = object.iter().next()
                    && let Some(function) = Self::parse_function(key, args)
                {
                    return function;
                }
                Self::Map(object.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_intrinsics() {
        let expr = Expression::from(json!({
            "ImageId": {"Fn::FindInMap": ["RegionMap", {"Ref": "AWS::Region"}, "Ami"]},
            "Name": {"Fn::Join": ["-", [{"Ref": "Env"}, "web"]]},
            "Endpoint": {"Fn::GetAtt": ["Database", "Endpoint.Address"]},
            "Short": {"Fn::GetAtt": "Child.Outputs.Url"}
        }));

        let map = expr.as_map().expect("map");
        assert!(matches!(map["ImageId"], Expression::FindInMap { .. }));
        assert!(matches!(map["Name"], Expression::Join { .. }));
        assert_eq!(
            map["Endpoint"],
            Expression::get_att("Database", "Endpoint.Address")
        );
        assert_eq!(map["Short"], Expression::get_att("Child", "Outputs.Url"));
    }

    #[test]
    fn test_multi_key_object_is_a_map() {
        let expr = Expression::from(json!({"Ref": "A", "Other": 1}));
        assert!(matches!(expr, Expression::Map(_)));
    }

    #[test]
    fn test_unknown_function_kept_opaque() {
        let expr = Expression::from(json!({"Fn::Base64": "hello"}));
        assert!(matches!(expr, Expression::Function { ref name, .. } if name == "Fn::Base64"));
        assert_eq!(expr.to_value(), json!({"Fn::Base64": "hello"}));
    }

    #[test]
    fn test_literal_detection() {
        assert!(Expression::from(json!({"a": [1, "b", true]})).is_literal());
        assert!(!Expression::from(json!({"a": [{"Ref": "X"}]})).is_literal());
        assert!(!Expression::RuntimeModified.is_literal());
    }

    #[test]
    fn test_runtime_modified_never_equals_literal() {
        assert_ne!(Expression::RuntimeModified, Expression::string(RUNTIME_MODIFIED));
        assert_ne!(Expression::RuntimeModified, Expression::Null);
    }

    #[test]
    fn test_get_path() {
        let expr = Expression::from(json!({"Properties": {"ImageId": "ami-1"}}));
        assert_eq!(
            expr.get_path(&["Properties", "ImageId"]),
            Some(&Expression::string("ami-1"))
        );
        assert_eq!(expr.get_path(&["Properties", "Missing"]), None);
    }
}
