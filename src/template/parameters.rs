//! Parameter sets used to dereference templates.
//!
//! A [`ParameterSet`] is built fresh for each planning pass by layering the
//! live stack's parameters, proposed overrides, pseudo-parameters and global
//! overrides, later layers winning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::expression::Expression;

/// `AWS::Region` pseudo-parameter.
pub const PSEUDO_REGION: &str = "AWS::Region";
/// `AWS::AccountId` pseudo-parameter.
pub const PSEUDO_ACCOUNT_ID: &str = "AWS::AccountId";
/// `AWS::StackId` pseudo-parameter.
pub const PSEUDO_STACK_ID: &str = "AWS::StackId";
/// `AWS::StackName` pseudo-parameter.
pub const PSEUDO_STACK_NAME: &str = "AWS::StackName";
/// `AWS::NotificationARNs` pseudo-parameter.
pub const PSEUDO_NOTIFICATION_ARNS: &str = "AWS::NotificationARNs";

/// Named parameter values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, Expression>,
}

/// Pseudo-parameter sources for one stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PseudoParameters {
    /// Region the stack lives in.
    pub region: String,
    /// Owning account identifier.
    pub account_id: String,
    /// Stack identifier.
    pub stack_id: String,
    /// Stack name.
    pub stack_name: String,
    /// Notification topics.
    pub notification_topics: Vec<String>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a parameter set from plain string values.
    #[must_use]
    pub fn from_strings<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), Expression::String(v.into())))
                .collect(),
        }
    }

    /// Sets a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Expression>) {
        self.values.insert(name.into(), value.into());
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.values.get(name)
    }

    /// Returns true if the name is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Expression)> {
        self.values.iter()
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a copy with `other` layered on top.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (name, value) in &other.values {
            merged.values.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Returns a copy with pseudo-parameters and then global overrides layered on top.
    #[must_use]
    pub fn with_pseudo(&self, pseudo: &PseudoParameters, global: &BTreeMap<String, String>) -> Self {
        let mut merged = self.merged(&pseudo.to_parameters());
        for (name, value) in global {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

impl PseudoParameters {
    /// Converts the pseudo-parameters to a parameter set.
    #[must_use]
    pub fn to_parameters(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        set.insert(PSEUDO_REGION, self.region.clone());
        set.insert(PSEUDO_ACCOUNT_ID, self.account_id.clone());
        set.insert(PSEUDO_STACK_ID, self.stack_id.clone());
        set.insert(PSEUDO_STACK_NAME, self.stack_name.clone());
        set.insert(
            PSEUDO_NOTIFICATION_ARNS,
            Expression::List(
                self.notification_topics
                    .iter()
                    .map(|t| Expression::String(t.clone()))
                    .collect(),
            ),
        );
        set
    }

    /// Extracts the account id from an ARN-style stack id.
    ///
    /// `arn:aws:cloudformation:REGION:ACCOUNT:stack/NAME/UUID`
    #[must_use]
    pub fn account_from_stack_id(stack_id: &str) -> Option<String> {
        stack_id
            .split(':')
            .nth(4)
            .filter(|account| !account.is_empty())
            .map(String::from)
    }
}

impl FromIterator<(String, Expression)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (String, Expression)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo() -> PseudoParameters {
        PseudoParameters {
            region: String::from("us-east-1"),
            account_id: String::from("123456789012"),
            stack_id: String::from("arn:aws:cloudformation:us-east-1:123456789012:stack/web/abc"),
            stack_name: String::from("web"),
            notification_topics: vec![String::from("arn:aws:sns:us-east-1:123456789012:ops")],
        }
    }

    #[test]
    fn test_global_overrides_win() {
        let live = ParameterSet::from_strings([("Env", "prod"), ("AWS::Region", "stale")]);
        let mut global = BTreeMap::new();
        global.insert(String::from("Env"), String::from("global"));

        let merged = live.with_pseudo(&pseudo(), &global);
        assert_eq!(merged.get("AWS::Region"), Some(&Expression::string("us-east-1")));
        assert_eq!(merged.get("Env"), Some(&Expression::string("global")));
        assert!(matches!(merged.get(PSEUDO_NOTIFICATION_ARNS), Some(Expression::List(l)) if l.len() == 1));
    }

    #[test]
    fn test_account_from_stack_id() {
        assert_eq!(
            PseudoParameters::account_from_stack_id(&pseudo().stack_id),
            Some(String::from("123456789012"))
        );
        assert_eq!(PseudoParameters::account_from_stack_id("local-stack"), None);
    }
}
