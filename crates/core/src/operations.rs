use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::field_value::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Insert,
    Remove,
    Delete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Int,
    Float,
    Boolean,
    Variable,
}

/// A literal value or a reference to a runtime variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRef {
    pub kind: ValueKind,
    pub value: Value,
}

impl ValueRef {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self {
            kind: ValueKind::String,
            value: value.into(),
        }
    }

    pub fn variable(name: &str) -> Self {
        Self {
            kind: ValueKind::Variable,
            value: Value::String(name.to_string()),
        }
    }

    /// Resolve against `variables`. Literals of a numeric or boolean kind that
    /// were compiled as strings are parsed into their typed form.
    pub fn resolve(&self, variables: &serde_json::Map<String, Value>) -> Option<FieldValue> {
        match self.kind {
            ValueKind::Variable => {
                let name = self.value.as_str()?;
                variables.get(name).map(FieldValue::from_json)
            }
            ValueKind::Int => match &self.value {
                Value::String(s) => s.trim().parse::<i64>().ok().map(FieldValue::Integer),
                other => Some(FieldValue::from_json(other)),
            },
            ValueKind::Float => match &self.value {
                Value::String(s) => s.trim().parse::<f64>().ok().map(FieldValue::Float),
                other => Some(FieldValue::from_json(other)),
            },
            ValueKind::Boolean => match &self.value {
                Value::String(s) => s.trim().parse::<bool>().ok().map(FieldValue::Boolean),
                other => Some(FieldValue::from_json(other)),
            },
            ValueKind::String => Some(FieldValue::from_json(&self.value)),
        }
    }
}

/// Conditions a connection's recorded filters must satisfy for a mutation to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhenClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_not: Option<BTreeMap<String, Value>>,
}

impl WhenClause {
    pub fn must(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Self {
            must: Some(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
            must_not: None,
        }
    }

    pub fn must_not(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Self {
            must: None,
            must_not: Some(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
        }
    }

    /// `must` keys have to match a recorded filter; `must_not` keys have to
    /// differ from it or be absent. Both clauses apply when present.
    pub fn matches(&self, filters: &BTreeMap<String, FieldValue>) -> bool {
        let must_ok = self.must.as_ref().is_none_or(|must| {
            must.iter().all(|(key, expected)| {
                filters
                    .get(key)
                    .is_some_and(|actual| actual.loosely_equals(&FieldValue::from_json(expected)))
            })
        });
        let must_not_ok = self.must_not.as_ref().is_none_or(|must_not| {
            must_not.iter().all(|(key, rejected)| {
                filters
                    .get(key)
                    .is_none_or(|actual| !actual.loosely_equals(&FieldValue::from_json(rejected)))
            })
        });
        must_ok && must_not_ok
    }
}

/// A compiled list mutation attached to a selection field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOperation {
    pub action: OperationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default, rename = "parentID", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ValueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenClause>,
}

impl MutationOperation {
    pub fn insert(connection: &str, position: Position) -> Self {
        Self {
            action: OperationAction::Insert,
            connection: Some(connection.to_string()),
            type_name: None,
            position,
            parent_id: None,
            when: None,
        }
    }

    pub fn remove(connection: &str) -> Self {
        Self {
            action: OperationAction::Remove,
            connection: Some(connection.to_string()),
            type_name: None,
            position: Position::Last,
            parent_id: None,
            when: None,
        }
    }

    pub fn delete(type_name: &str) -> Self {
        Self {
            action: OperationAction::Delete,
            connection: None,
            type_name: Some(type_name.to_string()),
            position: Position::Last,
            parent_id: None,
            when: None,
        }
    }

    pub fn with_parent(mut self, parent_id: ValueRef) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_when(mut self, when: WhenClause) -> Self {
        self.when = Some(when);
        self
    }

    /// Structural checks performed when the owning selection is loaded.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self.action {
            OperationAction::Insert | OperationAction::Remove if self.connection.is_none() => {
                Err(CoreError::InvalidOperation(format!(
                    "{:?} operation requires a connection name",
                    self.action
                )))
            }
            OperationAction::Delete if self.type_name.is_none() => Err(
                CoreError::InvalidOperation("delete operation requires a type".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
