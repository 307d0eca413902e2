//! Compiled selection descriptors.
//!
//! Descriptors arrive as untyped JSON produced by the document compiler. They
//! are checked once on load and turned into [`Selection`] trees where every
//! field is either a scalar or an object with a nested selection.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::CoreError;
use crate::operations::{MutationOperation, OperationAction, ValueRef};

/// The fields selected on one object, keyed by response name (alias).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, RawField>")]
pub struct Selection {
    fields: BTreeMap<String, SelectionField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionField {
    pub type_name: String,
    pub key_raw: String,
    pub kind: FieldKind,
    pub operations: Vec<MutationOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar,
    Object(ObjectField),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub selection: Arc<Selection>,
    /// The field's type is an interface or union; concrete types come from `__typename`.
    pub is_abstract: bool,
    pub connection: Option<ConnectionSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSpec {
    pub name: String,
    pub filters: BTreeMap<String, ValueRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    #[serde(rename = "type")]
    type_name: String,
    key_raw: String,
    #[serde(default)]
    fields: Option<BTreeMap<String, RawField>>,
    #[serde(default)]
    connection: Option<String>,
    #[serde(default)]
    filters: Option<BTreeMap<String, ValueRef>>,
    #[serde(default)]
    operations: Vec<MutationOperation>,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
}

impl TryFrom<BTreeMap<String, RawField>> for Selection {
    type Error = CoreError;

    fn try_from(raw: BTreeMap<String, RawField>) -> Result<Self, Self::Error> {
        Selection::from_raw(raw, "")
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        Selection::deserialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn with(mut self, name: &str, field: SelectionField) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SelectionField> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SelectionField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn from_raw(raw: BTreeMap<String, RawField>, path: &str) -> Result<Self, CoreError> {
        let mut fields = BTreeMap::new();
        for (name, field) in raw {
            let field_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}.{name}")
            };
            fields.insert(name, SelectionField::from_raw(field, &field_path)?);
        }
        Ok(Self { fields })
    }
}

impl SelectionField {
    pub fn scalar(type_name: &str, key_raw: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            key_raw: key_raw.to_string(),
            kind: FieldKind::Scalar,
            operations: Vec::new(),
        }
    }

    pub fn object(type_name: &str, key_raw: &str, selection: Selection) -> Self {
        Self {
            type_name: type_name.to_string(),
            key_raw: key_raw.to_string(),
            kind: FieldKind::Object(ObjectField {
                selection: Arc::new(selection),
                is_abstract: false,
                connection: None,
            }),
            operations: Vec::new(),
        }
    }

    /// Mark an object field as tracked under a connection name. No-op on scalars.
    pub fn connection(mut self, name: &str, filters: BTreeMap<String, ValueRef>) -> Self {
        if let FieldKind::Object(object) = &mut self.kind {
            object.connection = Some(ConnectionSpec {
                name: name.to_string(),
                filters,
            });
        }
        self
    }

    pub fn abstract_type(mut self) -> Self {
        if let FieldKind::Object(object) = &mut self.kind {
            object.is_abstract = true;
        }
        self
    }

    pub fn operation(mut self, operation: MutationOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn as_object(&self) -> Option<&ObjectField> {
        match &self.kind {
            FieldKind::Object(object) => Some(object),
            FieldKind::Scalar => None,
        }
    }

    fn from_raw(raw: RawField, path: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidSelection {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if raw.key_raw.is_empty() {
            return Err(invalid("keyRaw must not be empty"));
        }

        let kind = match raw.fields {
            Some(fields) => {
                let connection = match raw.connection {
                    Some(name) => Some(ConnectionSpec {
                        name,
                        filters: raw.filters.unwrap_or_default(),
                    }),
                    None => None,
                };
                FieldKind::Object(ObjectField {
                    selection: Arc::new(Selection::from_raw(fields, path)?),
                    is_abstract: raw.is_abstract,
                    connection,
                })
            }
            None => {
                if raw.connection.is_some() {
                    return Err(invalid("connection on a field without a selection"));
                }
                if raw.is_abstract {
                    return Err(invalid("abstract field without a selection"));
                }
                FieldKind::Scalar
            }
        };

        for operation in &raw.operations {
            operation.validate().map_err(|e| invalid(&e.to_string()))?;
            match (operation.action, &kind) {
                (OperationAction::Insert | OperationAction::Remove, FieldKind::Scalar) => {
                    return Err(invalid("list operations need an object selection"));
                }
                (OperationAction::Delete, FieldKind::Object(_)) => {
                    return Err(invalid("delete operations apply to id fields"));
                }
                _ => {}
            }
        }

        Ok(Self {
            type_name: raw.type_name,
            key_raw: raw.key_raw,
            kind,
            operations: raw.operations,
        })
    }
}
