//! Shape checks run before a write touches the graph, so a bad payload never
//! leaves records half updated.

use normcache_core::{
    operations::OperationAction, ConnectionRef, FieldKind, Selection, SelectionField, Variables,
};
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::Cache;

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "list".into(),
        Value::Object(_) => "object".into(),
    }
}

impl Cache {
    pub(crate) fn validate_payload(
        &self,
        selection: &Selection,
        data: &Map<String, Value>,
        variables: &Variables,
        path: &str,
    ) -> Result<(), EngineError> {
        for (name, value) in data {
            let field_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}.{name}")
            };
            let field = selection.get(name).ok_or_else(|| EngineError::UnknownField {
                path: if path.is_empty() { "<root>".into() } else { path.to_string() },
                field: name.clone(),
            })?;

            if let FieldKind::Object(object) = &field.kind {
                match value {
                    Value::Null => {}
                    Value::Object(child) => {
                        self.validate_payload(&object.selection, child, variables, &field_path)?;
                    }
                    Value::Array(items) => {
                        for (index, item) in items.iter().enumerate() {
                            let item_path = format!("{field_path}[{index}]");
                            match item {
                                Value::Null => {}
                                Value::Object(child) => {
                                    self.validate_payload(&object.selection, child, variables, &item_path)?;
                                }
                                other => {
                                    return Err(EngineError::ShapeMismatch {
                                        path: item_path,
                                        expected: "object",
                                        found: describe(other),
                                    });
                                }
                            }
                        }
                    }
                    other => {
                        return Err(EngineError::ShapeMismatch {
                            path: field_path,
                            expected: "object, list or null",
                            found: describe(other),
                        });
                    }
                }
            }

            self.validate_operations(field, value, variables, &field_path)?;
        }
        Ok(())
    }

    fn validate_operations(
        &self,
        field: &SelectionField,
        value: &Value,
        variables: &Variables,
        path: &str,
    ) -> Result<(), EngineError> {
        for operation in &field.operations {
            match operation.action {
                OperationAction::Insert | OperationAction::Remove => {
                    let Some(name) = &operation.connection else {
                        continue;
                    };
                    let items: Vec<&Value> = match value {
                        Value::Array(items) => items.iter().filter(|i| i.is_object()).collect(),
                        Value::Object(_) => vec![value],
                        _ => Vec::new(),
                    };
                    if items.is_empty() {
                        continue;
                    }
                    let parent = self.operation_parent(operation, variables, path)?;
                    let reference = ConnectionRef::new(name.clone(), parent);
                    for item in items {
                        self.connection_item_id(&reference, item)?;
                    }
                }
                OperationAction::Delete => {
                    let Some(type_name) = &operation.type_name else {
                        continue;
                    };
                    let targets: Vec<&Value> = match value {
                        Value::Array(items) => items.iter().collect(),
                        other => vec![other],
                    };
                    for target in targets.into_iter().filter(|t| !t.is_null()) {
                        if !(target.is_string() || target.is_number()) {
                            return Err(EngineError::InvalidDeleteTarget {
                                path: path.to_string(),
                                value: describe(target),
                            });
                        }
                        self.config.compute_id(type_name, target)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks for a direct connection insert: the item must be an identifiable
    /// object matching `selection`, and the connection must be registered.
    pub(crate) fn validate_connection_item(
        &self,
        reference: &ConnectionRef,
        selection: &Selection,
        data: &Value,
        variables: &Variables,
    ) -> Result<(), EngineError> {
        let Value::Object(fields) = data else {
            return Err(EngineError::ShapeMismatch {
                path: reference.name.clone(),
                expected: "object",
                found: describe(data),
            });
        };
        self.connection_item_id(reference, data)?;
        self.validate_payload(selection, fields, variables, &reference.name)
    }
}
