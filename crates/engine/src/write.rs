use std::collections::HashSet;

use normcache_core::{
    key::evaluate_key,
    operations::{MutationOperation, OperationAction, ValueKind},
    ConnectionRef, FieldKind, FieldValue, ObjectField, RecordId, Selection, SelectionField,
    SubscriptionId, Variables,
};
use normcache_storage::Subscriber;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::Cache;

/// Subscriptions touched by one public operation.
pub(crate) struct WriteContext<'a> {
    pub variables: &'a Variables,
    affected: Vec<SubscriptionId>,
    affected_seen: HashSet<SubscriptionId>,
    /// Subscriptions whose view crosses a link that changed and must be
    /// re-registered against the new graph.
    relinked: Vec<SubscriptionId>,
    relinked_seen: HashSet<SubscriptionId>,
}

impl<'a> WriteContext<'a> {
    pub fn new(variables: &'a Variables) -> Self {
        Self {
            variables,
            affected: Vec::new(),
            affected_seen: HashSet::new(),
            relinked: Vec::new(),
            relinked_seen: HashSet::new(),
        }
    }

    pub fn mark_affected(&mut self, subscribers: &[Subscriber]) {
        for subscriber in subscribers {
            self.mark_affected_id(subscriber.id);
        }
    }

    pub fn mark_affected_id(&mut self, id: SubscriptionId) {
        if self.affected_seen.insert(id) {
            self.affected.push(id);
        }
    }

    pub fn mark_relinked(&mut self, subscribers: &[Subscriber]) {
        for subscriber in subscribers {
            self.mark_relinked_id(subscriber.id);
        }
    }

    pub fn mark_relinked_id(&mut self, id: SubscriptionId) {
        self.mark_affected_id(id);
        if self.relinked_seen.insert(id) {
            self.relinked.push(id);
        }
    }

    pub fn into_parts(self) -> (Vec<SubscriptionId>, Vec<SubscriptionId>) {
        (self.relinked, self.affected)
    }
}

/// The concrete type of an object value: `__typename` for abstract fields.
pub(crate) fn concrete_type<'v>(
    field: &'v SelectionField,
    object: &ObjectField,
    data: &'v Map<String, Value>,
) -> &'v str {
    if object.is_abstract
        && let Some(type_name) = data.get("__typename").and_then(Value::as_str)
    {
        return type_name;
    }
    &field.type_name
}

impl Cache {
    /// Mutating half of a write. The payload has already been validated, so
    /// nothing here fails on shape.
    pub(crate) fn write_selection(
        &mut self,
        record_id: &RecordId,
        selection: &Selection,
        data: &Map<String, Value>,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        self.store.ensure(record_id);

        for (name, value) in data {
            let field = selection.get(name).ok_or_else(|| EngineError::UnknownField {
                path: record_id.to_string(),
                field: name.clone(),
            })?;
            let key = evaluate_key(&field.key_raw, ctx.variables);

            match (&field.kind, value) {
                (FieldKind::Object(object), Value::Object(child)) => {
                    self.write_link(record_id, &key, field, object, value, child, ctx)?;
                }
                (FieldKind::Object(object), Value::Array(items)) => {
                    self.write_list(record_id, &key, field, object, items, ctx)?;
                }
                (FieldKind::Object(_), Value::Null) => self.write_null_link(record_id, &key, ctx),
                (FieldKind::Object(_), other) => {
                    return Err(EngineError::ShapeMismatch {
                        path: format!("{record_id}.{key}"),
                        expected: "object, list or null",
                        found: other.to_string(),
                    });
                }
                (FieldKind::Scalar, value) => self.write_scalar(record_id, &key, value, ctx),
            }

            if !field.operations.is_empty() {
                self.apply_operations(field, value, ctx)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn linked_id(
        &self,
        parent: &RecordId,
        key: &str,
        index: Option<usize>,
        field: &SelectionField,
        object: &ObjectField,
        value: &Value,
        data: &Map<String, Value>,
    ) -> Result<RecordId, EngineError> {
        let type_name = concrete_type(field, object, data);
        if self.config.is_identifiable(type_name, data) {
            return Ok(self.config.compute_id(type_name, value)?);
        }
        Ok(match index {
            Some(i) => RecordId::embedded_item(parent, key, i),
            None => RecordId::embedded(parent, key),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_link(
        &mut self,
        record_id: &RecordId,
        key: &str,
        field: &SelectionField,
        object: &ObjectField,
        value: &Value,
        child: &Map<String, Value>,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        let linked = self.linked_id(record_id, key, None, field, object, value, child)?;

        let record = self.store.ensure(record_id);
        if record.linked_record_id(key) != Some(&linked) {
            let subscribers = record.subscribers(key).to_vec();
            record.write_record_link(key, linked.clone());
            ctx.mark_relinked(&subscribers);
            trace!(record = %record_id, key, target = %linked, "cache.write.link");
        }

        self.write_selection(&linked, &object.selection, child, ctx)
    }

    fn write_list(
        &mut self,
        record_id: &RecordId,
        key: &str,
        field: &SelectionField,
        object: &ObjectField,
        items: &[Value],
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        let mut ids = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            // null entries of a nullable list are not stored
            let Value::Object(entry) = item else {
                continue;
            };
            let linked = self.linked_id(record_id, key, Some(index), field, object, item, entry)?;
            self.write_selection(&linked, &object.selection, entry, ctx)?;
            ids.push(linked);
        }

        let record = self.store.ensure(record_id);
        if !record.has_list_link(key) || record.linked_list_ids(key) != ids.as_slice() {
            let subscribers = record.subscribers(key).to_vec();
            trace!(record = %record_id, key, len = ids.len(), "cache.write.list");
            record.write_list_link(key, ids);
            ctx.mark_relinked(&subscribers);
        }
        Ok(())
    }

    fn write_null_link(&mut self, record_id: &RecordId, key: &str, ctx: &mut WriteContext<'_>) {
        let record = self.store.ensure(record_id);
        let had_link = record.linked_record_id(key).is_some() || record.has_list_link(key);
        let was_null = record.field(key).is_some_and(FieldValue::is_null);
        if !had_link && was_null {
            return;
        }

        let subscribers = record.subscribers(key).to_vec();
        record.clear_link(key);
        record.write_field(key, FieldValue::Null);
        if had_link {
            ctx.mark_relinked(&subscribers);
        } else {
            ctx.mark_affected(&subscribers);
        }
    }

    fn write_scalar(
        &mut self,
        record_id: &RecordId,
        key: &str,
        value: &Value,
        ctx: &mut WriteContext<'_>,
    ) {
        let value = FieldValue::from_json(value);
        let record = self.store.ensure(record_id);
        if record.field(key) == Some(&value) {
            return;
        }
        let subscribers = record.subscribers(key).to_vec();
        record.write_field(key, value);
        ctx.mark_affected(&subscribers);
    }

    // ========================================================================
    // List mutations compiled into the selection
    // ========================================================================

    pub(crate) fn operation_parent(
        &self,
        operation: &MutationOperation,
        variables: &Variables,
        path: &str,
    ) -> Result<RecordId, EngineError> {
        let Some(parent) = &operation.parent_id else {
            return Ok(self.config.root_id());
        };
        let value = match parent.kind {
            ValueKind::Variable => {
                let name = parent.value.as_str().unwrap_or_default();
                variables.get(name).ok_or_else(|| EngineError::InvalidParentId {
                    path: path.to_string(),
                    reason: format!("variable ${name} is not set"),
                })?
            }
            _ => &parent.value,
        };
        match value {
            Value::String(id) => Ok(RecordId::new(id.clone())),
            other => Err(EngineError::InvalidParentId {
                path: path.to_string(),
                reason: format!("expected a string id, found {other}"),
            }),
        }
    }

    fn apply_operations(
        &mut self,
        field: &SelectionField,
        value: &Value,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        for operation in &field.operations {
            match operation.action {
                OperationAction::Insert | OperationAction::Remove => {
                    let (Some(name), FieldKind::Object(object)) = (&operation.connection, &field.kind)
                    else {
                        continue;
                    };
                    let items: Vec<&Value> = match value {
                        Value::Array(items) => items.iter().filter(|i| i.is_object()).collect(),
                        Value::Object(_) => vec![value],
                        _ => Vec::new(),
                    };
                    // a null or empty result has nothing to place
                    if items.is_empty() {
                        continue;
                    }
                    let parent = self.operation_parent(operation, ctx.variables, &field.key_raw)?;
                    let reference = ConnectionRef::new(name.clone(), parent);
                    for item in items {
                        if operation.action == OperationAction::Insert {
                            self.connection_insert(
                                &reference,
                                operation.when.as_ref(),
                                &object.selection,
                                item,
                                operation.position,
                                ctx,
                            )?;
                        } else {
                            let id = self.connection_item_id(&reference, item)?;
                            self.connection_remove(&reference, operation.when.as_ref(), &id, ctx)?;
                        }
                    }
                }
                OperationAction::Delete => {
                    let Some(type_name) = &operation.type_name else {
                        continue;
                    };
                    let targets: Vec<&Value> = match value {
                        Value::Array(items) => items.iter().collect(),
                        Value::Null => Vec::new(),
                        other => vec![other],
                    };
                    for target in targets.into_iter().filter(|t| !t.is_null()) {
                        let id = self.config.compute_id(type_name, target)?;
                        self.delete_record(&id, ctx)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evict a record: drop it from every connection listing it, then rebuild
    /// the views that still reached it.
    pub(crate) fn delete_record(
        &mut self,
        id: &RecordId,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        let Some(record) = self.store.get(id) else {
            trace!(record = %id, "cache.delete.absent");
            return Ok(());
        };
        let mut references = record.connections().to_vec();
        // items written by a plain list write carry no back-reference
        for scope in self.connections.values() {
            let listed = self
                .store
                .get(&scope.record)
                .is_some_and(|holder| holder.linked_list_ids(&scope.key).contains(id));
            if listed && !references.contains(&scope.reference) {
                references.push(scope.reference.clone());
            }
        }

        for reference in &references {
            if self.connections.contains_key(reference) {
                self.connection_remove(reference, None, id, ctx)?;
            }
        }

        if let Some(record) = self.store.remove(id) {
            for subscription in record.subscription_ids() {
                ctx.mark_relinked_id(subscription);
            }
        }
        debug!(record = %id, connections = references.len(), "cache.delete");
        Ok(())
    }
}
