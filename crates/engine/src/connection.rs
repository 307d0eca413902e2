//! Named list views used by list mutations.
//!
//! A scope is recorded the first time a subscription walks a field marked as a
//! connection. It remembers which record and key hold the list and the filter
//! arguments the list was fetched with, so a mutation can target "the open
//! tickets list" without the cache knowing what `status: OPEN` means.

use std::collections::BTreeMap;
use std::sync::Arc;

use normcache_core::{
    operations::{Position, WhenClause},
    ConnectionRef, FieldValue, RecordId, Selection, SubscriptionId, Variables,
};
use normcache_storage::Record;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::write::WriteContext;
use crate::Cache;

#[derive(Debug, Clone)]
pub struct ConnectionScope {
    pub reference: ConnectionRef,
    /// Subscription whose walk registered the scope.
    pub owner: SubscriptionId,
    /// Record holding the list link.
    pub record: RecordId,
    /// Resolved key of the list link.
    pub key: String,
    pub connection_type: String,
    pub selection: Arc<Selection>,
    pub filters: BTreeMap<String, FieldValue>,
}

/// A transient view over one connection scope, optionally gated by a `when`
/// clause checked against the scope's filters.
pub struct ConnectionHandler<'a> {
    cache: &'a mut Cache,
    reference: ConnectionRef,
    when: Option<WhenClause>,
}

impl<'a> ConnectionHandler<'a> {
    pub(crate) fn new(cache: &'a mut Cache, reference: ConnectionRef) -> Self {
        Self {
            cache,
            reference,
            when: None,
        }
    }

    /// Consume the handler and return it with `condition` attached. Every
    /// insert and remove made through the returned handler is gated by it.
    pub fn when(mut self, condition: WhenClause) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn parent_id(&self) -> &RecordId {
        &self.reference.parent_id
    }

    pub fn scope(&self) -> Result<&ConnectionScope, EngineError> {
        self.cache.connection_scope(&self.reference)
    }

    pub fn filters(&self) -> Result<&BTreeMap<String, FieldValue>, EngineError> {
        Ok(&self.scope()?.filters)
    }

    pub fn validate_when(&self) -> bool {
        match (&self.when, self.scope()) {
            (Some(when), Ok(scope)) => when.matches(&scope.filters),
            (None, _) => true,
            (Some(_), Err(_)) => false,
        }
    }

    pub fn append(
        &mut self,
        selection: &Selection,
        data: &Value,
        variables: &Variables,
    ) -> Result<(), EngineError> {
        self.insert(selection, data, variables, Position::Last)
    }

    pub fn prepend(
        &mut self,
        selection: &Selection,
        data: &Value,
        variables: &Variables,
    ) -> Result<(), EngineError> {
        self.insert(selection, data, variables, Position::First)
    }

    pub fn insert(
        &mut self,
        selection: &Selection,
        data: &Value,
        variables: &Variables,
        position: Position,
    ) -> Result<(), EngineError> {
        self.cache.validate_connection_item(&self.reference, selection, data, variables)?;
        let mut ctx = WriteContext::new(variables);
        self.cache.connection_insert(
            &self.reference,
            self.when.as_ref(),
            selection,
            data,
            position,
            &mut ctx,
        )?;
        self.cache.flush(ctx);
        Ok(())
    }

    /// Remove the record `data` identifies from the list.
    pub fn remove(&mut self, data: &Value) -> Result<(), EngineError> {
        let id = self.cache.connection_item_id(&self.reference, data)?;
        self.remove_id(&id)
    }

    pub fn remove_id(&mut self, id: &RecordId) -> Result<(), EngineError> {
        let variables = Variables::new();
        let mut ctx = WriteContext::new(&variables);
        self.cache
            .connection_remove(&self.reference, self.when.as_ref(), id, &mut ctx)?;
        self.cache.flush(ctx);
        Ok(())
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records().iter().map(|r| r.id().clone()).collect()
    }

    /// The live records in list order.
    pub fn records(&self) -> Vec<&Record> {
        match self.scope() {
            Ok(scope) => self.cache.store().linked_list(&scope.record, &scope.key),
            Err(_) => Vec::new(),
        }
    }
}

impl<'h> IntoIterator for &'h ConnectionHandler<'_> {
    type Item = &'h Record;
    type IntoIter = std::vec::IntoIter<&'h Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records().into_iter()
    }
}

impl Cache {
    pub(crate) fn connection_scope(
        &self,
        reference: &ConnectionRef,
    ) -> Result<&ConnectionScope, EngineError> {
        self.connections
            .get(reference)
            .ok_or_else(|| EngineError::UnknownConnection {
                name: reference.name.clone(),
                parent_id: reference.parent_id.to_string(),
            })
    }

    /// Identity of a list item, using `__typename` when the payload carries it.
    pub(crate) fn connection_item_id(
        &self,
        reference: &ConnectionRef,
        data: &Value,
    ) -> Result<RecordId, EngineError> {
        let scope = self.connection_scope(reference)?;
        let type_name = data
            .get("__typename")
            .and_then(Value::as_str)
            .unwrap_or(&scope.connection_type);
        Ok(self.config.compute_id(type_name, data)?)
    }

    fn when_passes(&self, scope: &ConnectionScope, when: Option<&WhenClause>) -> bool {
        let passes = when.is_none_or(|w| w.matches(&scope.filters));
        if !passes {
            debug!(
                connection = %scope.reference.name,
                parent = %scope.reference.parent_id,
                "connection.when_rejected"
            );
        }
        passes
    }

    pub(crate) fn connection_insert(
        &mut self,
        reference: &ConnectionRef,
        when: Option<&WhenClause>,
        selection: &Selection,
        data: &Value,
        position: Position,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        let scope = self.connection_scope(reference)?;
        if !self.when_passes(scope, when) {
            return Ok(());
        }
        let (list_record, list_key) = (scope.record.clone(), scope.key.clone());
        let id = self.connection_item_id(reference, data)?;

        if let Value::Object(fields) = data {
            self.write_selection(&id, selection, fields, ctx)?;
        }

        let record = self.store.ensure(&list_record);
        if record.linked_list_ids(&list_key).contains(&id) {
            trace!(connection = %reference.name, record = %id, "connection.already_listed");
        } else {
            match position {
                Position::First => record.prepend_linked_list(&list_key, id.clone()),
                Position::Last => record.append_linked_list(&list_key, id.clone()),
            }
            let subscribers = record.subscribers(&list_key).to_vec();
            ctx.mark_relinked(&subscribers);
            debug!(connection = %reference.name, record = %id, ?position, "connection.insert");
        }

        self.store.ensure(&id).add_connection_reference(reference.clone());
        Ok(())
    }

    pub(crate) fn connection_remove(
        &mut self,
        reference: &ConnectionRef,
        when: Option<&WhenClause>,
        id: &RecordId,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), EngineError> {
        let scope = self.connection_scope(reference)?;
        if !self.when_passes(scope, when) {
            return Ok(());
        }
        let (list_record, list_key) = (scope.record.clone(), scope.key.clone());

        let Some(record) = self.store.get_mut(&list_record) else {
            return Ok(());
        };
        if !record.remove_from_linked_list(&list_key, id) {
            trace!(connection = %reference.name, record = %id, "connection.remove_absent");
            return Ok(());
        }
        let subscribers = record.subscribers(&list_key).to_vec();
        ctx.mark_relinked(&subscribers);

        if let Some(target) = self.store.get_mut(id) {
            target.remove_connection_reference(reference);
        }
        debug!(connection = %reference.name, record = %id, "connection.remove");
        Ok(())
    }

    pub(crate) fn register_connection(&mut self, scope: ConnectionScope) {
        trace!(
            connection = %scope.reference.name,
            parent = %scope.reference.parent_id,
            key = %scope.key,
            "connection.registered"
        );
        self.connections.insert(scope.reference.clone(), scope);
    }
}
