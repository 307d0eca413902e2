pub mod connection;
pub mod error;
mod read;
pub mod subscription;
mod validate;
mod write;

pub use connection::{ConnectionHandler, ConnectionScope};
pub use error::EngineError;
pub use subscription::{SetCallback, SubscriptionSpec};

use std::collections::{HashMap, HashSet};

use normcache_core::{
    CacheConfig, ConnectionRef, RecordId, Selection, SubscriptionId, Variables,
};
use normcache_storage::{Record, RecordStore, Subscriber};
use serde_json::Value;
use tracing::{debug, trace};

use crate::subscription::{add_subscribers, remove_subscribers, AttachWalk, Subscription};
use crate::write::WriteContext;

/// Normalized entity cache with live views.
///
/// All methods run to completion on the calling thread. Wrap the cache in a
/// single mutex if several threads need it.
pub struct Cache {
    config: CacheConfig,
    store: RecordStore,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    connections: HashMap<ConnectionRef, ConnectionScope>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        let mut store = RecordStore::new();
        store.ensure(&config.root_id());
        Self {
            config,
            store,
            subscriptions: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    /// Build a cache from a config that has not been validated yet.
    pub fn with_config(config: CacheConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn root_id(&self) -> RecordId {
        self.config.root_id()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn record(&self, id: &RecordId) -> Option<&Record> {
        self.store.get(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Live subscribers on `key` of `record`; empty when the record is unknown.
    pub fn subscribers(&self, record: &RecordId, key: &str) -> &[Subscriber] {
        self.store
            .get(record)
            .map(|r| r.subscribers(key))
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, record: &RecordId, key: &str, id: SubscriptionId) -> usize {
        self.store
            .get(record)
            .map_or(0, |r| r.subscriber_count(key, id))
    }

    /// Identity of an entity of `type_name`, from an object carrying its key
    /// fields or from a bare id.
    pub fn id(&self, type_name: &str, data: &Value) -> Result<RecordId, EngineError> {
        Ok(self.config.compute_id(type_name, data)?)
    }

    // ========================================================================
    // Write / read
    // ========================================================================

    /// Merge `payload` into the graph under `root` (the cache root by
    /// default) and notify every view whose projection changed.
    pub fn write(
        &mut self,
        selection: &Selection,
        payload: &Value,
        variables: &Variables,
        root: Option<&RecordId>,
    ) -> Result<(), EngineError> {
        let root = root.cloned().unwrap_or_else(|| self.root_id());
        let Value::Object(data) = payload else {
            return Err(EngineError::ShapeMismatch {
                path: root.to_string(),
                expected: "object",
                found: payload.to_string(),
            });
        };

        self.validate_payload(selection, data, variables, "")?;

        let mut ctx = WriteContext::new(variables);
        self.write_selection(&root, selection, data, &mut ctx)?;
        debug!(root = %root, fields = data.len(), "cache.write");
        self.flush(ctx);
        Ok(())
    }

    /// The current projection of `selection` from `parent` (the cache root by default).
    pub fn read(
        &self,
        selection: &Selection,
        variables: &Variables,
        parent: Option<&RecordId>,
    ) -> Value {
        let root = parent.cloned().unwrap_or_else(|| self.root_id());
        read::project(&self.store, &root, selection, variables)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn subscribe(
        &mut self,
        spec: SubscriptionSpec,
        variables: Variables,
    ) -> Result<SubscriptionId, EngineError> {
        let root = spec.parent_id.clone().unwrap_or_else(|| self.root_id());
        self.store.require(&root)?;

        let id = SubscriptionId::new();
        debug!(
            subscription = %id,
            root_type = %spec.root_type,
            root = %root,
            "cache.subscribe"
        );
        self.subscriptions.insert(
            id,
            Subscription {
                spec,
                variables,
                touched: HashSet::new(),
                scopes: Vec::new(),
            },
        );
        self.attach(id, false);
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), EngineError> {
        let scopes = self.detach(id)?;
        self.subscriptions.remove(&id);
        self.release_connections(id, scopes);
        debug!(subscription = %id, "cache.unsubscribe");
        Ok(())
    }

    /// Re-register a subscription under new variables. References held under
    /// keys resolved from the old variables are dropped.
    pub fn resubscribe(
        &mut self,
        id: SubscriptionId,
        variables: Variables,
    ) -> Result<(), EngineError> {
        let scopes = self.detach(id)?;
        self.release_connections(id, scopes);
        if let Some(subscription) = self.subscriptions.get_mut(&id) {
            subscription.variables = variables;
        }
        self.attach(id, true);
        debug!(subscription = %id, "cache.resubscribe");
        Ok(())
    }

    /// Walk the subscription's selection over the live graph, adding one
    /// reference per path and registering the connections it crosses.
    fn attach(&mut self, id: SubscriptionId, purge_versions: bool) {
        let default_root = self.root_id();
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return;
        };
        let root = subscription.root(&default_root);
        let selection = subscription.spec.selection.clone();

        let mut walk = AttachWalk {
            id,
            variables: &subscription.variables,
            scope_parent: root.clone(),
            touched: &mut subscription.touched,
            scopes: Vec::new(),
            purged: purge_versions.then(HashSet::new),
        };
        add_subscribers(&mut self.store, &root, &selection, &mut walk);

        let scopes = std::mem::take(&mut walk.scopes);
        let previous = std::mem::replace(&mut subscription.scopes, scopes.clone());
        let dropped: Vec<ConnectionScope> = previous
            .into_iter()
            .filter(|old| !scopes.iter().any(|new| new.reference == old.reference))
            .collect();

        for scope in scopes {
            self.register_connection(scope);
        }
        self.release_connections(id, dropped);
    }

    /// Unregister the connections `id` registered, handing each one back to
    /// another live subscription that reaches the same name and parent.
    fn release_connections(&mut self, id: SubscriptionId, scopes: Vec<ConnectionScope>) {
        for scope in scopes {
            let reference = scope.reference;
            let owned = self
                .connections
                .get(&reference)
                .is_some_and(|current| current.owner == id);
            if !owned {
                continue;
            }
            self.connections.remove(&reference);

            let fallback = self
                .subscriptions
                .iter()
                .filter(|(other, _)| **other != id)
                .find_map(|(_, other)| {
                    other
                        .scopes
                        .iter()
                        .find(|candidate| candidate.reference == reference)
                        .cloned()
                });
            debug!(
                connection = %reference.name,
                parent = %reference.parent_id,
                handed_back = fallback.is_some(),
                "connection.released"
            );
            if let Some(fallback) = fallback {
                self.register_connection(fallback);
            }
        }
    }

    /// Remove every reference the subscription holds, path by path, then
    /// clear whatever a stale path may have left behind. Returns the
    /// connections it had registered.
    fn detach(&mut self, id: SubscriptionId) -> Result<Vec<ConnectionScope>, EngineError> {
        let default_root = self.root_id();
        let subscription = self
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| EngineError::UnknownSubscription(id.to_string()))?;
        let root = subscription.root(&default_root);

        remove_subscribers(
            &mut self.store,
            &root,
            &subscription.spec.selection,
            id,
            &subscription.variables,
        );
        for record_id in subscription.touched.drain() {
            if let Some(record) = self.store.get_mut(&record_id) {
                record.remove_subscription(id);
            }
        }
        Ok(std::mem::take(&mut subscription.scopes))
    }

    /// Rebuild a subscription's references after the links under it changed.
    fn resync(&mut self, id: SubscriptionId) {
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return;
        };
        for record_id in subscription.touched.drain() {
            if let Some(record) = self.store.get_mut(&record_id) {
                record.remove_subscription(id);
            }
        }
        self.attach(id, false);
    }

    /// Re-register relinked views, then hand every affected view its new projection.
    pub(crate) fn flush(&mut self, ctx: WriteContext<'_>) {
        let (relinked, affected) = ctx.into_parts();
        for id in relinked {
            self.resync(id);
        }

        let default_root = self.root_id();
        for id in affected {
            let Some(subscription) = self.subscriptions.get(&id) else {
                continue;
            };
            let root = subscription.root(&default_root);
            let value = read::project(
                &self.store,
                &root,
                &subscription.spec.selection,
                &subscription.variables,
            );
            trace!(subscription = %id, "cache.notify");
            if let Some(subscription) = self.subscriptions.get_mut(&id) {
                (subscription.spec.set)(&value);
            }
        }
    }

    // ========================================================================
    // Connections and deletion
    // ========================================================================

    /// The connection registered under `name` for `parent_id` (the cache root
    /// by default). Connections register when a subscription first reaches them.
    pub fn connection(
        &mut self,
        name: &str,
        parent_id: Option<&RecordId>,
    ) -> Result<ConnectionHandler<'_>, EngineError> {
        let parent = parent_id.cloned().unwrap_or_else(|| self.root_id());
        let reference = ConnectionRef::new(name, parent);
        self.connection_scope(&reference)?;
        Ok(ConnectionHandler::new(self, reference))
    }

    /// Remove a record from the cache and from every connection listing it.
    /// Unknown ids are ignored.
    pub fn delete(&mut self, id: &RecordId) -> Result<(), EngineError> {
        let variables = Variables::new();
        let mut ctx = WriteContext::new(&variables);
        self.delete_record(id, &mut ctx)?;
        self.flush(ctx);
        Ok(())
    }
}
