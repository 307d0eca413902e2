use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use normcache_core::{
    key::evaluate_key, ConnectionRef, FieldKind, RecordId, Selection, SubscriptionId, Variables,
};
use normcache_storage::{RecordStore, Subscriber};
use serde_json::Value;

use crate::connection::ConnectionScope;

pub type SetCallback = Box<dyn FnMut(&Value) + Send>;

/// A live query or fragment view: the selection to project and the callback
/// receiving each new projection.
pub struct SubscriptionSpec {
    pub root_type: String,
    pub selection: Arc<Selection>,
    pub parent_id: Option<RecordId>,
    pub set: SetCallback,
}

impl SubscriptionSpec {
    pub fn new(
        root_type: &str,
        selection: impl Into<Arc<Selection>>,
        set: impl FnMut(&Value) + Send + 'static,
    ) -> Self {
        Self {
            root_type: root_type.to_string(),
            selection: selection.into(),
            parent_id: None,
            set: Box::new(set),
        }
    }

    /// Root the view at `parent_id` instead of the cache root (fragments).
    pub fn with_parent(mut self, parent_id: RecordId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("root_type", &self.root_type)
            .field("parent_id", &self.parent_id)
            .field("fields", &self.selection.len())
            .finish_non_exhaustive()
    }
}

pub(crate) struct Subscription {
    pub spec: SubscriptionSpec,
    pub variables: Variables,
    /// Records holding at least one reference for this subscription.
    pub touched: HashSet<RecordId>,
    /// Connections registered by the latest walk.
    pub scopes: Vec<ConnectionScope>,
}

impl Subscription {
    pub fn root(&self, default_root: &RecordId) -> RecordId {
        self.spec
            .parent_id
            .clone()
            .unwrap_or_else(|| default_root.clone())
    }
}

/// State threaded through one subscribe walk.
pub(crate) struct AttachWalk<'a> {
    pub id: SubscriptionId,
    pub variables: &'a Variables,
    /// Scope parent for any connection met on the way.
    pub scope_parent: RecordId,
    pub touched: &'a mut HashSet<RecordId>,
    pub scopes: Vec<ConnectionScope>,
    /// Set on resubscription: (record, raw key) pairs already purged of stale versions.
    pub purged: Option<HashSet<(RecordId, String)>>,
}

/// Register one reference per field per path under `record_id`.
pub(crate) fn add_subscribers(
    store: &mut RecordStore,
    record_id: &RecordId,
    selection: &Selection,
    walk: &mut AttachWalk<'_>,
) {
    for (_, field) in selection.iter() {
        let key = evaluate_key(&field.key_raw, walk.variables);
        let Some(record) = store.get_mut(record_id) else {
            return;
        };

        if let Some(purged) = walk.purged.as_mut()
            && purged.insert((record_id.clone(), field.key_raw.clone()))
        {
            record.remove_all_subscription_versions(&field.key_raw, walk.id);
        }
        record.add_subscriber(&field.key_raw, &key, walk.id, 1);
        walk.touched.insert(record_id.clone());

        let FieldKind::Object(object) = &field.kind else {
            continue;
        };

        if let Some(connection) = &object.connection {
            let filters: BTreeMap<_, _> = connection
                .filters
                .iter()
                .filter_map(|(name, value)| {
                    value.resolve(walk.variables).map(|v| (name.clone(), v))
                })
                .collect();
            walk.scopes.push(ConnectionScope {
                owner: walk.id,
                reference: ConnectionRef::new(connection.name.clone(), walk.scope_parent.clone()),
                record: record_id.clone(),
                key: key.clone(),
                connection_type: field.type_name.clone(),
                selection: Arc::clone(&object.selection),
                filters,
            });
        }

        for child in children(store, record_id, &key) {
            add_subscribers(store, &child, &object.selection, walk);
        }
    }
}

/// Drop one reference per field per path under `record_id`.
pub(crate) fn remove_subscribers(
    store: &mut RecordStore,
    record_id: &RecordId,
    selection: &Selection,
    id: SubscriptionId,
    variables: &Variables,
) {
    let handle = [Subscriber { id, count: 1 }];
    for (_, field) in selection.iter() {
        let key = evaluate_key(&field.key_raw, variables);
        let Some(record) = store.get_mut(record_id) else {
            return;
        };
        record.remove_subscribers(std::slice::from_ref(&key), &handle);

        if let FieldKind::Object(object) = &field.kind {
            for child in children(store, record_id, &key) {
                remove_subscribers(store, &child, &object.selection, id, variables);
            }
        }
    }
}

/// Live records linked from `record_id` under `key`.
fn children(store: &RecordStore, record_id: &RecordId, key: &str) -> Vec<RecordId> {
    let Some(record) = store.get(record_id) else {
        return Vec::new();
    };
    let linked = match record.linked_record_id(key) {
        Some(linked) => vec![linked.clone()],
        None => record.linked_list_ids(key).to_vec(),
    };
    linked
        .into_iter()
        .filter(|child| store.contains(child))
        .collect()
}
