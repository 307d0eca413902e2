use std::collections::{BTreeSet, HashMap};

use normcache_core::{ConnectionRef, FieldValue, RecordId, SubscriptionId};

/// A live subscription on one field key, counted once per selection path
/// that reaches the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriber {
    pub id: SubscriptionId,
    pub count: usize,
}

/// One normalized entity.
#[derive(Debug, Clone)]
pub struct Record {
    id: RecordId,
    fields: HashMap<String, FieldValue>,
    record_links: HashMap<String, RecordId>,
    list_links: HashMap<String, Vec<RecordId>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    /// Every resolved key seen for a raw key, so a subscription can be purged
    /// from keys computed with variables it no longer uses.
    key_versions: HashMap<String, BTreeSet<String>>,
    connections: Vec<ConnectionRef>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: HashMap::new(),
            record_links: HashMap::new(),
            list_links: HashMap::new(),
            subscribers: HashMap::new(),
            key_versions: HashMap::new(),
            connections: Vec::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    // ========================================================================
    // Fields and links
    // ========================================================================

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn write_field(&mut self, key: &str, value: FieldValue) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn write_record_link(&mut self, key: &str, id: RecordId) {
        self.fields.remove(key);
        self.list_links.remove(key);
        self.record_links.insert(key.to_string(), id);
    }

    pub fn linked_record_id(&self, key: &str) -> Option<&RecordId> {
        self.record_links.get(key)
    }

    pub fn write_list_link(&mut self, key: &str, ids: Vec<RecordId>) {
        self.fields.remove(key);
        self.record_links.remove(key);
        self.list_links.insert(key.to_string(), ids);
    }

    pub fn linked_list_ids(&self, key: &str) -> &[RecordId] {
        self.list_links.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_list_link(&self, key: &str) -> bool {
        self.list_links.contains_key(key)
    }

    pub fn append_linked_list(&mut self, key: &str, id: RecordId) {
        self.list_links.entry(key.to_string()).or_default().push(id);
    }

    pub fn prepend_linked_list(&mut self, key: &str, id: RecordId) {
        self.list_links.entry(key.to_string()).or_default().insert(0, id);
    }

    /// Returns whether `id` was present.
    pub fn remove_from_linked_list(&mut self, key: &str, id: &RecordId) -> bool {
        match self.list_links.get_mut(key) {
            Some(ids) => {
                let before = ids.len();
                ids.retain(|existing| existing != id);
                ids.len() != before
            }
            None => false,
        }
    }

    /// Drop any single or list link stored under `key`.
    pub fn clear_link(&mut self, key: &str) {
        self.record_links.remove(key);
        self.list_links.remove(key);
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    pub fn subscribers(&self, key: &str) -> &[Subscriber] {
        self.subscribers.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subscriber_count(&self, key: &str, id: SubscriptionId) -> usize {
        self.subscribers(key)
            .iter()
            .find(|s| s.id == id)
            .map_or(0, |s| s.count)
    }

    /// Handles with at least one live reference on any key of this record.
    pub fn subscription_ids(&self) -> BTreeSet<SubscriptionId> {
        self.subscribers
            .values()
            .flatten()
            .map(|s| s.id)
            .collect()
    }

    pub fn add_subscriber(&mut self, raw_key: &str, resolved_key: &str, id: SubscriptionId, count: usize) {
        if count == 0 {
            return;
        }
        self.key_versions
            .entry(raw_key.to_string())
            .or_default()
            .insert(resolved_key.to_string());

        let subscribers = self.subscribers.entry(resolved_key.to_string()).or_default();
        match subscribers.iter_mut().find(|s| s.id == id) {
            Some(existing) => existing.count += count,
            None => subscribers.push(Subscriber { id, count }),
        }
    }

    /// Drop `count` references per handle on each key; a handle leaves a
    /// key's list once its count reaches zero.
    pub fn remove_subscribers(&mut self, keys: &[String], handles: &[Subscriber]) {
        for key in keys {
            let Some(subscribers) = self.subscribers.get_mut(key) else {
                continue;
            };
            for handle in handles {
                if let Some(existing) = subscribers.iter_mut().find(|s| s.id == handle.id) {
                    existing.count = existing.count.saturating_sub(handle.count);
                }
            }
            subscribers.retain(|s| s.count > 0);
            if subscribers.is_empty() {
                self.subscribers.remove(key);
            }
        }
    }

    /// Purge `id` from every resolved version of `raw_key`, regardless of count.
    pub fn remove_all_subscription_versions(&mut self, raw_key: &str, id: SubscriptionId) {
        let Some(versions) = self.key_versions.get(raw_key) else {
            return;
        };
        for key in versions {
            if let Some(subscribers) = self.subscribers.get_mut(key) {
                subscribers.retain(|s| s.id != id);
                if subscribers.is_empty() {
                    self.subscribers.remove(key);
                }
            }
        }
    }

    /// Drop every reference `id` holds on this record.
    pub fn remove_subscription(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|_, subscribers| {
            subscribers.retain(|s| s.id != id);
            !subscribers.is_empty()
        });
    }

    // ========================================================================
    // Connection back-references
    // ========================================================================

    pub fn connections(&self) -> &[ConnectionRef] {
        &self.connections
    }

    pub fn add_connection_reference(&mut self, reference: ConnectionRef) {
        if !self.connections.contains(&reference) {
            self.connections.push(reference);
        }
    }

    pub fn remove_connection_reference(&mut self, reference: &ConnectionRef) {
        self.connections.retain(|existing| existing != reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new(RecordId::entity("User", "1"))
    }

    fn handle(id: SubscriptionId, count: usize) -> Subscriber {
        Subscriber { id, count }
    }

    #[test]
    fn fields_overwrite() {
        let mut record = record();
        record.write_field("firstName", FieldValue::Text("bob".into()));
        record.write_field("firstName", FieldValue::Text("jane".into()));
        assert_eq!(record.field("firstName"), Some(&FieldValue::Text("jane".into())));
        assert_eq!(record.field("lastName"), None);
    }

    #[test]
    fn link_kinds_replace_each_other() {
        let mut record = record();
        record.write_field("friend", FieldValue::Null);
        record.write_record_link("friend", RecordId::entity("User", "2"));
        assert!(record.field("friend").is_none());

        record.write_list_link("friend", vec![RecordId::entity("User", "3")]);
        assert!(record.linked_record_id("friend").is_none());
        assert_eq!(record.linked_list_ids("friend").len(), 1);
    }

    #[test]
    fn linked_list_splicing() {
        let mut record = record();
        let two = RecordId::entity("User", "2");
        let three = RecordId::entity("User", "3");
        record.append_linked_list("friends", two.clone());
        record.prepend_linked_list("friends", three.clone());
        assert_eq!(record.linked_list_ids("friends"), &[three.clone(), two.clone()]);

        assert!(record.remove_from_linked_list("friends", &three));
        assert!(!record.remove_from_linked_list("friends", &three));
        assert_eq!(record.linked_list_ids("friends"), &[two]);
    }

    #[test]
    fn subscribers_are_reference_counted() {
        let mut record = record();
        let id = SubscriptionId::new();
        record.add_subscriber("firstName", "firstName", id, 1);
        record.add_subscriber("firstName", "firstName", id, 1);
        assert_eq!(record.subscribers("firstName").len(), 1);
        assert_eq!(record.subscriber_count("firstName", id), 2);

        record.remove_subscribers(&["firstName".to_string()], &[handle(id, 1)]);
        assert_eq!(record.subscriber_count("firstName", id), 1);

        record.remove_subscribers(&["firstName".to_string()], &[handle(id, 1)]);
        assert!(record.subscribers("firstName").is_empty());
    }

    #[test]
    fn purges_every_key_version() {
        let mut record = record();
        let id = SubscriptionId::new();
        let other = SubscriptionId::new();
        record.add_subscriber("friends(filter: $filter)", r#"friends(filter: "foo")"#, id, 1);
        record.add_subscriber("friends(filter: $filter)", r#"friends(filter: "bar")"#, id, 3);
        record.add_subscriber("friends(filter: $filter)", r#"friends(filter: "bar")"#, other, 1);

        record.remove_all_subscription_versions("friends(filter: $filter)", id);
        assert!(record.subscribers(r#"friends(filter: "foo")"#).is_empty());
        assert_eq!(record.subscribers(r#"friends(filter: "bar")"#), &[handle(other, 1)]);
    }

    #[test]
    fn connection_references_are_deduplicated() {
        let mut record = record();
        let reference = ConnectionRef::new("All_Users", RecordId::root());
        record.add_connection_reference(reference.clone());
        record.add_connection_reference(reference.clone());
        assert_eq!(record.connections().len(), 1);
        record.remove_connection_reference(&reference);
        assert!(record.connections().is_empty());
    }
}
