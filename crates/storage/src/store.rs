use std::collections::HashMap;

use normcache_core::RecordId;
use tracing::trace;

use crate::error::StorageError;
use crate::record::Record;

/// Identity map owning every record. Records refer to each other by id only.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<RecordId, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub fn require(&self, id: &RecordId) -> Result<&Record, StorageError> {
        self.records
            .get(id)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))
    }

    /// Fetch a record, creating an empty one on first reference.
    pub fn ensure(&mut self, id: &RecordId) -> &mut Record {
        self.records.entry(id.clone()).or_insert_with(|| {
            trace!(record = %id, "store.record_created");
            Record::new(id.clone())
        })
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<Record> {
        self.records.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.keys()
    }

    pub fn linked_record(&self, id: &RecordId, key: &str) -> Option<&Record> {
        let linked = self.records.get(id)?.linked_record_id(key)?;
        self.records.get(linked)
    }

    /// The records listed under `key`, in order, skipping ids that no longer
    /// resolve (deleted records).
    pub fn linked_list(&self, id: &RecordId, key: &str) -> Vec<&Record> {
        match self.records.get(id) {
            Some(record) => record
                .linked_list_ids(key)
                .iter()
                .filter_map(|linked| self.records.get(linked))
                .collect(),
            None => Vec::new(),
        }
    }
}
