use normcache_core::{CacheConfig, FieldValue, RecordId, Selection, SubscriptionId, Variables};
use normcache_engine::{Cache, EngineError, SubscriptionSpec};
use serde_json::Value;

use crate::recorder::Recorder;

/// A cache plus shortcuts for the writes and views the suites repeat.
pub struct TestCache {
    pub cache: Cache,
}

impl Default for TestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCache {
    pub fn new() -> Self {
        crate::init_tracing();
        Self {
            cache: Cache::default(),
        }
    }

    pub fn with_config(config: CacheConfig) -> Result<Self, EngineError> {
        crate::init_tracing();
        Ok(Self {
            cache: Cache::with_config(config)?,
        })
    }

    /// Write a payload at the cache root without variables.
    pub fn write(&mut self, selection: &Selection, payload: Value) -> Result<(), EngineError> {
        self.cache.write(selection, &payload, &Variables::new(), None)
    }

    pub fn write_with(
        &mut self,
        selection: &Selection,
        payload: Value,
        variables: &Variables,
    ) -> Result<(), EngineError> {
        self.cache.write(selection, &payload, variables, None)
    }

    /// Subscribe a recorder to a root query.
    pub fn subscribe(
        &mut self,
        selection: &Selection,
    ) -> Result<(SubscriptionId, Recorder), EngineError> {
        self.subscribe_with(selection, Variables::new(), None)
    }

    pub fn subscribe_with(
        &mut self,
        selection: &Selection,
        variables: Variables,
        parent: Option<RecordId>,
    ) -> Result<(SubscriptionId, Recorder), EngineError> {
        let recorder = Recorder::new();
        let mut spec = SubscriptionSpec::new("Query", selection.clone(), recorder.callback());
        if let Some(parent) = parent {
            spec = spec.with_parent(parent);
        }
        let id = self.cache.subscribe(spec, variables)?;
        Ok((id, recorder))
    }

    pub fn field(&self, record: &str, key: &str) -> Option<FieldValue> {
        self.cache
            .record(&RecordId::from(record))
            .and_then(|r| r.field(key).cloned())
    }

    pub fn subscriber_count(&self, record: &str, key: &str, id: SubscriptionId) -> usize {
        self.cache.subscriber_count(&RecordId::from(record), key, id)
    }

    pub fn list_ids(&self, record: &str, key: &str) -> Vec<String> {
        self.cache
            .store()
            .linked_list(&RecordId::from(record), key)
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    pub fn has_record(&self, record: &str) -> bool {
        self.cache.record(&RecordId::from(record)).is_some()
    }
}
