use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Captures every projection handed to a subscription callback.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback appending to this recorder.
    pub fn callback(&self) -> impl FnMut(&Value) + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move |value: &Value| calls.lock().push(value.clone())
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn last(&self) -> Option<Value> {
        self.calls.lock().last().cloned()
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}
