use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

/// A small shared, JSON-shaped key-value store. `FlowController` callbacks
/// and `ContextBuilder` templates both use it to carry state that doesn't
/// fit neatly into a typed `Payload` — accumulated counters, scratch
/// values computed mid-callback, that sort of thing.
///
/// Cloning a `Context` clones the handle, not the data: all clones share
/// the same backing map, the same way `Arc` sharing works everywhere else
/// in this crate.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().await.insert(key.into(), value);
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.remove(key)
    }

    pub async fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().await.clone()
    }
}
