//! In-process reference implementation of the shared store
//!
//! A JSON tree behind an async lock with per-path subscriber fan-out.
//! Suitable for tests and single-process deployments; a networked room
//! swaps in a real store behind the same trait.

use super::{SharedStore, StoreSubscription};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

struct Subscriber {
    path: String,
    tx: mpsc::UnboundedSender<Value>,
}

struct MemoryInner {
    root: Value,
    subscribers: Vec<Subscriber>,
    push_counter: u64,
}

/// In-memory hierarchical store with snapshot+change subscriptions
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                push_counter: 0,
            })),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments(path) {
        node = node.as_object()?.get(seg)?;
    }
    Some(node)
}

fn write_at(root: &mut Value, path: &str, value: Value) {
    let segs = segments(path);
    let mut node = root;
    for (i, seg) in segs.iter().enumerate() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else { return };
        if i == segs.len() - 1 {
            map.insert(seg.to_string(), value);
            return;
        }
        node = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// A mutation at `mutated` is visible to a subscription at `watched` when
/// either path contains the other.
fn overlaps(watched: &str, mutated: &str) -> bool {
    let w = segments(watched);
    let m = segments(mutated);
    let common = w.len().min(m.len());
    w[..common] == m[..common]
}

impl MemoryInner {
    fn notify(&mut self, mutated_path: &str) {
        let root = &self.root;
        self.subscribers.retain(|sub| {
            if !overlaps(&sub.path, mutated_path) {
                return !sub.tx.is_closed();
            }
            let snapshot = value_at(root, &sub.path).cloned().unwrap_or(Value::Null);
            sub.tx.send(snapshot).is_ok()
        });
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let inner = self.inner.read().await;
        Ok(value_at(&inner.root, path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.write().await;
        write_at(&mut inner.root, path, value);
        inner.notify(path);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String> {
        let mut inner = self.inner.write().await;
        inner.push_counter += 1;
        // Zero-padded hex keeps lexicographic order equal to creation order.
        let key = format!("k{:016x}", inner.push_counter);
        let child_path = format!("{}/{}", path.trim_end_matches('/'), key);
        write_at(&mut inner.root, &child_path, value);
        inner.notify(&child_path);
        Ok(key)
    }

    async fn subscribe(&self, path: &str) -> StoreSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        let snapshot = value_at(&inner.root, path).cloned().unwrap_or(Value::Null);
        // Initial snapshot is delivered even when the subtree is empty.
        let _ = tx.send(snapshot);
        debug!(path, "store subscription added");
        inner.subscribers.push(Subscriber {
            path: path.to_string(),
            tx,
        });
        StoreSubscription::new(rx)
    }
}
