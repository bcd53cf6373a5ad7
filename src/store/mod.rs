//! Shared rendezvous store interface
//!
//! The room coordinates through a keyed, hierarchical, pub/sub-capable
//! store: atomic whole-value writes at a path, append-only child creation
//! ("push") under a path, and snapshot+change subscriptions that deliver
//! the full current value of a subtree on every mutation. Persistence and
//! replication guarantees belong to the store implementation, not to this
//! crate.

pub mod memory;

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use memory::MemoryStore;

/// A snapshot+change subscription on a store subtree.
///
/// The receiver gets the full current value of the subtree immediately on
/// subscribe and again after every mutation under it. Dropping the
/// subscription unsubscribes.
pub struct StoreSubscription {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl StoreSubscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { rx }
    }

    /// Receive the next snapshot, or `None` once the store is gone
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// Interface boundary to the shared store.
///
/// Paths are `/`-separated, e.g. `rooms/abc123/videoState`. Writes create
/// intermediate nodes implicitly.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Snapshot read of the subtree at `path`
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Atomic whole-value write at `path`
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Append-only child creation under `path`.
    ///
    /// Returns the store-assigned child key. Keys are monotonically
    /// ordered: lexicographic key order matches creation order.
    async fn push(&self, path: &str, value: Value) -> Result<String>;

    /// Subscribe to the subtree at `path` (snapshot + every change)
    async fn subscribe(&self, path: &str) -> StoreSubscription;
}

/// Milliseconds since the Unix epoch, as the store records wall-clock time
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
