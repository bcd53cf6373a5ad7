//! Shared helpers for integration tests

// Each integration test crate uses a different subset of the harness.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use syncroom::{
    ConnectionOrchestrator, LocalMediaSession, MemoryStore, OrchestratorEvent, RoomSyncConfig,
    SyntheticMediaSource,
};
use tokio::sync::mpsc;

pub const ROOM: &str = "watch-room";

/// Opt-in test logging via `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Config tuned for tests: no STUN lookups, short debounce
pub fn test_config() -> RoomSyncConfig {
    RoomSyncConfig::default()
        .with_stun_servers(Vec::new())
        .with_initiation_debounce_ms(50)
}

/// A started participant with initialized synthetic media
pub async fn participant(
    id: &str,
    store: Arc<MemoryStore>,
) -> (
    ConnectionOrchestrator,
    mpsc::UnboundedReceiver<OrchestratorEvent>,
) {
    init_tracing();
    let media = Arc::new(LocalMediaSession::new(Arc::new(SyntheticMediaSource::new())));
    media.initialize().await.expect("synthetic media");
    let (orchestrator, events) =
        ConnectionOrchestrator::new(id, ROOM, store, media, test_config()).expect("orchestrator");
    orchestrator.start().await.expect("start");
    (orchestrator, events)
}

/// Poll `check` until it returns true or the deadline passes
pub async fn wait_until<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Duration::from_secs(5);
    let result = tokio::time::timeout(deadline, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {}", what);
}

/// Count signaling messages of `kind` sent by `from` in the room log
pub async fn count_signals(store: &MemoryStore, kind: &str, from: Option<&str>) -> usize {
    use syncroom::SharedStore;

    let path = format!("rooms/{}/signaling", ROOM);
    match store.get(&path).await.expect("store") {
        Some(children) => children
            .as_object()
            .map(|map| {
                map.values()
                    .filter(|child| {
                        child["type"] == serde_json::json!(kind)
                            && from.map(|f| child["from"] == serde_json::json!(f)).unwrap_or(true)
                    })
                    .count()
            })
            .unwrap_or(0),
        None => 0,
    }
}
