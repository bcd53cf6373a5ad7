//! Lock-step watch rooms over a shared rendezvous store
//!
//! A small group of participants in a shared room watch a video in
//! lock-step and talk over live audio/video. Coordination runs entirely
//! through a keyed, pub/sub-capable store — there is no dedicated
//! signaling server. Negotiation messages are appended under the room's
//! signaling path; every participant observes the full message set and
//! filters for itself.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  SharedStore (rendezvous point, pub/sub)              │
//! │  ↑ whole-value writes / appends / snapshot subs       │
//! │  ├─ SignalingChannel (offer/answer/ICE envelopes)     │
//! │  ├─ PlaybackSynchronizer (shared playback record)     │
//! │  └─ RoomHandle (presence, chat, snapshots)            │
//! │                                                       │
//! │  ConnectionOrchestrator                               │
//! │  ├─ PeerSession per remote participant (webrtc-rs)    │
//! │  ├─ processed-signal set (dedup across redeliveries)  │
//! │  └─ debounced bulk initiation (lower id initiates)    │
//! │                                                       │
//! │  LocalMediaSession (capture + mute flags)             │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use syncroom::RoomSyncConfig;
//!
//! let config = RoomSyncConfig::default().with_max_peers(4);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.drift_tolerance_secs, 2.0);
//! ```
//!
//! ## Joining a room
//!
//! ```no_run
//! use std::sync::Arc;
//! use syncroom::{
//!     ConnectionOrchestrator, LocalMediaSession, MemoryStore, RoomHandle, RoomSyncConfig,
//!     SyntheticMediaSource,
//! };
//!
//! # async fn example() -> syncroom::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let media = Arc::new(LocalMediaSession::new(Arc::new(SyntheticMediaSource::new())));
//! media.initialize().await?;
//!
//! let room = RoomHandle::new(store.clone(), "movie-night", "alice", "Alice");
//! room.join().await?;
//!
//! let (orchestrator, _events) = ConnectionOrchestrator::new(
//!     "alice",
//!     "movie-night",
//!     store,
//!     media,
//!     RoomSyncConfig::default(),
//! )?;
//! orchestrator.start().await?;
//! orchestrator.notify_media_ready().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod room;
pub mod signaling;
pub mod store;
pub mod sync;

// Re-exports for public API
pub use config::RoomSyncConfig;
pub use error::{Error, Result};
pub use media::{
    CaptureFailure, CaptureStream, LocalMediaSession, LocalTrack, MediaConstraints, MediaSource,
    SyntheticMediaSource, TrackKind,
};
pub use peer::{
    ConnectionOrchestrator, ConnectionState, NegotiationState, OrchestratorEvent, PeerSession,
};
pub use room::{ChatMessage, Presence, RoomHandle, RoomSnapshot, RoomSubscription};
pub use signaling::{SignalEnvelope, SignalPayload, SignalingChannel};
pub use store::{MemoryStore, SharedStore, StoreSubscription};
pub use sync::{PlaybackRecord, PlaybackSynchronizer, Player};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
