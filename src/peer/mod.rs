//! Peer connection management
//!
//! One [`PeerSession`] per remote participant, owned by the
//! [`ConnectionOrchestrator`] that drives the offer/answer/ICE state
//! machine over the store-mediated signaling channel.

pub mod orchestrator;
pub mod session;

pub use orchestrator::{ConnectionOrchestrator, OrchestratorEvent};
pub use session::{ConnectionState, NegotiationState, PeerSession};
