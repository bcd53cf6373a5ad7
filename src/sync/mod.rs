//! Shared playback state synchronization
//!
//! Keeps every participant's playback position and play/pause state
//! converging on the room's shared record without feedback loops, despite
//! updates arriving asynchronously and out of order.

pub mod playback;

pub use playback::{PlaybackRecord, PlaybackSynchronizer, Player};
