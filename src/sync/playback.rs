//! Playback record and synchronizer

use crate::store::{unix_millis, SharedStore};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The room's shared playback record.
///
/// Exactly one exists per room; every write replaces it wholesale, and
/// conflicting concurrent writes resolve by the store's write ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRecord {
    /// Video URL currently loaded, if any
    pub url: Option<String>,

    /// Whether the room is playing
    pub is_playing: bool,

    /// Playback position in seconds
    pub position_seconds: f64,

    /// Wall-clock write time in milliseconds
    pub last_updated: u64,

    /// Participant who authored this record
    pub updated_by: String,
}

/// The local player the synchronizer reconciles against
#[async_trait]
pub trait Player: Send + Sync {
    /// Current playback position in seconds
    async fn position_secs(&self) -> f64;

    /// Whether the player is currently playing
    async fn is_playing(&self) -> bool;

    /// Jump to a position
    async fn seek(&self, seconds: f64);

    /// Apply a play or pause transition
    async fn set_playing(&self, playing: bool);
}

struct SyncState {
    last_record: Option<PlaybackRecord>,
    /// Armed by a local play/pause/seek; cleared when the write round-trips
    /// back as our own record. While armed, remote records are not reacted
    /// to, so a local action never bounces back as if it were remote.
    suppress_remote: bool,
}

/// Reconciles local playback intent against the room's shared record
pub struct PlaybackSynchronizer {
    store: Arc<dyn SharedStore>,
    path: String,
    local_id: String,
    player: Arc<dyn Player>,
    drift_tolerance_secs: f64,
    resync_threshold_secs: f64,
    state: RwLock<SyncState>,
}

impl PlaybackSynchronizer {
    /// Create a synchronizer for `local_id` in `room_id`.
    ///
    /// `drift_tolerance_secs` gates corrective seeks on remote records;
    /// `resync_threshold_secs` gates corrective publishes during playback.
    pub fn new(
        store: Arc<dyn SharedStore>,
        room_id: &str,
        local_id: &str,
        player: Arc<dyn Player>,
        drift_tolerance_secs: f64,
        resync_threshold_secs: f64,
    ) -> Self {
        Self {
            store,
            path: format!("rooms/{}/videoState", room_id),
            local_id: local_id.to_string(),
            player,
            drift_tolerance_secs,
            resync_threshold_secs,
            state: RwLock::new(SyncState {
                last_record: None,
                suppress_remote: false,
            }),
        }
    }

    /// The last record seen or published
    pub async fn last_record(&self) -> Option<PlaybackRecord> {
        self.state.read().await.last_record.clone()
    }

    async fn publish(&self, record: PlaybackRecord, suppress: bool) -> Result<()> {
        let value = serde_json::to_value(&record)
            .map_err(|e| Error::SerializationError(format!("playback record encode: {}", e)))?;
        {
            let mut state = self.state.write().await;
            state.last_record = Some(record);
            if suppress {
                state.suppress_remote = true;
            }
        }
        self.store.set(&self.path, value).await
    }

    fn stamped(&self, url: Option<String>, is_playing: bool, position_seconds: f64) -> PlaybackRecord {
        PlaybackRecord {
            url,
            is_playing,
            position_seconds,
            last_updated: unix_millis(),
            updated_by: self.local_id.clone(),
        }
    }

    /// Publish the local play intent at the player's current position
    pub async fn on_local_play(&self) -> Result<()> {
        let position = self.player.position_secs().await;
        let url = self.last_record().await.and_then(|r| r.url);
        debug!(position, "local play");
        self.publish(self.stamped(url, true, position), true).await
    }

    /// Publish the local pause intent at the player's current position
    pub async fn on_local_pause(&self) -> Result<()> {
        let position = self.player.position_secs().await;
        let url = self.last_record().await.and_then(|r| r.url);
        debug!(position, "local pause");
        self.publish(self.stamped(url, false, position), true).await
    }

    /// Publish a local seek. The local player has already moved; only the
    /// shared record needs to follow.
    pub async fn on_local_seek(&self, seconds: f64) -> Result<()> {
        let last = self.last_record().await;
        let is_playing = last.as_ref().map(|r| r.is_playing).unwrap_or(false);
        let url = last.and_then(|r| r.url);
        debug!(seconds, "local seek");
        self.publish(self.stamped(url, is_playing, seconds), true)
            .await
    }

    /// Load a new video: paused at position zero
    pub async fn on_local_load(&self, url: &str) -> Result<()> {
        info!(url, "loading video");
        self.publish(self.stamped(Some(url.to_string()), false, 0.0), false)
            .await
    }

    /// React to a change of the room's shared record.
    ///
    /// Own echoes confirm the round-trip and are otherwise ignored. While
    /// a local write is still in flight, remote records are recorded but
    /// not reacted to. Past those gates: drift beyond tolerance forces a
    /// seek, and a play/pause mismatch applies the remote transition.
    /// Smaller drift is left uncorrected to avoid visible jitter.
    pub async fn on_remote_record(&self, record: PlaybackRecord) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if record.updated_by == self.local_id {
                state.suppress_remote = false;
                state.last_record = Some(record);
                return Ok(());
            }
            if state.suppress_remote {
                debug!("ignoring remote record while local write is in flight");
                state.last_record = Some(record);
                return Ok(());
            }
            state.last_record = Some(record.clone());
        }

        let position = self.player.position_secs().await;
        let drift = (position - record.position_seconds).abs();
        if drift > self.drift_tolerance_secs {
            info!(
                drift,
                target = record.position_seconds,
                "correcting playback drift"
            );
            self.player.seek(record.position_seconds).await;
        }

        if self.player.is_playing().await != record.is_playing {
            debug!(playing = record.is_playing, "reconciling play state");
            self.player.set_playing(record.is_playing).await;
        }
        Ok(())
    }

    /// Periodic resync while playing.
    ///
    /// Call with the player's own reported position on progress ticks. If
    /// it has drifted from the last known record beyond the resync
    /// threshold and no local write is pending, a corrective record is
    /// published. This bounds staleness even without transport-level
    /// time-sync.
    pub async fn on_progress(&self, position_seconds: f64) -> Result<()> {
        let last = {
            let state = self.state.read().await;
            if state.suppress_remote {
                return Ok(());
            }
            match &state.last_record {
                Some(record) if record.is_playing => record.clone(),
                _ => return Ok(()),
            }
        };

        if (position_seconds - last.position_seconds).abs() > self.resync_threshold_secs {
            debug!(position_seconds, "publishing periodic resync");
            self.publish(
                self.stamped(last.url, last.is_playing, position_seconds),
                false,
            )
            .await?;
        }
        Ok(())
    }
}
