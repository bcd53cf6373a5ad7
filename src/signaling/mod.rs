//! Store-mediated signaling channel
//!
//! Negotiation messages are appended under the room's signaling path and
//! observed through a snapshot subscription: every mutation redelivers the
//! complete current message set, not a diff. The channel provides no
//! ordering across senders, no acknowledgement, and no retraction; callers
//! filter and deduplicate by the store-assigned message identity.

use crate::store::{unix_millis, SharedStore, StoreSubscription};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Negotiation payload, tagged by message type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalPayload {
    /// SDP offer initiating a session
    Offer {
        /// SDP offer text
        sdp: String,
    },
    /// SDP answer completing a handshake
    Answer {
        /// SDP answer text
        sdp: String,
    },
    /// Trickled ICE candidate
    IceCandidate {
        /// Candidate attribute line
        candidate: String,
        /// Media line identifier
        #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        /// Media line index
        #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
        sdp_mline_index: Option<u16>,
    },
}

impl SignalPayload {
    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::IceCandidate { .. } => "ice-candidate",
        }
    }
}

/// One signaling message as stored under `rooms/{roomId}/signaling/{autoId}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    /// Store-assigned identity, filled from the child key on read-back
    #[serde(skip)]
    pub id: Option<String>,

    /// Sender participant id
    pub from: String,

    /// Recipient participant id
    pub to: String,

    /// Wall-clock publish time in milliseconds
    pub sent_at: u64,

    /// Typed negotiation payload
    #[serde(flatten)]
    pub payload: SignalPayload,
}

/// Publishes and observes signaling messages for one room
pub struct SignalingChannel {
    store: Arc<dyn SharedStore>,
    room_id: String,
    local_id: String,
}

impl SignalingChannel {
    /// Create a channel scoped to `room_id`, sending as `local_id`
    pub fn new(store: Arc<dyn SharedStore>, room_id: &str, local_id: &str) -> Self {
        Self {
            store,
            room_id: room_id.to_string(),
            local_id: local_id.to_string(),
        }
    }

    fn path(&self) -> String {
        format!("rooms/{}/signaling", self.room_id)
    }

    /// Append a message addressed to `to`; returns the store-assigned id
    pub async fn publish(&self, to: &str, payload: SignalPayload) -> Result<String> {
        let envelope = SignalEnvelope {
            id: None,
            from: self.local_id.clone(),
            to: to.to_string(),
            sent_at: unix_millis(),
            payload,
        };
        let value = serde_json::to_value(&envelope)
            .map_err(|e| Error::SerializationError(format!("signal encode: {}", e)))?;
        let id = self.store.push(&self.path(), value).await?;
        debug!(
            kind = envelope.payload.kind(),
            to, id, "published signaling message"
        );
        Ok(id)
    }

    /// Subscribe to the room's complete signaling log
    pub async fn subscribe(&self) -> SignalSubscription {
        SignalSubscription {
            sub: self.store.subscribe(&self.path()).await,
        }
    }
}

/// Stream of full signaling snapshots, decoded and key-sorted
pub struct SignalSubscription {
    sub: StoreSubscription,
}

impl SignalSubscription {
    /// Receive the next snapshot of all messages in the room.
    ///
    /// Malformed children are skipped with a warning; an empty room yields
    /// an empty set.
    pub async fn recv(&mut self) -> Option<Vec<SignalEnvelope>> {
        let snapshot = self.sub.recv().await?;
        Some(decode_snapshot(&snapshot))
    }
}

fn decode_snapshot(snapshot: &Value) -> Vec<SignalEnvelope> {
    let Some(children) = snapshot.as_object() else {
        return Vec::new();
    };

    let mut entries: Vec<(&String, &Value)> = children.iter().collect();
    entries.sort_by_key(|(key, _)| key.as_str());

    let mut messages: Vec<SignalEnvelope> = Vec::with_capacity(entries.len());
    for (key, child) in entries {
        match serde_json::from_value::<SignalEnvelope>(child.clone()) {
            Ok(mut envelope) => {
                envelope.id = Some(key.clone());
                messages.push(envelope);
            }
            Err(e) => warn!(key = %key, error = %e, "skipping malformed signaling message"),
        }
    }
    messages
}
