//! Room membership, chat, and snapshot observation
//!
//! A room is created implicitly by its first write and scopes four
//! sub-collections: the playback record, the message log, the presence
//! map, and the signaling log. This module covers the first three; the
//! signaling log belongs to [`crate::signaling`].

use crate::store::{unix_millis, SharedStore, StoreSubscription};
use crate::sync::PlaybackRecord;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// One participant's presence entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// Participant id
    pub id: String,
    /// Display name
    pub username: String,
    /// Wall-clock join time in milliseconds
    pub joined_at: u64,
}

/// One chat message as appended under the room's message log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author participant id
    pub user_id: String,
    /// Author display name
    pub username: String,
    /// Message text
    pub message: String,
    /// Wall-clock send time in milliseconds
    pub timestamp: u64,
}

/// Decoded view of the room's shared state
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    /// The shared playback record, once one exists
    pub playback: Option<PlaybackRecord>,
    /// Message log, sorted by timestamp
    pub messages: Vec<ChatMessage>,
    /// Present participants, sorted by join time
    pub users: Vec<Presence>,
}

impl RoomSnapshot {
    /// Participant ids in this snapshot, for roster updates
    pub fn roster(&self) -> Vec<String> {
        self.users.iter().map(|u| u.id.clone()).collect()
    }
}

/// One participant's handle on a room
pub struct RoomHandle {
    store: Arc<dyn SharedStore>,
    room_id: String,
    user_id: String,
    username: String,
}

impl RoomHandle {
    /// Create a handle for `user_id` (displayed as `username`) in `room_id`
    pub fn new(store: Arc<dyn SharedStore>, room_id: &str, user_id: &str, username: &str) -> Self {
        Self {
            store,
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
        }
    }

    /// Generate a fresh participant id
    pub fn generate_user_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// The room id
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The local participant id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Write our presence entry. Creates the room implicitly on first join.
    pub async fn join(&self) -> Result<()> {
        let presence = Presence {
            id: self.user_id.clone(),
            username: self.username.clone(),
            joined_at: unix_millis(),
        };
        let value = serde_json::to_value(&presence)
            .map_err(|e| Error::SerializationError(format!("presence encode: {}", e)))?;
        self.store
            .set(
                &format!("rooms/{}/users/{}", self.room_id, self.user_id),
                value,
            )
            .await?;
        info!(room = %self.room_id, user = %self.user_id, "joined room");
        Ok(())
    }

    /// Append a chat message. Blank messages are ignored.
    pub async fn send_message(&self, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(());
        }
        let entry = ChatMessage {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            message: message.to_string(),
            timestamp: unix_millis(),
        };
        let value = serde_json::to_value(&entry)
            .map_err(|e| Error::SerializationError(format!("message encode: {}", e)))?;
        self.store
            .push(&format!("rooms/{}/messages", self.room_id), value)
            .await?;
        Ok(())
    }

    /// Subscribe to the room root; every mutation yields a fresh snapshot
    pub async fn subscribe(&self) -> RoomSubscription {
        RoomSubscription {
            sub: self
                .store
                .subscribe(&format!("rooms/{}", self.room_id))
                .await,
        }
    }
}

/// Stream of decoded room snapshots
pub struct RoomSubscription {
    sub: StoreSubscription,
}

impl RoomSubscription {
    /// Receive the next snapshot, or `None` once the store is gone
    pub async fn recv(&mut self) -> Option<RoomSnapshot> {
        let value = self.sub.recv().await?;
        Some(decode_room(&value))
    }
}

fn decode_room(value: &Value) -> RoomSnapshot {
    let mut snapshot = RoomSnapshot::default();

    if let Some(playback) = value.get("videoState") {
        match serde_json::from_value::<PlaybackRecord>(playback.clone()) {
            Ok(record) => snapshot.playback = Some(record),
            Err(e) => warn!(error = %e, "skipping malformed playback record"),
        }
    }

    if let Some(children) = value.get("messages").and_then(Value::as_object) {
        for (key, child) in children {
            match serde_json::from_value::<ChatMessage>(child.clone()) {
                Ok(message) => snapshot.messages.push(message),
                Err(e) => warn!(key = %key, error = %e, "skipping malformed chat message"),
            }
        }
        snapshot.messages.sort_by_key(|m| m.timestamp);
    }

    if let Some(children) = value.get("users").and_then(Value::as_object) {
        for (key, child) in children {
            match serde_json::from_value::<Presence>(child.clone()) {
                Ok(user) => snapshot.users.push(user),
                Err(e) => warn!(key = %key, error = %e, "skipping malformed presence entry"),
            }
        }
        snapshot.users.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn handle(store: Arc<MemoryStore>, user_id: &str, username: &str) -> RoomHandle {
        RoomHandle::new(store, "r1", user_id, username)
    }

    #[tokio::test]
    async fn test_join_writes_presence() {
        let store = Arc::new(MemoryStore::new());
        handle(store.clone(), "u1", "alice").join().await.unwrap();

        let value = store.get("rooms/r1/users/u1").await.unwrap().unwrap();
        assert_eq!(value["id"], json!("u1"));
        assert_eq!(value["username"], json!("alice"));
        assert!(value["joinedAt"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_blank_messages_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let room = handle(store.clone(), "u1", "alice");

        room.send_message("   ").await.unwrap();
        assert!(store.get("rooms/r1/messages").await.unwrap().is_none());

        room.send_message("  hello  ").await.unwrap();
        let messages = store.get("rooms/r1/messages").await.unwrap().unwrap();
        let (_key, entry) = messages.as_object().unwrap().iter().next().unwrap();
        assert_eq!(entry["message"], json!("hello"));
    }

    #[tokio::test]
    async fn test_snapshot_sorts_messages_by_timestamp() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                "rooms/r1/messages/m2",
                json!({"userId": "u2", "username": "bob", "message": "second", "timestamp": 200}),
            )
            .await
            .unwrap();
        store
            .set(
                "rooms/r1/messages/m1",
                json!({"userId": "u1", "username": "alice", "message": "first", "timestamp": 100}),
            )
            .await
            .unwrap();

        let room = handle(store, "u1", "alice");
        let mut sub = room.subscribe().await;
        let snapshot = sub.recv().await.unwrap();

        let texts: Vec<&str> = snapshot.messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_snapshot_carries_playback_and_roster() {
        let store = Arc::new(MemoryStore::new());
        let alice = handle(store.clone(), "u1", "alice");
        let bob = handle(store.clone(), "u2", "bob");
        alice.join().await.unwrap();
        bob.join().await.unwrap();
        store
            .set(
                "rooms/r1/videoState",
                json!({
                    "url": "https://example.com/v.mp4",
                    "isPlaying": true,
                    "positionSeconds": 12.5,
                    "lastUpdated": 1,
                    "updatedBy": "u1"
                }),
            )
            .await
            .unwrap();

        let mut sub = alice.subscribe().await;
        let snapshot = sub.recv().await.unwrap();

        assert!(snapshot.playback.as_ref().unwrap().is_playing);
        let mut roster = snapshot.roster();
        roster.sort();
        assert_eq!(roster, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_updates_on_mutation() {
        let store = Arc::new(MemoryStore::new());
        let room = handle(store.clone(), "u1", "alice");
        let mut sub = room.subscribe().await;
        let _ = sub.recv().await;

        room.join().await.unwrap();
        let snapshot = sub.recv().await.unwrap();
        assert_eq!(snapshot.users.len(), 1);

        room.send_message("hi").await.unwrap();
        let snapshot = sub.recv().await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
    }
}
