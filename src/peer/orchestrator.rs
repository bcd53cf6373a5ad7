//! Connection orchestrator
//!
//! Owns the set of live peer sessions for the local participant and drives
//! the offer/answer/ICE state machine from signaling snapshots. Transport
//! callbacks never mutate the session map directly: they post onto an
//! internal event queue consumed by a single orchestrator task.

use super::session::{ConnectionState, NegotiationState, PeerEvent, PeerSession};
use crate::config::RoomSyncConfig;
use crate::media::LocalMediaSession;
use crate::signaling::{SignalEnvelope, SignalPayload, SignalingChannel};
use crate::store::SharedStore;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::track::track_remote::TrackRemote;

/// Observations surfaced to the caller
#[derive(Debug)]
pub enum OrchestratorEvent {
    /// A session's transport state changed
    ConnectionStateChanged {
        /// Remote participant id
        peer_id: String,
        /// New transport state
        state: ConnectionState,
    },
    /// A remote media track became available
    RemoteTrackAdded {
        /// Remote participant id
        peer_id: String,
        /// Handle to the remote track
        track: Arc<TrackRemote>,
    },
    /// A session was torn down and removed from the active set
    PeerClosed {
        /// Remote participant id
        peer_id: String,
    },
}

#[derive(Default)]
struct OrchestratorTasks {
    pump: Option<JoinHandle<()>>,
    signaling: Option<JoinHandle<()>>,
    debounce: Option<JoinHandle<()>>,
}

struct Inner {
    local_id: String,
    config: RoomSyncConfig,
    signaling: SignalingChannel,
    media: Arc<LocalMediaSession>,
    sessions: RwLock<HashMap<String, Arc<PeerSession>>>,
    /// Signal identities already acted on. Grows for the lifetime of the
    /// room visit and is only released on shutdown.
    processed: RwLock<HashSet<String>>,
    roster: RwLock<Vec<String>>,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    out_tx: mpsc::UnboundedSender<OrchestratorEvent>,
    /// Serializes negotiation steps so no two are in flight for the same
    /// peer at once.
    negotiation_gate: Mutex<()>,
    tasks: Mutex<OrchestratorTasks>,
}

/// Drives one participant's side of the room mesh
pub struct ConnectionOrchestrator {
    inner: Arc<Inner>,
}

impl ConnectionOrchestrator {
    /// Create an orchestrator for `local_id` in `room_id`.
    ///
    /// Returns the orchestrator and the event stream carrying
    /// connection-state, remote-track, and teardown observations.
    /// Must be called from within a Tokio runtime.
    pub fn new(
        local_id: &str,
        room_id: &str,
        store: Arc<dyn SharedStore>,
        media: Arc<LocalMediaSession>,
        config: RoomSyncConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OrchestratorEvent>)> {
        config.validate()?;

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| {
            let pump = Inner::spawn_pump(weak.clone(), peer_rx);
            Inner {
                local_id: local_id.to_string(),
                signaling: SignalingChannel::new(store, room_id, local_id),
                config,
                media,
                sessions: RwLock::new(HashMap::new()),
                processed: RwLock::new(HashSet::new()),
                roster: RwLock::new(Vec::new()),
                peer_tx,
                out_tx,
                negotiation_gate: Mutex::new(()),
                tasks: Mutex::new(OrchestratorTasks {
                    pump: Some(pump),
                    ..OrchestratorTasks::default()
                }),
            }
        });

        Ok((Self { inner }, out_rx))
    }

    /// The local participant id
    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    /// Begin consuming the room's signaling log
    pub async fn start(&self) -> Result<()> {
        let mut sub = self.inner.signaling.subscribe().await;
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(batch) = sub.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                for envelope in &batch {
                    if let Err(e) = inner.handle_signal(envelope).await {
                        warn!(error = %e, "signal handling failed");
                    }
                }
            }
        });
        self.inner.tasks.lock().await.signaling = Some(handle);
        info!(local = %self.inner.local_id, "orchestrator started");
        Ok(())
    }

    /// Start a call toward `peer_id`.
    ///
    /// No-op if a session already exists or local media is unavailable.
    pub async fn initiate_call(&self, peer_id: &str) -> Result<()> {
        self.inner.initiate_call(peer_id).await
    }

    /// Process one signaling message. Normally fed by [`start`](Self::start);
    /// exposed for callers that drive their own subscription.
    pub async fn handle_signal(&self, envelope: &SignalEnvelope) -> Result<()> {
        self.inner.handle_signal(envelope).await
    }

    /// Replace the known participant roster and (re)arm the deferred
    /// bulk-initiation pass
    pub async fn update_roster(&self, roster: Vec<String>) {
        *self.inner.roster.write().await = roster;
        Inner::arm_bulk_initiation(&self.inner).await;
    }

    /// Signal that local media just became ready, (re)arming the deferred
    /// bulk-initiation pass
    pub async fn notify_media_ready(&self) {
        Inner::arm_bulk_initiation(&self.inner).await;
    }

    /// Flip the local camera track's enabled flag. No renegotiation;
    /// observable via [`LocalMediaSession`] state.
    pub async fn toggle_video(&self) -> bool {
        self.inner.media.toggle_video().await
    }

    /// Flip the local microphone track's enabled flag. No renegotiation;
    /// observable via [`LocalMediaSession`] state.
    pub async fn toggle_audio(&self) -> bool {
        self.inner.media.toggle_audio().await
    }

    /// The local media session
    pub fn media(&self) -> &Arc<LocalMediaSession> {
        &self.inner.media
    }

    /// Whether an active session exists for `peer_id`
    pub async fn has_session(&self, peer_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(peer_id)
    }

    /// The session for `peer_id`, if active
    pub async fn session(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        self.inner.sessions.read().await.get(peer_id).cloned()
    }

    /// Ids of all peers with an active session
    pub async fn peer_ids(&self) -> Vec<String> {
        self.inner.sessions.read().await.keys().cloned().collect()
    }

    /// Number of active sessions
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Tear down every session, cancel timers and subscriptions, and
    /// release local media. Called on room exit.
    pub async fn shutdown(&self) {
        info!(local = %self.inner.local_id, "orchestrator shutting down");
        {
            let mut tasks = self.inner.tasks.lock().await;
            for handle in [
                tasks.signaling.take(),
                tasks.debounce.take(),
                tasks.pump.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
        }

        let drained: Vec<(String, Arc<PeerSession>)> =
            self.inner.sessions.write().await.drain().collect();
        for (peer_id, session) in drained {
            if let Err(e) = session.close().await {
                warn!(peer = %peer_id, error = %e, "error closing peer session");
            }
            let _ = self
                .inner
                .out_tx
                .send(OrchestratorEvent::PeerClosed { peer_id });
        }

        self.inner.processed.write().await.clear();
        self.inner.media.release().await;
    }
}

impl Inner {
    fn spawn_pump(
        weak: std::sync::Weak<Inner>,
        mut rx: mpsc::UnboundedReceiver<PeerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_peer_event(event).await;
            }
        })
    }

    async fn arm_bulk_initiation(inner: &Arc<Inner>) {
        let mut tasks = inner.tasks.lock().await;
        if let Some(previous) = tasks.debounce.take() {
            previous.abort();
        }
        let weak = Arc::downgrade(inner);
        let delay = inner.config.initiation_debounce();
        tasks.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.bulk_initiate().await;
            }
        }));
    }

    /// One initiation pass toward every eligible peer. The lower id is the
    /// sole initiator for any pair, so both sides never race offers.
    async fn bulk_initiate(&self) {
        if !self.media.is_ready().await {
            debug!("skipping bulk initiation: local media unavailable");
            return;
        }
        let roster = self.roster.read().await.clone();
        for peer_id in roster {
            if peer_id == self.local_id || self.local_id.as_str() >= peer_id.as_str() {
                continue;
            }
            if let Err(e) = self.initiate_call(&peer_id).await {
                warn!(peer = %peer_id, error = %e, "call initiation failed");
            }
        }
    }

    async fn initiate_call(&self, peer_id: &str) -> Result<()> {
        let _gate = self.negotiation_gate.lock().await;

        if self.sessions.read().await.contains_key(peer_id) {
            return Ok(());
        }
        if !self.media.is_ready().await {
            debug!(peer = %peer_id, "not initiating: local media unavailable");
            return Ok(());
        }

        let session = match self.create_session(peer_id).await {
            Ok(session) => session,
            Err(e) if e.is_negotiation_artifact() => {
                debug!(peer = %peer_id, reason = %e, "not initiating");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let offer = match session.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "offer creation failed");
                self.teardown_session(peer_id).await;
                return Err(e);
            }
        };

        self.signaling
            .publish(peer_id, SignalPayload::Offer { sdp: offer })
            .await?;
        info!(peer = %peer_id, "offer published");
        Ok(())
    }

    async fn create_session(&self, peer_id: &str) -> Result<Arc<PeerSession>> {
        {
            let sessions = self.sessions.read().await;
            if sessions.len() >= self.config.max_peers as usize {
                return Err(Error::NegotiationRejected(format!(
                    "mesh is full ({} peers)",
                    sessions.len()
                )));
            }
        }

        let session =
            PeerSession::new(peer_id.to_string(), &self.config, self.peer_tx.clone()).await?;
        for track in self.media.rtc_tracks().await {
            session.add_local_track(track).await?;
        }
        self.sessions
            .write()
            .await
            .insert(peer_id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    async fn handle_signal(&self, envelope: &SignalEnvelope) -> Result<()> {
        if envelope.to != self.local_id || envelope.from == self.local_id {
            return Ok(());
        }
        let Some(id) = envelope.id.as_deref() else {
            return Ok(());
        };
        {
            let mut processed = self.processed.write().await;
            if !processed.insert(id.to_string()) {
                return Ok(());
            }
        }

        let _gate = self.negotiation_gate.lock().await;
        let peer_id = envelope.from.as_str();

        match &envelope.payload {
            SignalPayload::Offer { sdp } => {
                let session = match self.session(peer_id).await {
                    Some(session) => session,
                    None => match self.create_session(peer_id).await {
                        Ok(session) => session,
                        Err(e) if e.is_negotiation_artifact() => {
                            debug!(peer = %peer_id, reason = %e, "dropping offer");
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    },
                };
                if session.negotiation_state().await != NegotiationState::Stable {
                    debug!(peer = %peer_id, "dropping re-offer while negotiation is in flight");
                    return Ok(());
                }
                match session.apply_offer(sdp.clone()).await {
                    Ok(answer) => {
                        self.signaling
                            .publish(peer_id, SignalPayload::Answer { sdp: answer })
                            .await?;
                        info!(peer = %peer_id, "answer published");
                    }
                    Err(e) => {
                        warn!(peer = %peer_id, error = %e, "offer handling failed");
                        self.teardown_session(peer_id).await;
                    }
                }
            }
            SignalPayload::Answer { sdp } => {
                let Some(session) = self.session(peer_id).await else {
                    debug!(peer = %peer_id, "dropping answer for unknown session");
                    return Ok(());
                };
                if session.negotiation_state().await != NegotiationState::HaveLocalOffer {
                    debug!(peer = %peer_id, "dropping answer: no outstanding offer");
                    return Ok(());
                }
                if let Err(e) = session.apply_answer(sdp.clone()).await {
                    warn!(peer = %peer_id, error = %e, "answer handling failed");
                    self.teardown_session(peer_id).await;
                }
            }
            SignalPayload::IceCandidate {
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => {
                let Some(session) = self.session(peer_id).await else {
                    debug!(peer = %peer_id, "dropping candidate for unknown session");
                    return Ok(());
                };
                if !session.has_remote_description().await {
                    // Dropped, not queued; the peer's own candidate churn
                    // re-covers the loss.
                    debug!(peer = %peer_id, "dropping candidate before remote description");
                    return Ok(());
                }
                if let Err(e) = session
                    .add_ice_candidate(candidate.clone(), sdp_mid.clone(), *sdp_mline_index)
                    .await
                {
                    warn!(peer = %peer_id, error = %e, "candidate handling failed");
                    self.teardown_session(peer_id).await;
                }
            }
        }
        Ok(())
    }

    async fn handle_peer_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::ConnectionState { peer_id, state } => {
                if let Some(session) = self.session(&peer_id).await {
                    session.set_connection_state(state).await;
                }
                let _ = self.out_tx.send(OrchestratorEvent::ConnectionStateChanged {
                    peer_id: peer_id.clone(),
                    state,
                });
                if state.is_terminal() {
                    self.teardown_session(&peer_id).await;
                }
            }
            PeerEvent::LocalCandidate {
                peer_id,
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => {
                if let Err(e) = self
                    .signaling
                    .publish(
                        &peer_id,
                        SignalPayload::IceCandidate {
                            candidate,
                            sdp_mid,
                            sdp_mline_index,
                        },
                    )
                    .await
                {
                    warn!(peer = %peer_id, error = %e, "failed to publish local candidate");
                }
            }
            PeerEvent::RemoteTrack { peer_id, track } => {
                if let Some(session) = self.session(&peer_id).await {
                    session.record_remote_track(Arc::clone(&track)).await;
                    let _ = self
                        .out_tx
                        .send(OrchestratorEvent::RemoteTrackAdded { peer_id, track });
                }
            }
        }
    }

    async fn session(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.read().await.get(peer_id).cloned()
    }

    /// Remove and close one session. Safe to call repeatedly; only the
    /// first call observes the session.
    async fn teardown_session(&self, peer_id: &str) {
        let removed = self.sessions.write().await.remove(peer_id);
        if let Some(session) = removed {
            if let Err(e) = session.close().await {
                warn!(peer = %peer_id, error = %e, "error closing peer session");
            }
            let _ = self.out_tx.send(OrchestratorEvent::PeerClosed {
                peer_id: peer_id.to_string(),
            });
        }
    }
}
