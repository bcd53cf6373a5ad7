//! One negotiated media session with a remote participant

use crate::config::RoomSyncConfig;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Negotiation progress for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No exchange in flight
    Stable,
    /// A local offer is published and awaiting its answer
    HaveLocalOffer,
    /// A remote offer is being answered
    HaveRemoteOffer,
}

/// Transport lifecycle state, mirrored from the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media is flowing
    Connected,
    /// Transport lost its pair; terminal here
    Disconnected,
    /// Negotiation or transport failed; terminal
    Failed,
    /// Closed locally or remotely; terminal
    Closed,
}

impl ConnectionState {
    /// Whether this state triggers session teardown
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

fn map_transport_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        _ => None,
    }
}

/// Transport callbacks repackaged as queue messages.
///
/// Callbacks run on the transport's own turns; they only post here, and the
/// orchestrator's single consumer task performs every session mutation.
#[derive(Debug)]
pub(crate) enum PeerEvent {
    /// The transport's connection state changed
    ConnectionState {
        peer_id: String,
        state: ConnectionState,
    },
    /// A local ICE candidate was gathered and should be signaled
    LocalCandidate {
        peer_id: String,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },
    /// The remote participant added a media track
    RemoteTrack {
        peer_id: String,
        track: Arc<TrackRemote>,
    },
}

/// Local bookkeeping for one remote participant's connection lifecycle
pub struct PeerSession {
    peer_id: String,
    connection_id: String,
    negotiation: RwLock<NegotiationState>,
    last_connection_state: RwLock<ConnectionState>,
    remote_tracks: RwLock<Vec<Arc<TrackRemote>>>,
    pc: Arc<RTCPeerConnection>,
    created_at: SystemTime,
}

impl PeerSession {
    /// Create a session toward `peer_id`.
    ///
    /// Builds the underlying peer connection with the configured STUN
    /// endpoints and wires transport callbacks onto `events`.
    pub(crate) async fn new(
        peer_id: String,
        config: &RoomSyncConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<Self>> {
        let connection_id = uuid::Uuid::new_v4().to_string();
        info!(peer = %peer_id, connection = %connection_id, "creating peer session");

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?);

        let state_tx = events.clone();
        let state_peer = peer_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            let peer_id = state_peer.clone();
            Box::pin(async move {
                if let Some(state) = map_transport_state(s) {
                    let _ = tx.send(PeerEvent::ConnectionState { peer_id, state });
                }
            })
        }));

        let candidate_tx = events.clone();
        let candidate_peer = peer_id.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            let peer_id = candidate_peer.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(PeerEvent::LocalCandidate {
                            peer_id,
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        });
                    }
                    Err(e) => warn!(peer = %peer_id, error = %e, "dropping unserializable candidate"),
                }
            })
        }));

        let track_tx = events;
        let track_peer = peer_id.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>,
                                   _receiver: Arc<RTCRtpReceiver>,
                                   _transceiver: Arc<RTCRtpTransceiver>| {
            let tx = track_tx.clone();
            let peer_id = track_peer.clone();
            Box::pin(async move {
                debug!(peer = %peer_id, kind = ?track.kind(), "remote track arrived");
                let _ = tx.send(PeerEvent::RemoteTrack { peer_id, track });
            })
        }));

        Ok(Arc::new(Self {
            peer_id,
            connection_id,
            negotiation: RwLock::new(NegotiationState::Stable),
            last_connection_state: RwLock::new(ConnectionState::New),
            remote_tracks: RwLock::new(Vec::new()),
            pc,
            created_at: SystemTime::now(),
        }))
    }

    /// The remote participant's id
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Unique identifier for this connection instance
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// When the session was created
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Current negotiation state
    pub async fn negotiation_state(&self) -> NegotiationState {
        *self.negotiation.read().await
    }

    /// Last observed transport state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.last_connection_state.read().await
    }

    pub(crate) async fn set_connection_state(&self, state: ConnectionState) {
        let mut guard = self.last_connection_state.write().await;
        if *guard != state {
            debug!(peer = %self.peer_id, from = ?*guard, to = ?state, "transport state");
            *guard = state;
        }
    }

    /// Attach a local capture track before negotiating
    pub(crate) async fn add_local_track(
        &self,
        track: Arc<TrackLocalStaticSample>,
    ) -> Result<()> {
        self.pc
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add local track: {}", e)))?;
        Ok(())
    }

    /// Create an offer and store it as the local description.
    ///
    /// Moves the session to `HaveLocalOffer`; returns the SDP to publish.
    pub(crate) async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let local_desc = self.pc.local_description().await.ok_or_else(|| {
            Error::SdpError("No local description after setting offer".to_string())
        })?;

        *self.negotiation.write().await = NegotiationState::HaveLocalOffer;
        debug!(peer = %self.peer_id, "created offer");
        Ok(local_desc.sdp)
    }

    /// Apply a remote offer and produce the answer to publish.
    ///
    /// Ends back in `Stable`: the answer completes this exchange locally.
    pub(crate) async fn apply_offer(&self, offer_sdp: String) -> Result<String> {
        *self.negotiation.write().await = NegotiationState::HaveRemoteOffer;

        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e)))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let local_desc = self.pc.local_description().await.ok_or_else(|| {
            Error::SdpError("No local description after setting answer".to_string())
        })?;

        *self.negotiation.write().await = NegotiationState::Stable;
        debug!(peer = %self.peer_id, "answered offer");
        Ok(local_desc.sdp)
    }

    /// Apply the remote answer to our outstanding offer
    pub(crate) async fn apply_answer(&self, answer_sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        *self.negotiation.write().await = NegotiationState::Stable;
        debug!(peer = %self.peer_id, "applied answer");
        Ok(())
    }

    /// Whether a remote description has been applied yet.
    ///
    /// Candidates arriving before this are dropped, not queued.
    pub(crate) async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    /// Add a trickled remote ICE candidate
    pub(crate) async fn add_ice_candidate(
        &self,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    ) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate,
            sdp_mid,
            sdp_mline_index,
            ..Default::default()
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))?;
        Ok(())
    }

    pub(crate) async fn record_remote_track(&self, track: Arc<TrackRemote>) {
        self.remote_tracks.write().await.push(track);
    }

    /// Remote media tracks received so far
    pub async fn remote_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.remote_tracks.read().await.clone()
    }

    /// Close the transport and discard remote track handles
    pub(crate) async fn close(&self) -> Result<()> {
        info!(peer = %self.peer_id, "closing peer session");
        self.remote_tracks.write().await.clear();
        *self.last_connection_state.write().await = ConnectionState::Closed;
        self.pc
            .close()
            .await
            .map_err(|e| Error::TransportFailed(format!("Failed to close connection: {}", e)))?;
        Ok(())
    }
}
