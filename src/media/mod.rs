//! Local media capture seam
//!
//! Capture devices sit behind the [`MediaSource`] trait so the room core
//! never talks to hardware directly. A source hands back a
//! [`CaptureStream`] of toggleable local tracks carried over
//! `TrackLocalStaticSample`; muting flips a flag consulted by whatever
//! pumps samples into the track, and never renegotiates.

pub mod session;
pub mod synthetic;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub use session::LocalMediaSession;
pub use synthetic::SyntheticMediaSource;

/// Kind of a capture track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
}

/// Requested capture capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Request a video track
    pub video: bool,
    /// Request an audio track
    pub audio: bool,
}

/// Why a capture acquisition failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureFailure {
    /// The user or platform denied access to the device
    #[error("permission denied")]
    PermissionDenied,
    /// No matching capture device exists
    #[error("no capture device available")]
    DeviceUnavailable,
}

/// One toggleable local capture track
#[derive(Debug)]
pub struct LocalTrack {
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    rtc: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    /// Wrap an RTP track as a capture track, initially enabled
    pub fn new(kind: TrackKind, rtc: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            rtc,
        }
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Whether samples for this track are currently being sent
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the enabled flag. The sample pump consults this; the
    /// transport is untouched.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Shared handle to the enabled flag, for sample pumps
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    /// The underlying RTP track to attach to a peer connection
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtc)
    }
}

/// An acquired set of local capture tracks
#[derive(Debug)]
pub struct CaptureStream {
    tracks: Vec<LocalTrack>,
}

impl CaptureStream {
    /// Build a stream from acquired tracks
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    /// All tracks, in acquisition order
    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// First track of the given kind, if any
    pub fn first_track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Whether any track of the given kind exists
    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.first_track(kind).is_some()
    }
}

/// Capability consumed from the media layer: device acquisition
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire a capture stream matching `constraints`
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> std::result::Result<CaptureStream, CaptureFailure>;
}
