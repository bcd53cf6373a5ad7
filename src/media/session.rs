//! Local media session
//!
//! Acquires and holds the local capture stream independently of any peer
//! connection. Mute state lives here: toggling flips the matching track's
//! enabled flag without renegotiating.

use super::{CaptureStream, MediaConstraints, MediaSource, TrackKind};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use tracing::{debug, info, warn};

/// Holds the local capture stream and its mute flags
pub struct LocalMediaSession {
    source: Arc<dyn MediaSource>,
    stream: RwLock<Option<CaptureStream>>,
    video_enabled: AtomicBool,
    audio_enabled: AtomicBool,
}

impl LocalMediaSession {
    /// Create a session over a capture source; no device is touched until
    /// [`initialize`](Self::initialize)
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            stream: RwLock::new(None),
            video_enabled: AtomicBool::new(false),
            audio_enabled: AtomicBool::new(false),
        }
    }

    /// Acquire the local capture stream.
    ///
    /// Requests combined audio+video first, falls back to audio-only, and
    /// reports `MediaUnavailable` if that also fails. Initial enabled
    /// flags are read from the acquired tracks, not assumed.
    pub async fn initialize(&self) -> Result<()> {
        let stream = match self
            .source
            .acquire(MediaConstraints {
                video: true,
                audio: true,
            })
            .await
        {
            Ok(stream) => stream,
            Err(primary) => {
                warn!(error = %primary, "combined capture failed, retrying audio-only");
                match self
                    .source
                    .acquire(MediaConstraints {
                        video: false,
                        audio: true,
                    })
                    .await
                {
                    Ok(stream) => stream,
                    Err(fallback) => {
                        warn!(error = %fallback, "audio-only capture failed");
                        return Err(Error::MediaUnavailable(fallback.to_string()));
                    }
                }
            }
        };

        self.video_enabled.store(
            stream
                .first_track(TrackKind::Video)
                .map(|t| t.is_enabled())
                .unwrap_or(false),
            Ordering::SeqCst,
        );
        self.audio_enabled.store(
            stream
                .first_track(TrackKind::Audio)
                .map(|t| t.is_enabled())
                .unwrap_or(false),
            Ordering::SeqCst,
        );

        info!(
            tracks = stream.tracks().len(),
            video = self.video_enabled.load(Ordering::SeqCst),
            "local media ready"
        );
        *self.stream.write().await = Some(stream);
        Ok(())
    }

    /// Whether a capture stream is held
    pub async fn is_ready(&self) -> bool {
        self.stream.read().await.is_some()
    }

    /// Whether the camera track is currently sending
    pub fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }

    /// Whether the microphone track is currently sending
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    /// Flip the camera track's enabled flag; returns the resulting state.
    ///
    /// With no video track present this is a logged no-op.
    pub async fn toggle_video(&self) -> bool {
        self.toggle(TrackKind::Video, &self.video_enabled).await
    }

    /// Flip the microphone track's enabled flag; returns the resulting
    /// state. With no audio track present this is a logged no-op.
    pub async fn toggle_audio(&self) -> bool {
        self.toggle(TrackKind::Audio, &self.audio_enabled).await
    }

    async fn toggle(&self, kind: TrackKind, flag: &AtomicBool) -> bool {
        let guard = self.stream.read().await;
        match guard.as_ref().and_then(|s| s.first_track(kind)) {
            Some(track) => {
                let enabled = !track.is_enabled();
                track.set_enabled(enabled);
                flag.store(enabled, Ordering::SeqCst);
                debug!(?kind, enabled, "toggled local track");
                enabled
            }
            None => {
                debug!(?kind, "toggle ignored: no such track");
                flag.load(Ordering::SeqCst)
            }
        }
    }

    /// RTP tracks to attach to a new peer connection, in acquisition order
    pub async fn rtc_tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.stream
            .read()
            .await
            .as_ref()
            .map(|s| s.tracks().iter().map(|t| t.rtc_track()).collect())
            .unwrap_or_default()
    }

    /// Release the capture stream on room exit
    pub async fn release(&self) {
        if self.stream.write().await.take().is_some() {
            info!("local media released");
        }
        self.video_enabled.store(false, Ordering::SeqCst);
        self.audio_enabled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SyntheticMediaSource;

    fn session(source: SyntheticMediaSource) -> LocalMediaSession {
        LocalMediaSession::new(Arc::new(source))
    }

    #[tokio::test]
    async fn test_initialize_combined() {
        let media = session(SyntheticMediaSource::new());
        media.initialize().await.unwrap();

        assert!(media.is_ready().await);
        assert!(media.video_enabled());
        assert!(media.audio_enabled());
        assert_eq!(media.rtc_tracks().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_to_audio_only() {
        let media = session(SyntheticMediaSource::without_video());
        media.initialize().await.unwrap();

        assert!(media.is_ready().await);
        assert!(!media.video_enabled());
        assert!(media.audio_enabled());
        assert_eq!(media.rtc_tracks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_media_is_reported_not_panicked() {
        let media = session(SyntheticMediaSource::unavailable());
        let err = media.initialize().await.unwrap_err();

        assert!(err.is_media_error());
        assert!(!media.is_ready().await);
    }

    #[tokio::test]
    async fn test_toggle_video_is_involution() {
        let media = session(SyntheticMediaSource::new());
        media.initialize().await.unwrap();

        let original = media.video_enabled();
        assert_eq!(media.toggle_video().await, !original);
        assert_eq!(media.toggle_video().await, original);
        assert_eq!(media.video_enabled(), original);
    }

    #[tokio::test]
    async fn test_toggle_without_track_is_noop() {
        let media = session(SyntheticMediaSource::without_video());
        media.initialize().await.unwrap();

        assert!(!media.toggle_video().await);
        assert!(!media.video_enabled());
        // Audio is unaffected by the failed video toggle.
        assert!(media.audio_enabled());
    }

    #[tokio::test]
    async fn test_toggle_before_initialize_is_noop() {
        let media = session(SyntheticMediaSource::new());
        assert!(!media.toggle_audio().await);
    }

    #[tokio::test]
    async fn test_release() {
        let media = session(SyntheticMediaSource::new());
        media.initialize().await.unwrap();
        media.release().await;

        assert!(!media.is_ready().await);
        assert!(!media.video_enabled());
        assert!(media.rtc_tracks().await.is_empty());
    }
}
