//! Synthetic capture source
//!
//! Produces silent Opus audio and black VP8 video tracks. Used by headless
//! room participants and throughout the test suite; also handy for
//! simulating capture failure modes.

use super::{CaptureFailure, CaptureStream, LocalTrack, MediaConstraints, MediaSource, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Synthetic capture device with controllable failure modes
pub struct SyntheticMediaSource {
    video_available: bool,
    audio_available: bool,
    permission_granted: bool,
}

impl SyntheticMediaSource {
    /// A device with both camera and microphone
    pub fn new() -> Self {
        Self {
            video_available: true,
            audio_available: true,
            permission_granted: true,
        }
    }

    /// A device with a microphone but no camera
    pub fn without_video() -> Self {
        Self {
            video_available: false,
            audio_available: true,
            permission_granted: true,
        }
    }

    /// A device the user refuses access to
    pub fn unavailable() -> Self {
        Self {
            video_available: false,
            audio_available: false,
            permission_granted: false,
        }
    }
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

fn audio_track(stream_id: &str) -> LocalTrack {
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        format!("audio-{}", uuid::Uuid::new_v4()),
        stream_id.to_string(),
    ));
    LocalTrack::new(TrackKind::Audio, track)
}

fn video_track(stream_id: &str) -> LocalTrack {
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        format!("video-{}", uuid::Uuid::new_v4()),
        stream_id.to_string(),
    ));
    LocalTrack::new(TrackKind::Video, track)
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> std::result::Result<CaptureStream, CaptureFailure> {
        if !self.permission_granted {
            return Err(CaptureFailure::PermissionDenied);
        }
        if constraints.video && !self.video_available {
            return Err(CaptureFailure::DeviceUnavailable);
        }
        if constraints.audio && !self.audio_available {
            return Err(CaptureFailure::DeviceUnavailable);
        }
        if !constraints.audio && !constraints.video {
            return Err(CaptureFailure::DeviceUnavailable);
        }

        let stream_id = format!("capture-{}", uuid::Uuid::new_v4());
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(audio_track(&stream_id));
        }
        if constraints.video {
            tracks.push(video_track(&stream_id));
        }
        Ok(CaptureStream::new(tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquires_requested_kinds() {
        let source = SyntheticMediaSource::new();
        let stream = source
            .acquire(MediaConstraints {
                video: true,
                audio: true,
            })
            .await
            .unwrap();

        assert!(stream.has_track(TrackKind::Audio));
        assert!(stream.has_track(TrackKind::Video));
        assert_eq!(stream.tracks().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_camera_fails_combined_capture() {
        let source = SyntheticMediaSource::without_video();
        let err = source
            .acquire(MediaConstraints {
                video: true,
                audio: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err, CaptureFailure::DeviceUnavailable);

        let stream = source
            .acquire(MediaConstraints {
                video: false,
                audio: true,
            })
            .await
            .unwrap();
        assert!(!stream.has_track(TrackKind::Video));
        assert!(stream.has_track(TrackKind::Audio));
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let source = SyntheticMediaSource::unavailable();
        let err = source
            .acquire(MediaConstraints {
                video: false,
                audio: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err, CaptureFailure::PermissionDenied);
    }

    #[tokio::test]
    async fn test_tracks_start_enabled() {
        let source = SyntheticMediaSource::new();
        let stream = source
            .acquire(MediaConstraints {
                video: true,
                audio: true,
            })
            .await
            .unwrap();

        for track in stream.tracks() {
            assert!(track.is_enabled());
        }
    }
}
