//! Error types for the watch-room core

/// Result type alias using the syncroom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in room, signaling, and peer operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No usable capture device, or permission denied after all fallbacks
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// A signal arrived for a session not in the expected negotiation state.
    /// An expected artifact of races between peers; dropped, never surfaced
    /// to callers.
    #[error("Negotiation rejected: {0}")]
    NegotiationRejected(String),

    /// Terminal transport state; observed via connection-state events only
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// The shared store is unreachable or returned undecodable data
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Peer not found in the active session set
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is an expected race artifact that the
    /// orchestrator drops rather than surfaces
    pub fn is_negotiation_artifact(&self) -> bool {
        matches!(self, Error::NegotiationRejected(_))
    }

    /// Check if this error is a media acquisition failure (degradable,
    /// never fatal to the room session)
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::MediaUnavailable(_) | Error::MediaTrackError(_))
    }

    /// Check if this error is a fatal dependency failure
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");
    }

    #[test]
    fn test_error_is_negotiation_artifact() {
        assert!(Error::NegotiationRejected("stale answer".to_string()).is_negotiation_artifact());
        assert!(!Error::SdpError("test".to_string()).is_negotiation_artifact());
    }

    #[test]
    fn test_error_is_media_error() {
        assert!(Error::MediaUnavailable("no devices".to_string()).is_media_error());
        assert!(!Error::StoreUnavailable("test".to_string()).is_media_error());
    }

    #[test]
    fn test_error_is_store_error() {
        assert!(Error::StoreUnavailable("offline".to_string()).is_store_error());
        assert!(!Error::PeerNotFound("peer-1".to_string()).is_store_error());
    }
}
