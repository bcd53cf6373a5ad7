//! Configuration types for the watch-room core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a room session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSyncConfig {
    /// STUN server URLs for relay discovery. An empty list degrades
    /// connectivity (host candidates only) but is not a fatal error.
    pub stun_servers: Vec<String>,

    /// Delay applied before a bulk-initiation pass after roster or media
    /// readiness changes (default: 1000ms)
    pub initiation_debounce_ms: u64,

    /// Playback drift above this many seconds triggers a corrective seek
    /// (default: 2.0)
    pub drift_tolerance_secs: f64,

    /// While playing, local drift from the shared record above this many
    /// seconds publishes a corrective record (default: 5.0)
    pub resync_threshold_secs: f64,

    /// Maximum peers in the mesh (default: 10, max: 10)
    pub max_peers: u32,
}

impl Default for RoomSyncConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            initiation_debounce_ms: 1000,
            drift_tolerance_secs: 2.0,
            resync_threshold_secs: 5.0,
            max_peers: 10,
        }
    }
}

impl RoomSyncConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_peers` is not in range 1-10
    /// - `drift_tolerance_secs` is not positive
    /// - `resync_threshold_secs` is not greater than `drift_tolerance_secs`
    /// - `initiation_debounce_ms` exceeds 60000
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.max_peers == 0 || self.max_peers > 10 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-10, got {}",
                self.max_peers
            )));
        }

        if self.drift_tolerance_secs <= 0.0 || !self.drift_tolerance_secs.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "drift_tolerance_secs must be positive, got {}",
                self.drift_tolerance_secs
            )));
        }

        if self.resync_threshold_secs <= self.drift_tolerance_secs
            || !self.resync_threshold_secs.is_finite()
        {
            return Err(Error::InvalidConfig(format!(
                "resync_threshold_secs must exceed drift_tolerance_secs ({} <= {})",
                self.resync_threshold_secs, self.drift_tolerance_secs
            )));
        }

        if self.initiation_debounce_ms > 60_000 {
            return Err(Error::InvalidConfig(format!(
                "initiation_debounce_ms must be at most 60000, got {}",
                self.initiation_debounce_ms
            )));
        }

        Ok(())
    }

    /// The initiation debounce as a `Duration`
    pub fn initiation_debounce(&self) -> Duration {
        Duration::from_millis(self.initiation_debounce_ms)
    }

    /// Replace the STUN server list
    ///
    /// Useful for chaining on `Default::default()`.
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Set the bulk-initiation debounce in milliseconds
    pub fn with_initiation_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.initiation_debounce_ms = debounce_ms;
        self
    }

    /// Set the maximum number of mesh peers
    pub fn with_max_peers(mut self, max_peers: u32) -> Self {
        self.max_peers = max_peers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RoomSyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initiation_debounce(), Duration::from_millis(1000));
    }

    #[test]
    fn test_empty_stun_servers_is_allowed() {
        let config = RoomSyncConfig::default().with_stun_servers(Vec::new());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_peers_fails() {
        let mut config = RoomSyncConfig::default();
        config.max_peers = 0;
        assert!(config.validate().is_err());

        config.max_peers = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resync_must_exceed_drift_tolerance() {
        let mut config = RoomSyncConfig::default();
        config.resync_threshold_secs = config.drift_tolerance_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_drift_tolerance_fails() {
        let mut config = RoomSyncConfig::default();
        config.drift_tolerance_secs = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = RoomSyncConfig::default()
            .with_initiation_debounce_ms(50)
            .with_max_peers(4);
        assert!(config.validate().is_ok());
        assert_eq!(config.initiation_debounce_ms, 50);
        assert_eq!(config.max_peers, 4);
    }

    #[test]
    fn test_config_serialization() {
        let config = RoomSyncConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RoomSyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.stun_servers, deserialized.stun_servers);
        assert_eq!(config.max_peers, deserialized.max_peers);
    }
}
