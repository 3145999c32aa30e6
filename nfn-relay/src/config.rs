use std::time::Duration;

use nfn_core::Suite;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Relay parameters, fixed for the lifetime of a [`crate::Relay`].
///
/// Aging thresholds are counted in sweeper ticks of `tick_interval_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Suite used for names the relay creates itself
    pub suite: Suite,
    /// Content store bound. `None` is unlimited, `Some(0)` disables caching.
    pub max_cache_entries: Option<usize>,
    /// Packets a face may hold before further sends are dropped
    pub face_queue_capacity: usize,
    /// Minimum gap between packets leaving one face, in microseconds
    pub inter_interest_interval_us: u64,
    /// Minimum gap between packets leaving one interface, in microseconds
    pub inter_packet_interval_us: u64,
    /// Wall time of one sweeper tick, in milliseconds
    pub tick_interval_ms: u64,
    /// Ticks without activity before a PIT entry is dropped
    pub interest_timeout_ticks: u64,
    /// Retransmissions attempted before a PIT entry is dropped
    pub max_interest_retransmit: u32,
    /// Ticks without activity before non-static content is dropped
    pub content_timeout_ticks: u64,
    /// Ticks without activity before a non-static face is removed
    pub face_timeout_ticks: u64,
    /// Ticks a nonce is remembered
    pub nonce_timeout_ticks: u64,
    /// Nonces remembered at most
    pub max_nonces: usize,
    /// Machine transitions allowed per computation
    pub step_limit: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            suite: Suite::NdnTlv,
            max_cache_entries: None,
            face_queue_capacity: 64,
            inter_interest_interval_us: 0,
            inter_packet_interval_us: 0,
            tick_interval_ms: 1000,
            interest_timeout_ticks: 4,
            max_interest_retransmit: 2,
            content_timeout_ticks: 300,
            face_timeout_ticks: 30,
            nonce_timeout_ticks: 60,
            max_nonces: 256,
            step_limit: 100_000,
        }
    }
}

impl RelayConfig {
    pub fn inter_interest_interval(&self) -> Duration {
        Duration::from_micros(self.inter_interest_interval_us)
    }

    pub fn inter_packet_interval(&self) -> Duration {
        Duration::from_micros(self.inter_packet_interval_us)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn caching_enabled(&self) -> bool {
        self.max_cache_entries != Some(0)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.face_queue_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "face_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(RelayError::InvalidConfig(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.interest_timeout_ticks == 0 {
            return Err(RelayError::InvalidConfig(
                "interest_timeout_ticks must be at least 1".to_string(),
            ));
        }
        if self.max_nonces == 0 {
            return Err(RelayError::InvalidConfig("max_nonces must be at least 1".to_string()));
        }
        if self.step_limit == 0 {
            return Err(RelayError::InvalidConfig("step_limit must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.caching_enabled());
        assert_eq!(config.inter_packet_interval(), Duration::ZERO);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_cache_disables_caching() {
        let config = RelayConfig {
            max_cache_entries: Some(0),
            ..Default::default()
        };
        assert!(!config.caching_enabled());
    }

    #[test]
    fn test_validation() {
        let config = RelayConfig {
            face_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::InvalidConfig(_))));
    }
}
