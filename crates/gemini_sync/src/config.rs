//! # Configuration
//!
//! One TOML file, loaded once at startup. Every field has a default, so
//! an empty file (or no file at all) yields a working local setup.
//!
//! ```toml
//! producer_listen = "0.0.0.0:8999"
//! twin_addr = "127.0.0.1:9999"
//! max_runtime_secs = 600
//! drop_probability = 0.1
//! ```

use crate::bridge::BridgeConfig;
use crate::error::{SyncError, SyncResult};
use crate::relay::RelayConfig;
use gemini_shared::{
    COLLISION_WINDOW_SECS, DEFAULT_BRIDGE_ADDR, DEFAULT_PRODUCER_ADDR, DEFAULT_RELAY_DIAL_ADDR,
    DEFAULT_TOPIC_PREFIX, DEFAULT_TWIN_ADDR, MAX_RUNTIME_SECS, SESSION_TIMEOUT_SECS,
    SWEEP_PERIOD_SECS, TICK_INTERVAL,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Address the relay listens on for the producer.
    pub producer_listen: String,
    /// Relay address the producer dials.
    pub relay_addr: String,
    /// Address the twin world listens on.
    pub twin_listen: String,
    /// Twin address the relay forwards to.
    pub twin_addr: String,
    /// Address the bridge listens on.
    pub bridge_listen: String,
    /// Topic prefix for bridge publications.
    pub topic_prefix: String,
    /// Producer sampling cadence, milliseconds.
    pub tick_interval_ms: u64,
    /// Relay liveness bound, seconds.
    pub max_runtime_secs: u64,
    /// Collision debounce window, seconds.
    pub collision_window_secs: f64,
    /// Bridge session idle timeout, seconds.
    pub session_timeout_secs: u64,
    /// Sweeper period, seconds.
    pub sweep_period_secs: u64,
    /// Bridge injected-loss probability for records without an archetype.
    pub drop_probability: f64,
    /// Bridge injected delay before each publish, milliseconds.
    pub injected_delay_ms: u64,
    /// Physical-world pose log path; empty disables the sink.
    pub physical_pose_log: String,
    /// Twin-world pose log path; empty disables the sink.
    pub twin_pose_log: String,
    /// Collision summary path; empty disables the sink.
    pub collision_summary: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            producer_listen: DEFAULT_PRODUCER_ADDR.to_string(),
            relay_addr: DEFAULT_RELAY_DIAL_ADDR.to_string(),
            twin_listen: "0.0.0.0:9999".to_string(),
            twin_addr: DEFAULT_TWIN_ADDR.to_string(),
            bridge_listen: DEFAULT_BRIDGE_ADDR.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            tick_interval_ms: TICK_INTERVAL.as_millis() as u64,
            max_runtime_secs: MAX_RUNTIME_SECS,
            collision_window_secs: COLLISION_WINDOW_SECS,
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            sweep_period_secs: SWEEP_PERIOD_SECS,
            drop_probability: 0.0,
            injected_delay_ms: 0,
            physical_pose_log: "physical_vehicle_log.csv".to_string(),
            twin_pose_log: "twin_vehicle_log.csv".to_string(),
            collision_summary: "collision_summary.csv".to_string(),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> SyncResult<Self> {
        toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Producer sampling cadence.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Relay liveness bound.
    #[must_use]
    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_secs)
    }

    /// Collision debounce window.
    #[must_use]
    pub fn collision_window(&self) -> Duration {
        Duration::from_secs_f64(self.collision_window_secs)
    }

    /// Bridge session idle timeout.
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Sweeper period.
    #[must_use]
    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_period_secs)
    }

    /// Bridge injected delay.
    #[must_use]
    pub fn injected_delay(&self) -> Duration {
        Duration::from_millis(self.injected_delay_ms)
    }

    /// The relay view of this configuration.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            listen_addr: self.producer_listen.clone(),
            forward_addr: self.twin_addr.clone(),
            max_runtime: self.max_runtime(),
        }
    }

    /// The bridge view of this configuration.
    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            listen_addr: self.bridge_listen.clone(),
            topic_prefix: self.topic_prefix.clone(),
            drop_probability: self.drop_probability,
            injected_delay: self.injected_delay(),
            ..BridgeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = SyncConfig::from_toml("").unwrap();
        assert_eq!(config.producer_listen, DEFAULT_PRODUCER_ADDR);
        assert_eq!(config.max_runtime(), Duration::from_secs(MAX_RUNTIME_SECS));
        assert_eq!(config.collision_window(), Duration::from_secs(5));
        assert_eq!(config.drop_probability, 0.0);
    }

    #[test]
    fn test_partial_override() {
        let config = SyncConfig::from_toml(
            r#"
            twin_addr = "10.0.0.2:9999"
            drop_probability = 0.25
            injected_delay_ms = 150
            "#,
        )
        .unwrap();

        assert_eq!(config.twin_addr, "10.0.0.2:9999");
        assert_eq!(config.bridge_config().drop_probability, 0.25);
        assert_eq!(config.injected_delay(), Duration::from_millis(150));
        // Untouched fields keep defaults.
        assert_eq!(config.topic_prefix, DEFAULT_TOPIC_PREFIX);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let result = SyncConfig::from_toml("max_runtime_secs = \"not a number\"");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_relay_view() {
        let config = SyncConfig::default();
        let relay = config.relay_config();
        assert_eq!(relay.listen_addr, config.producer_listen);
        assert_eq!(relay.forward_addr, config.twin_addr);
    }
}
