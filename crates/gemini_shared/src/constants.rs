//! # Pipeline Constants
//!
//! Default configuration for the GEMINI synchronization pipeline.
//!
//! Every value here can be overridden through the TOML config; these are
//! the fallbacks both worlds agree on out of the box.

use std::time::Duration;

// =============================================================================
// NETWORK CONFIGURATION
// =============================================================================

/// Relay listen address for the physical-world producer connection
pub const DEFAULT_PRODUCER_ADDR: &str = "0.0.0.0:8999";

/// Relay address the producer dials
pub const DEFAULT_RELAY_DIAL_ADDR: &str = "127.0.0.1:8999";

/// Twin-world consumer address the relay forwards to
pub const DEFAULT_TWIN_ADDR: &str = "127.0.0.1:9999";

/// Bridge listen address for publish/subscribe producers
pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:5005";

/// Topic prefix for per-vehicle publications (`prefix/<car_id>`)
pub const DEFAULT_TOPIC_PREFIX: &str = "gemini/vehicles";

// =============================================================================
// TIMING
// =============================================================================

/// Fixed simulation step, 50 Hz - one Delta frame per tick
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Relay liveness bound: the pipeline shuts down after this many seconds
pub const MAX_RUNTIME_SECS: u64 = 600;

/// Collision debounce window in seconds.
///
/// Events for the same entity closer together than this are treated as a
/// continuation of one physical contact and not counted again.
pub const COLLISION_WINDOW_SECS: f64 = 5.0;

/// Bridge-path session timeout: a session not refreshed within this many
/// seconds is evicted by the sweeper
pub const SESSION_TIMEOUT_SECS: u64 = 10;

/// Sweeper period in seconds, independent of message arrival
pub const SWEEP_PERIOD_SECS: u64 = 1;
