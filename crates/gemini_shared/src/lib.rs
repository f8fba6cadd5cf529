//! # GEMINI Shared
//!
//! Common types used by both the physical-world producer and the twin-world
//! consumer.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER contain:
//! - socket or file I/O
//! - threads or locks
//! - anything engine-specific
//!
//! It is the wire vocabulary both worlds agree on, nothing more.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod frame;
pub mod math;
pub mod snapshot;

pub use constants::{
    COLLISION_WINDOW_SECS, DEFAULT_BRIDGE_ADDR, DEFAULT_PRODUCER_ADDR, DEFAULT_RELAY_DIAL_ADDR,
    DEFAULT_TOPIC_PREFIX, DEFAULT_TWIN_ADDR, MAX_RUNTIME_SECS, SESSION_TIMEOUT_SECS,
    SWEEP_PERIOD_SECS, TICK_INTERVAL,
};
pub use frame::{Command, ControlFrame, Frame, InitFrame};
pub use math::{Rotation, Transform, Vec3};
pub use snapshot::{EntityId, EntityKind, EntitySnapshot};
