//! # GEMINI Sync - The Twin-World Pipeline
//!
//! Mirrors the dynamic state of a moving-object simulation into a second,
//! independently running simulation, so the twin continuously reflects
//! vehicle and pedestrian positions, velocities, and collision events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ StateSource  │─────▶│    Relay     │─────▶│  Reconciler  │
//! │ (physical)   │ TCP  │ (scheduler)  │ TCP  │   (twin)     │
//! └──────────────┘      └──────────────┘      └──────────────┘
//!                                                  │
//!                                      CollisionTracker + sinks
//!
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │  producers   │─────▶│ PubSubBridge │─────▶│ SessionReg.  │
//! │ (many, JSON) │ TCP  │  + Broker    │topics│  + Sweeper   │
//! └──────────────┘      └──────────────┘      └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Per-connection FIFO: the relay never reorders or duplicates frames
//! - Init before delta, enforced by an explicit gate
//! - One lock domain per world registry; sockets are single-writer
//! - Cooperative shutdown through shared flags; teardown joins every
//!   thread it spawned
//!
//! ## Example
//!
//! ```rust,ignore
//! use gemini_sync::{Relay, RelayConfig};
//!
//! let relay = Relay::bind(RelayConfig::default())?;
//! relay.run()?; // Blocks until the pipeline tears down
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bridge;
pub mod collision;
pub mod config;
pub mod error;
pub mod framing;
pub mod kinematic;
pub mod reconciler;
pub mod relay;
pub mod sink;
pub mod source;
pub mod sweeper;
pub mod world;

// Re-exports for convenience
pub use bridge::{classify, Broker, BridgeConfig, PubSubBridge, SessionAction, SessionRegistry};
pub use collision::{CollisionState, CollisionTracker};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use kinematic::KinematicWorld;
pub use reconciler::{Applied, Reconciler};
pub use relay::{Relay, RelayConfig, RelayStats};
pub use sink::{write_collision_summary, PoseLog};
pub use source::{SourceConfig, StateSource};
pub use sweeper::LifecycleSweeper;
pub use world::{ActorId, CollisionEvent, WorldError, WorldLink, WorldResult};
