//! # World Seam
//!
//! The simulation engine is an external collaborator. This module defines
//! the trait it must implement — the full capability set the pipeline
//! needs, and nothing else.
//!
//! ```text
//! gemini_sync defines:    engine side implements:
//! ┌─────────────────┐     ┌─────────────────┐
//! │ trait WorldLink │ ←── │ impl WorldLink  │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! Sensor callbacks never mutate pipeline state directly: a sensor gets a
//! channel sender at attach time and the consumer loop that owns the
//! registry drains the channel.

use crossbeam_channel::Sender;
use gemini_shared::{EntityId, EntitySnapshot, Transform, Vec3};
use std::time::Instant;
use thiserror::Error;

/// Handle to an actor owned by a world instance.
///
/// Handles are world-scoped: a handle from one world means nothing to
/// another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One collision sensor firing, delivered from callback context.
#[derive(Clone, Copy, Debug)]
pub struct CollisionEvent {
    /// The entity whose sensor fired.
    pub entity: EntityId,
    /// When the contact was observed, twin-side clock.
    pub at: Instant,
}

/// Errors the engine can report back through the seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// No blueprint matches the requested archetype.
    #[error("no blueprint named {0}")]
    UnknownArchetype(String),

    /// The world has no free spawn slot for this actor.
    #[error("no free spawn slot for {0}")]
    SpawnSlotExhausted(String),

    /// The handle does not name a live actor in this world.
    #[error("no actor with handle {0}")]
    UnknownActor(ActorId),
}

/// Result type for engine-seam operations.
pub type WorldResult<T> = Result<T, WorldError>;

/// The engine capability set.
///
/// Everything the pipeline ever asks of a simulation: spawn an actor from
/// a blueprint, destroy it, move it, drive it, advance the clock, sample
/// the roster, and wire up collision sensors.
pub trait WorldLink: Send {
    /// Spawns an actor from a blueprint, at a pose. Fails when the
    /// archetype is unknown or no spawn slot is free.
    fn spawn_actor(
        &mut self,
        archetype: &str,
        color: Option<&str>,
        transform: Transform,
    ) -> WorldResult<ActorId>;

    /// Destroys an actor and its attached sensors.
    fn destroy_actor(&mut self, actor: ActorId) -> WorldResult<()>;

    /// Sets an actor's pose.
    fn set_transform(&mut self, actor: ActorId, transform: Transform) -> WorldResult<()>;

    /// Sets an actor's velocity.
    fn set_velocity(&mut self, actor: ActorId, velocity: Vec3) -> WorldResult<()>;

    /// Enables or disables self-driving control for an actor.
    ///
    /// Twin actors are driven by incoming state, never by local
    /// decision-making, so the reconciler disables this on every vehicle
    /// it creates.
    fn set_autopilot(&mut self, actor: ActorId, enabled: bool) -> WorldResult<()>;

    /// Attaches a collision sensor to an actor.
    ///
    /// Events are reported for `entity` (the pipeline-level id, not the
    /// actor handle) and delivered through `events` from callback context.
    fn attach_collision_sensor(
        &mut self,
        actor: ActorId,
        entity: EntityId,
        events: Sender<CollisionEvent>,
    ) -> WorldResult<()>;

    /// Advances the simulation by one fixed step.
    fn tick(&mut self);

    /// Monotonic seconds elapsed on this world's simulation clock.
    fn elapsed_seconds(&self) -> f64;

    /// Enumerates all live actors as entity snapshots, stamped with the
    /// current simulation clock.
    fn snapshots(&self) -> Vec<EntitySnapshot>;

    /// Reads an actor's current pose, `None` for a dead handle.
    fn actor_transform(&self, actor: ActorId) -> Option<Transform>;
}
