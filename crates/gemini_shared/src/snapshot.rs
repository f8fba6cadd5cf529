//! Entity snapshots - the state of one observed entity at one instant.
//!
//! Both ingress paths (the framed TCP stream and the publish/subscribe
//! bridge) speak in these terms. Wire names follow the upstream simulator
//! vocabulary: `type` is `"vehicle"` or `"walker"`, `model` is the
//! blueprint identifier.

use crate::math::{Rotation, Transform, Vec3};
use serde::{Deserialize, Serialize};

/// Stable identifier of an entity within one world run.
///
/// Ids are assigned by the source simulation and never reassigned to a
/// different actor without an explicit destroy first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two entity categories the pipeline mirrors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A vehicle. Carries velocity and optionally a color.
    #[serde(rename = "vehicle")]
    Vehicle,
    /// A pedestrian. Pose only, no velocity on the wire.
    #[serde(rename = "walker")]
    Pedestrian,
}

/// One observed entity at one instant.
///
/// Produced by the physical world each tick, consumed by the reconciler.
/// Vehicles carry `velocity` (and usually `color`); walkers omit both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Stable entity id, unique within a world run.
    pub id: EntityId,
    /// Entity category.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Blueprint/model identifier used to spawn the twin actor.
    #[serde(rename = "model")]
    pub archetype: String,
    /// Paint color attribute, vehicles only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// World-space position.
    pub location: Vec3,
    /// World-space orientation.
    pub rotation: Rotation,
    /// Velocity vector, vehicles only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec3>,
    /// Monotonic seconds from the source simulation clock.
    #[serde(default)]
    pub source_timestamp: f64,
}

impl EntitySnapshot {
    /// The pose carried by this snapshot.
    #[must_use]
    pub const fn transform(&self) -> Transform {
        Transform::new(self.location, self.rotation)
    }

    /// True when this snapshot describes a vehicle.
    #[must_use]
    pub fn is_vehicle(&self) -> bool {
        self.kind == EntityKind::Vehicle
    }
}
