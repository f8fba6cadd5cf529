//! # Kinematic World
//!
//! A deterministic in-memory implementation of [`WorldLink`].
//!
//! This is what the binaries and tests run against when no real engine is
//! attached: scripted straight-line motion with seeded drift, a spawn
//! capacity so slot-exhaustion paths are reachable, and a sensor registry
//! that forwards injected contact events into attached channels. It is a
//! stand-in driver, not a physics engine.

use crate::world::{ActorId, CollisionEvent, WorldError, WorldLink, WorldResult};
use crossbeam_channel::Sender;
use gemini_shared::{EntityId, EntityKind, EntitySnapshot, Rotation, Transform, Vec3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Instant;

/// Default spawn capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Fixed simulation step in seconds, 50 Hz.
const FIXED_STEP: f64 = 0.02;

/// Vehicle blueprints the scripted population cycles through.
const VEHICLE_BLUEPRINTS: &[&str] = &[
    "vehicle.lincoln.mkz",
    "vehicle.tesla.model3",
    "vehicle.nissan.patrol",
    "vehicle.audi.tt",
];

/// Walker blueprints the scripted population cycles through.
const WALKER_BLUEPRINTS: &[&str] = &["walker.pedestrian.0001", "walker.pedestrian.0002"];

/// One attached collision sensor.
struct SensorHook {
    /// Pipeline-level id events are reported for.
    entity: EntityId,
    /// Where callback context delivers events.
    events: Sender<CollisionEvent>,
}

/// One live actor.
struct KinematicActor {
    kind: EntityKind,
    archetype: String,
    color: Option<String>,
    transform: Transform,
    velocity: Vec3,
    /// Scripted actors integrate their own motion each tick; twin actors
    /// have this off and move only when told to.
    autopilot: bool,
}

/// Deterministic in-memory world.
pub struct KinematicWorld {
    capacity: usize,
    clock: f64,
    next_handle: u64,
    actors: HashMap<u64, KinematicActor>,
    /// Stable enumeration order: spawn order.
    order: Vec<u64>,
    sensors: HashMap<u64, SensorHook>,
    rng: StdRng,
}

impl KinematicWorld {
    /// Creates a world with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a world with an explicit spawn capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0.0,
            next_handle: 1,
            actors: HashMap::new(),
            order: Vec::new(),
            sensors: HashMap::new(),
            rng: StdRng::seed_from_u64(0x47454D49),
        }
    }

    /// Replaces the motion-script seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Spawns a scripted population of self-driving vehicles and walkers.
    ///
    /// Returns how many actors were actually placed (capacity may cut the
    /// request short).
    pub fn populate(&mut self, vehicles: usize, walkers: usize) -> usize {
        let mut placed = 0;

        for i in 0..vehicles {
            let archetype = VEHICLE_BLUEPRINTS[i % VEHICLE_BLUEPRINTS.len()];
            let color = format!(
                "{},{},{}",
                self.rng.gen_range(0..=255u16),
                self.rng.gen_range(0..=255u16),
                self.rng.gen_range(0..=255u16)
            );
            let lane = (i % 8) as f64;
            let transform = Transform::new(
                Vec3::new(-200.0 + 12.0 * (i / 8) as f64, 4.0 * lane, 0.2),
                Rotation::new(0.0, 0.0, 0.0),
            );
            let Ok(actor) = self.spawn_actor(archetype, Some(&color), transform) else {
                break;
            };
            let speed = self.rng.gen_range(5.0..15.0);
            let drift = self.rng.gen_range(-0.5..0.5);
            self.set_velocity(actor, Vec3::new(speed, drift, 0.0)).ok();
            self.set_autopilot(actor, true).ok();
            placed += 1;
        }

        for i in 0..walkers {
            let archetype = WALKER_BLUEPRINTS[i % WALKER_BLUEPRINTS.len()];
            let transform = Transform::new(
                Vec3::new(-180.0 + 6.0 * i as f64, -10.0, 0.0),
                Rotation::new(0.0, 90.0, 0.0),
            );
            let Ok(actor) = self.spawn_actor(archetype, None, transform) else {
                break;
            };
            let pace = self.rng.gen_range(0.8..1.6);
            self.set_velocity(actor, Vec3::new(0.0, pace, 0.0)).ok();
            self.set_autopilot(actor, true).ok();
            placed += 1;
        }

        placed
    }

    /// Fires the collision sensor attached to an actor, as the engine
    /// would from callback context. Returns false when no sensor is
    /// attached.
    pub fn inject_collision(&mut self, actor: ActorId) -> bool {
        let Some(hook) = self.sensors.get(&actor.0) else {
            return false;
        };
        let event = CollisionEvent { entity: hook.entity, at: Instant::now() };
        if hook.events.try_send(event).is_err() {
            tracing::warn!(entity = %hook.entity, "collision event channel rejected event");
        }
        true
    }

    /// Number of live actors.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Number of attached collision sensors.
    #[must_use]
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Reads an actor's autopilot flag, `None` for a dead handle.
    #[must_use]
    pub fn actor_autopilot(&self, actor: ActorId) -> Option<bool> {
        self.actors.get(&actor.0).map(|a| a.autopilot)
    }

    fn actor_mut(&mut self, actor: ActorId) -> WorldResult<&mut KinematicActor> {
        self.actors.get_mut(&actor.0).ok_or(WorldError::UnknownActor(actor))
    }
}

impl Default for KinematicWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldLink for KinematicWorld {
    fn spawn_actor(
        &mut self,
        archetype: &str,
        color: Option<&str>,
        transform: Transform,
    ) -> WorldResult<ActorId> {
        let kind = if archetype.starts_with("vehicle.") {
            EntityKind::Vehicle
        } else if archetype.starts_with("walker.") {
            EntityKind::Pedestrian
        } else {
            return Err(WorldError::UnknownArchetype(archetype.to_string()));
        };
        if self.actors.len() >= self.capacity {
            return Err(WorldError::SpawnSlotExhausted(archetype.to_string()));
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        self.actors.insert(
            handle,
            KinematicActor {
                kind,
                archetype: archetype.to_string(),
                color: color.map(str::to_string),
                transform,
                velocity: Vec3::ZERO,
                autopilot: false,
            },
        );
        self.order.push(handle);
        Ok(ActorId(handle))
    }

    fn destroy_actor(&mut self, actor: ActorId) -> WorldResult<()> {
        if self.actors.remove(&actor.0).is_none() {
            return Err(WorldError::UnknownActor(actor));
        }
        self.order.retain(|h| *h != actor.0);
        self.sensors.remove(&actor.0);
        Ok(())
    }

    fn set_transform(&mut self, actor: ActorId, transform: Transform) -> WorldResult<()> {
        self.actor_mut(actor)?.transform = transform;
        Ok(())
    }

    fn set_velocity(&mut self, actor: ActorId, velocity: Vec3) -> WorldResult<()> {
        self.actor_mut(actor)?.velocity = velocity;
        Ok(())
    }

    fn set_autopilot(&mut self, actor: ActorId, enabled: bool) -> WorldResult<()> {
        self.actor_mut(actor)?.autopilot = enabled;
        Ok(())
    }

    fn attach_collision_sensor(
        &mut self,
        actor: ActorId,
        entity: EntityId,
        events: Sender<CollisionEvent>,
    ) -> WorldResult<()> {
        if !self.actors.contains_key(&actor.0) {
            return Err(WorldError::UnknownActor(actor));
        }
        self.sensors.insert(actor.0, SensorHook { entity, events });
        Ok(())
    }

    fn tick(&mut self) {
        self.clock += FIXED_STEP;

        // Scripted motion: straight-line integration with a rare seeded
        // steering nudge so runs are not perfectly straight.
        let mut nudges: Vec<(u64, f64)> = Vec::new();
        for handle in &self.order {
            if self.actors.get(handle).is_some_and(|a| a.autopilot) && self.rng.gen::<f64>() < 0.02
            {
                nudges.push((*handle, self.rng.gen_range(-3.0..3.0)));
            }
        }
        for (handle, yaw_delta) in nudges {
            if let Some(actor) = self.actors.get_mut(&handle) {
                actor.transform.rotation.yaw += yaw_delta;
            }
        }
        for actor in self.actors.values_mut() {
            if actor.autopilot {
                actor.transform.location = actor.transform.location + actor.velocity * FIXED_STEP;
            }
        }
    }

    fn elapsed_seconds(&self) -> f64 {
        self.clock
    }

    fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.order
            .iter()
            .filter_map(|handle| {
                let actor = self.actors.get(handle)?;
                Some(EntitySnapshot {
                    id: EntityId(*handle),
                    kind: actor.kind,
                    archetype: actor.archetype.clone(),
                    color: actor.color.clone(),
                    location: actor.transform.location,
                    rotation: actor.transform.rotation,
                    velocity: (actor.kind == EntityKind::Vehicle).then_some(actor.velocity),
                    source_timestamp: self.clock,
                })
            })
            .collect()
    }

    fn actor_transform(&self, actor: ActorId) -> Option<Transform> {
        self.actors.get(&actor.0).map(|a| a.transform)
    }
}
