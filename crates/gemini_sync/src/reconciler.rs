//! # Reconciler
//!
//! Turns the incoming snapshot stream into actor-lifecycle decisions on
//! the twin world.
//!
//! ## State machine, per entity id
//!
//! ```text
//! ABSENT ──first snapshot──▶ ACTIVE ──explicit destroy──▶ ABSENT
//!            (spawn actor)     │ ▲
//!                              └─┘ every later snapshot: set transform,
//!                                  set velocity for vehicles
//! ```
//!
//! Creation failure leaves the id ABSENT with a log line; the next
//! snapshot for the same id is the retry. Nothing else removes an entry:
//! the primary path has no per-entity timeout, so a silent entity freezes
//! in its last observed pose until shutdown.
//!
//! The registry lives in this one instance and is mutated only by the
//! serve loop; collision sensors feed a bounded channel drained here.

use crate::collision::CollisionTracker;
use crate::error::{SyncError, SyncResult};
use crate::framing;
use crate::sink::PoseLog;
use crate::world::{ActorId, CollisionEvent, WorldLink};
use crossbeam_channel::{bounded, Receiver, Sender};
use gemini_shared::{Command, EntityId, EntityKind, EntitySnapshot, Frame, InitFrame};
use std::collections::HashMap;
use std::io::BufReader;
use std::net::TcpListener;
use std::time::Duration;

/// Capacity of the sensor-callback funnel.
const COLLISION_CHANNEL_CAPACITY: usize = 1024;

/// What a frame application decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Keep consuming frames.
    Continue,
    /// An in-band shutdown command arrived; stop consuming.
    Shutdown,
}

/// One registry entry: the owned twin actor for an entity id.
#[derive(Clone, Copy, Debug)]
struct ActorEntry {
    actor: ActorId,
    kind: EntityKind,
}

/// The twin-world consumer.
pub struct Reconciler<W: WorldLink> {
    world: W,
    /// `id → owned actor handle`. Created on first sighting, removed only
    /// by explicit destroy.
    actors: HashMap<EntityId, ActorEntry>,
    tracker: CollisionTracker,
    collision_tx: Sender<CollisionEvent>,
    collision_rx: Receiver<CollisionEvent>,
    pose_log: Option<PoseLog>,
    /// Source clock of the most recent applied delta, used to stamp pose
    /// log rows with the producer's timeline.
    last_source_ts: Option<f64>,
    initialized: bool,
}

impl<W: WorldLink> Reconciler<W> {
    /// Creates a reconciler owning the given twin world.
    #[must_use]
    pub fn new(world: W, collision_window: Duration) -> Self {
        let (collision_tx, collision_rx) = bounded(COLLISION_CHANNEL_CAPACITY);
        Self {
            world,
            actors: HashMap::new(),
            tracker: CollisionTracker::new(collision_window),
            collision_tx,
            collision_rx,
            pose_log: None,
            last_source_ts: None,
            initialized: false,
        }
    }

    /// Attaches a pose log sink.
    #[must_use]
    pub fn with_pose_log(mut self, log: PoseLog) -> Self {
        self.pose_log = Some(log);
        self
    }

    /// Serves one producer connection to completion.
    ///
    /// Accepts exactly one connection, then consumes frames until the
    /// stream ends, an in-band shutdown arrives, or the stream fails.
    /// Malformed payloads are dropped with a warning; the connection
    /// continues.
    pub fn serve(&mut self, listener: &TcpListener) -> SyncResult<()> {
        let (stream, peer) = listener.accept()?;
        tracing::info!(%peer, "producer connected");
        let mut reader = BufReader::new(stream);

        loop {
            match framing::recv_frame(&mut reader) {
                Ok(Some(frame)) => {
                    let applied = self.apply(frame);
                    self.drain_collisions();
                    self.world.tick();
                    self.log_poses();
                    if applied == Applied::Shutdown {
                        tracing::info!(%peer, "shutdown command received");
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!(%peer, "producer stream ended");
                    break;
                }
                Err(SyncError::Malformed(e)) => {
                    tracing::warn!(%peer, error = %e, "malformed payload dropped");
                }
                Err(e) => {
                    tracing::error!(%peer, error = %e, "stream failure");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Applies one decoded frame.
    pub fn apply(&mut self, frame: Frame) -> Applied {
        match frame {
            Frame::Init(init) => {
                self.apply_init(init);
                Applied::Continue
            }
            Frame::Delta(snapshots) => {
                self.apply_delta(&snapshots);
                Applied::Continue
            }
            Frame::Control(control) => match control.cmd {
                Command::Shutdown => Applied::Shutdown,
            },
        }
    }

    fn apply_init(&mut self, init: InitFrame) {
        if self.initialized {
            tracing::warn!("duplicate init frame; applying as update");
        }
        for snapshot in &init.vehicles {
            self.apply_snapshot(snapshot);
        }
        self.initialized = true;
        tracing::info!(entities = init.vehicles.len(), mapped = self.actors.len(), "roster initialized");
    }

    fn apply_delta(&mut self, snapshots: &[EntitySnapshot]) {
        if let Some(first) = snapshots.first() {
            self.last_source_ts = Some(first.source_timestamp);
        }
        for snapshot in snapshots {
            self.apply_snapshot(snapshot);
        }
    }

    /// One snapshot through the state machine: update when ACTIVE, create
    /// when ABSENT.
    fn apply_snapshot(&mut self, snapshot: &EntitySnapshot) {
        match self.actors.get(&snapshot.id) {
            Some(entry) => {
                let entry = *entry;
                if let Err(e) = self.world.set_transform(entry.actor, snapshot.transform()) {
                    tracing::warn!(entity = %snapshot.id, error = %e, "transform update failed");
                }
                if entry.kind == EntityKind::Vehicle {
                    if let Some(velocity) = snapshot.velocity {
                        if let Err(e) = self.world.set_velocity(entry.actor, velocity) {
                            tracing::warn!(entity = %snapshot.id, error = %e, "velocity update failed");
                        }
                    }
                }
            }
            None => self.create_actor(snapshot),
        }
    }

    /// ABSENT → ACTIVE. On failure the id stays ABSENT and the next
    /// snapshot for it is the natural retry.
    fn create_actor(&mut self, snapshot: &EntitySnapshot) {
        let actor = match self.world.spawn_actor(
            &snapshot.archetype,
            snapshot.color.as_deref(),
            snapshot.transform(),
        ) {
            Ok(actor) => actor,
            Err(e) => {
                tracing::warn!(
                    entity = %snapshot.id,
                    archetype = %snapshot.archetype,
                    error = %e,
                    "actor creation failed, entity stays absent"
                );
                return;
            }
        };

        if snapshot.is_vehicle() {
            // The twin is driven by incoming state, not local control.
            if let Err(e) = self.world.set_autopilot(actor, false) {
                tracing::warn!(entity = %snapshot.id, error = %e, "autopilot disable failed");
            }
            if let Err(e) =
                self.world
                    .attach_collision_sensor(actor, snapshot.id, self.collision_tx.clone())
            {
                tracing::warn!(entity = %snapshot.id, error = %e, "collision sensor attach failed");
            }
        }

        self.actors.insert(snapshot.id, ActorEntry { actor, kind: snapshot.kind });
        tracing::info!(
            entity = %snapshot.id,
            actor = %actor,
            archetype = %snapshot.archetype,
            "twin actor created"
        );
    }

    /// Drains pending sensor events into the tracker. The serve loop is
    /// the only caller, keeping all tracker mutation on one thread.
    pub fn drain_collisions(&mut self) {
        while let Ok(event) = self.collision_rx.try_recv() {
            self.tracker.observe(event.entity, event.at);
        }
    }

    fn log_poses(&mut self) {
        let Some(log) = self.pose_log.as_mut() else {
            return;
        };
        let timestamp = self.last_source_ts.unwrap_or_else(|| self.world.elapsed_seconds());
        let mut rows: Vec<(EntityId, ActorId)> = self
            .actors
            .iter()
            .filter(|(_, entry)| entry.kind == EntityKind::Vehicle)
            .map(|(id, entry)| (*id, entry.actor))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        for (id, actor) in rows {
            if let Some(transform) = self.world.actor_transform(actor) {
                log.record(timestamp, id, transform.location);
            }
        }
        log.flush();
    }

    /// Destroys every mapped actor. The only bulk ACTIVE → ABSENT
    /// transition, used at global shutdown.
    pub fn shutdown(&mut self) {
        let count = self.actors.len();
        for (id, entry) in self.actors.drain() {
            if let Err(e) = self.world.destroy_actor(entry.actor) {
                tracing::warn!(entity = %id, error = %e, "destroy failed during shutdown");
            }
        }
        tracing::info!(destroyed = count, "twin world torn down");
    }

    /// Number of mapped entities.
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// The owned actor handle for an entity, if ACTIVE.
    #[must_use]
    pub fn actor_for(&self, id: EntityId) -> Option<ActorId> {
        self.actors.get(&id).map(|entry| entry.actor)
    }

    /// Per-entity collision counts, ordered by id.
    #[must_use]
    pub fn collision_summary(&self) -> Vec<(EntityId, u64)> {
        self.tracker.summary()
    }

    /// The twin world, for engine-side inspection.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }
}
