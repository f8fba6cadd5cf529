//! # Bridge Sessions
//!
//! The subscriber side of the publish/subscribe ingress: per-vehicle
//! topics feed a session registry that spawns, updates, and — through the
//! sweeper — evicts twin actors.
//!
//! A publication is classified ONCE at this boundary into a tagged
//! [`SessionAction`]: `Create` when the record carries an archetype,
//! `Update` when it does not. Nothing downstream re-inspects raw fields.
//!
//! The registry and the world it drives live under one mutex: the message
//! loop and the periodic sweep are two threads sharing that single lock
//! domain.

use crate::bridge::broker::Publication;
use crate::error::SyncResult;
use crate::sweeper::LifecycleSweeper;
use crate::world::{ActorId, WorldLink};
use gemini_shared::{Rotation, Transform, Vec3};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// What a publication asks the twin world to do. Decided at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionAction {
    /// First sighting: spawn an actor from this blueprint.
    Create {
        /// Blueprint identifier.
        archetype: String,
        /// Paint color attribute, if any.
        color: Option<String>,
        /// Initial pose.
        transform: Transform,
        /// Initial velocity, if the record carried one.
        velocity: Option<Vec3>,
    },
    /// Later sighting: move the existing actor.
    Update {
        /// New pose.
        transform: Transform,
        /// New velocity, if the record carried one.
        velocity: Option<Vec3>,
    },
}

/// One classified publication.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionUpdate {
    /// Vehicle identifier, from the topic's last segment.
    pub car_id: String,
    /// The decided action.
    pub action: SessionAction,
}

/// Wire shape of one bridge record.
#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    color: Option<String>,
    location: Vec3,
    rotation: Rotation,
    #[serde(default)]
    velocity: Option<Vec3>,
}

/// Classifies one publication into a tagged action.
///
/// The car id comes from the topic's last segment; the create/update
/// decision is the presence of the archetype field, made here and nowhere
/// else.
pub fn classify(publication: &Publication) -> SyncResult<SessionUpdate> {
    let record: RawRecord = serde_json::from_slice(&publication.payload)?;
    let car_id = publication
        .topic
        .rsplit('/')
        .next()
        .unwrap_or(publication.topic.as_str())
        .to_string();
    let transform = Transform::new(record.location, record.rotation);

    let action = match record.model {
        Some(archetype) => SessionAction::Create {
            archetype,
            color: record.color,
            transform,
            velocity: record.velocity,
        },
        None => SessionAction::Update { transform, velocity: record.velocity },
    };
    Ok(SessionUpdate { car_id, action })
}

/// One live session.
struct VehicleSession {
    actor: ActorId,
    last_update: Instant,
}

/// Registry and world behind one lock.
struct SessionState<W: WorldLink> {
    world: W,
    sessions: HashMap<String, VehicleSession>,
}

/// The bridge-side actor registry.
///
/// Cheaply cloneable; clones share the one lock domain.
pub struct SessionRegistry<W: WorldLink> {
    state: Arc<Mutex<SessionState<W>>>,
}

impl<W: WorldLink> Clone for SessionRegistry<W> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<W: WorldLink> SessionRegistry<W> {
    /// Creates a registry owning the given twin world.
    #[must_use]
    pub fn new(world: W) -> Self {
        Self { state: Arc::new(Mutex::new(SessionState { world, sessions: HashMap::new() })) }
    }

    /// Executes one classified action at the given instant.
    pub fn apply(&self, update: SessionUpdate, now: Instant) {
        let mut state = self.state.lock();
        let SessionUpdate { car_id, action } = update;

        match action {
            SessionAction::Create { archetype, color, transform, velocity } => {
                if state.sessions.contains_key(&car_id) {
                    // Known car re-announcing itself: treat as an update.
                    Self::update_session(&mut state, &car_id, transform, velocity, now);
                    return;
                }
                match state.world.spawn_actor(&archetype, color.as_deref(), transform) {
                    Ok(actor) => {
                        if let Some(velocity) = velocity {
                            if let Err(e) = state.world.set_velocity(actor, velocity) {
                                tracing::warn!(car = %car_id, error = %e, "velocity set failed");
                            }
                        }
                        state
                            .sessions
                            .insert(car_id.clone(), VehicleSession { actor, last_update: now });
                        tracing::info!(car = %car_id, %actor, %archetype, "session created");
                    }
                    Err(e) => {
                        tracing::warn!(car = %car_id, %archetype, error = %e, "session spawn failed");
                    }
                }
            }
            SessionAction::Update { transform, velocity } => {
                if !state.sessions.contains_key(&car_id) {
                    tracing::warn!(car = %car_id, "update for unknown session dropped");
                    return;
                }
                Self::update_session(&mut state, &car_id, transform, velocity, now);
            }
        }
    }

    fn update_session(
        state: &mut SessionState<W>,
        car_id: &str,
        transform: Transform,
        velocity: Option<Vec3>,
        now: Instant,
    ) {
        let Some(session) = state.sessions.get_mut(car_id) else {
            return;
        };
        let actor = session.actor;
        session.last_update = now;
        if let Err(e) = state.world.set_transform(actor, transform) {
            tracing::warn!(car = %car_id, error = %e, "transform set failed");
        }
        if let Some(velocity) = velocity {
            if let Err(e) = state.world.set_velocity(actor, velocity) {
                tracing::warn!(car = %car_id, error = %e, "velocity set failed");
            }
        }
    }

    /// Destroys and removes every session idle past the sweeper's
    /// timeout. Returns how many were evicted.
    pub fn sweep(&self, sweeper: &LifecycleSweeper, now: Instant) -> usize {
        let mut state = self.state.lock();
        let idle: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, s)| sweeper.is_idle(s.last_update, now))
            .map(|(car_id, _)| car_id.clone())
            .collect();

        for car_id in &idle {
            if let Some(session) = state.sessions.remove(car_id) {
                tracing::info!(car = %car_id, actor = %session.actor, "idle session destroyed");
                if let Err(e) = state.world.destroy_actor(session.actor) {
                    tracing::warn!(car = %car_id, error = %e, "destroy failed during sweep");
                }
            }
        }
        idle.len()
    }

    /// Spawns the periodic sweep thread.
    pub fn spawn_sweeper(
        &self,
        sweeper: LifecycleSweeper,
        shutdown: Arc<AtomicBool>,
    ) -> std::thread::JoinHandle<()>
    where
        W: 'static,
    {
        let registry = self.clone();
        std::thread::spawn(move || {
            sweeper.run(&shutdown, |now| registry.sweep(&sweeper, now));
        })
    }

    /// Destroys every session. Used at global shutdown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        let sessions: Vec<(String, ActorId)> =
            state.sessions.drain().map(|(car_id, s)| (car_id, s.actor)).collect();
        for (car_id, actor) in sessions {
            if let Err(e) = state.world.destroy_actor(actor) {
                tracing::warn!(car = %car_id, error = %e, "destroy failed during shutdown");
            }
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// True when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The actor handle for a car, if its session is live.
    #[must_use]
    pub fn session_actor(&self, car_id: &str) -> Option<ActorId> {
        self.state.lock().sessions.get(car_id).map(|s| s.actor)
    }

    /// Runs a closure against the owned world, under the registry lock.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.state.lock().world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic::KinematicWorld;
    use std::time::Duration;

    fn publication(topic: &str, payload: &str) -> Publication {
        Publication { topic: topic.to_string(), payload: payload.as_bytes().to_vec() }
    }

    const CREATE: &str = r#"{
        "model": "vehicle.tesla.model3",
        "color": "10,20,30",
        "location": {"x": 1.0, "y": 2.0, "z": 0.2},
        "rotation": {"pitch": 0.0, "yaw": 90.0, "roll": 0.0},
        "velocity": {"x": 5.0, "y": 0.0, "z": 0.0}
    }"#;

    const UPDATE: &str = r#"{
        "location": {"x": 6.0, "y": 2.0, "z": 0.2},
        "rotation": {"pitch": 0.0, "yaw": 90.0, "roll": 0.0},
        "velocity": {"x": 4.0, "y": 0.0, "z": 0.0}
    }"#;

    #[test]
    fn test_classify_create_vs_update() {
        let create = classify(&publication("fleet/7", CREATE)).unwrap();
        assert_eq!(create.car_id, "7");
        assert!(matches!(create.action, SessionAction::Create { .. }));

        let update = classify(&publication("fleet/7", UPDATE)).unwrap();
        assert!(matches!(update.action, SessionAction::Update { .. }));
    }

    #[test]
    fn test_classify_rejects_malformed_record() {
        assert!(classify(&publication("fleet/7", "{not json")).is_err());
        // A record without a pose is malformed, model or not.
        assert!(classify(&publication("fleet/7", r#"{"model":"vehicle.audi.tt"}"#)).is_err());
    }

    #[test]
    fn test_create_then_update_moves_actor() {
        let registry = SessionRegistry::new(KinematicWorld::new());
        let now = Instant::now();

        registry.apply(classify(&publication("fleet/7", CREATE)).unwrap(), now);
        let actor = registry.session_actor("7").unwrap();
        let before = registry.with_world(|w| w.actor_transform(actor)).unwrap();
        assert_eq!(before.location.x, 1.0);

        registry.apply(classify(&publication("fleet/7", UPDATE)).unwrap(), now);
        let after = registry.with_world(|w| w.actor_transform(actor)).unwrap();
        assert_eq!(after.location.x, 6.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_for_unknown_session_dropped() {
        let registry = SessionRegistry::new(KinematicWorld::new());
        registry.apply(classify(&publication("fleet/9", UPDATE)).unwrap(), Instant::now());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_repeated_create_refreshes_instead_of_respawning() {
        let registry = SessionRegistry::new(KinematicWorld::new());
        let now = Instant::now();

        registry.apply(classify(&publication("fleet/7", CREATE)).unwrap(), now);
        let actor = registry.session_actor("7").unwrap();

        registry.apply(classify(&publication("fleet/7", CREATE)).unwrap(), now);
        assert_eq!(registry.session_actor("7"), Some(actor));
        assert_eq!(registry.with_world(|w| w.actor_count()), 1);
    }

    #[test]
    fn test_sweep_evicts_only_stale_sessions() {
        let registry = SessionRegistry::new(KinematicWorld::new());
        let sweeper = LifecycleSweeper::new(Duration::from_secs(1), Duration::from_secs(10));
        let t0 = Instant::now();

        registry.apply(classify(&publication("fleet/old", CREATE)).unwrap(), t0);
        registry.apply(
            classify(&publication("fleet/new", CREATE)).unwrap(),
            t0 + Duration::from_secs(2),
        );

        // Sweep at t0+11: "old" idled 11s (> timeout), "new" only 9s.
        let evicted = registry.sweep(&sweeper, t0 + Duration::from_secs(11));
        assert_eq!(evicted, 1);
        assert!(registry.session_actor("old").is_none());
        assert!(registry.session_actor("new").is_some());
        assert_eq!(registry.with_world(|w| w.actor_count()), 1);
    }

    #[test]
    fn test_shutdown_destroys_everything() {
        let registry = SessionRegistry::new(KinematicWorld::new());
        registry.apply(classify(&publication("fleet/7", CREATE)).unwrap(), Instant::now());

        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(registry.with_world(|w| w.actor_count()), 0);
    }
}
