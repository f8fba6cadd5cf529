//! # Collision Tracker
//!
//! Debounced per-entity collision counting.
//!
//! A sensor that stays in contact fires repeatedly; the tracker counts a
//! new collision only when more than the window has passed since the last
//! counted event for that entity. This is a debounce, not physical-contact
//! deduplication — two genuinely distinct collisions inside the window are
//! counted once. That matches the source behavior and is kept as-is.

use gemini_shared::EntityId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-entity debounce state.
#[derive(Clone, Copy, Debug)]
pub struct CollisionState {
    /// Collisions counted so far. Monotone non-decreasing.
    pub count: u64,
    /// When the last counted event happened.
    pub last_event: Instant,
}

/// Debounces repeated collision callbacks per entity.
///
/// Written only from the single consumer loop that drains the sensor
/// channel; sensors themselves never touch this.
pub struct CollisionTracker {
    window: Duration,
    states: HashMap<EntityId, CollisionState>,
}

impl CollisionTracker {
    /// Creates a tracker with the given debounce window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, states: HashMap::new() }
    }

    /// Observes one sensor event.
    ///
    /// Returns true when the event was counted, false when it was
    /// suppressed as a continuation of the previous contact. The first
    /// event for an entity always counts.
    pub fn observe(&mut self, entity: EntityId, at: Instant) -> bool {
        match self.states.get_mut(&entity) {
            None => {
                self.states.insert(entity, CollisionState { count: 1, last_event: at });
                tracing::info!(%entity, total = 1, "collision");
                true
            }
            Some(state) => {
                if at.saturating_duration_since(state.last_event) > self.window {
                    state.count += 1;
                    state.last_event = at;
                    tracing::info!(%entity, total = state.count, "collision");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Counted collisions for one entity.
    #[must_use]
    pub fn count(&self, entity: EntityId) -> u64 {
        self.states.get(&entity).map_or(0, |s| s.count)
    }

    /// All per-entity counts, ordered by entity id.
    #[must_use]
    pub fn summary(&self) -> Vec<(EntityId, u64)> {
        let mut rows: Vec<_> = self.states.iter().map(|(id, s)| (*id, s.count)).collect();
        rows.sort_by_key(|(id, _)| *id);
        rows
    }
}
