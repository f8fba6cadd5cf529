//! # Lifecycle Sweeper
//!
//! Periodic eviction of idle sessions, independent of message arrival.
//!
//! Only the publish/subscribe ingress uses this: a bridge session not
//! refreshed within the timeout gets its actor destroyed. The primary
//! relay path deliberately has no per-entity timeout — a silent entity
//! freezes in its last observed pose until global shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timing policy for the periodic sweep.
#[derive(Clone, Copy, Debug)]
pub struct LifecycleSweeper {
    /// How often the sweep runs.
    pub period: Duration,
    /// Idle age beyond which a session is evicted.
    pub timeout: Duration,
}

impl LifecycleSweeper {
    /// Creates a sweeper policy.
    #[must_use]
    pub const fn new(period: Duration, timeout: Duration) -> Self {
        Self { period, timeout }
    }

    /// True when a session last refreshed at `last_update` has idled past
    /// the timeout. Strictly greater: a session exactly at the timeout
    /// survives one more sweep.
    #[must_use]
    pub fn is_idle(&self, last_update: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_update) > self.timeout
    }

    /// Runs `sweep` every period until the shutdown flag is raised.
    ///
    /// The sleep is chopped so shutdown is observed promptly.
    pub fn run<F: FnMut(Instant) -> usize>(&self, shutdown: &Arc<AtomicBool>, mut sweep: F) {
        let slice = Duration::from_millis(50);
        'outer: loop {
            let mut slept = Duration::ZERO;
            while slept < self.period {
                if shutdown.load(Ordering::Relaxed) {
                    break 'outer;
                }
                std::thread::sleep(slice);
                slept += slice;
            }
            let evicted = sweep(Instant::now());
            if evicted > 0 {
                tracing::debug!(evicted, "sweep evicted idle sessions");
            }
        }
    }
}
