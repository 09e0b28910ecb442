//! Output clocks for audio scheduling
//!
//! The playback scheduler only needs "what time is it on the output device".
//! A real audio backend exposes its own hardware clock; `MonotonicClock`
//! stands in for it with an `Instant` base, and `ManualClock` is driven
//! explicitly for simulations and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source of an audio output
pub trait OutputClock: Send + Sync {
    /// Current output time since the clock started
    fn now(&self) -> Duration;
}

/// Wall-clock backed output clock
///
/// Cheap to clone; clones share the same base instant.
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    base: Arc<Instant>,
}

impl MonotonicClock {
    /// Create a new clock starting now
    pub fn new() -> Self {
        Self {
            base: Arc::new(Instant::now()),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.base.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time
    pub fn set(&self, now: Duration) {
        self.micros.store(now.as_micros() as u64, Ordering::Release);
    }

    /// Move forward by `delta`
    pub fn advance(&self, delta: Duration) {
        self.micros
            .fetch_add(delta.as_micros() as u64, Ordering::AcqRel);
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Acquire))
    }
}
