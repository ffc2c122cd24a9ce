//! Global session time, readable without taking the state lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Monotonically non-decreasing session time in seconds relative to market open.
///
/// Cheap to clone; every clone observes the same value. There is no ordering
/// guarantee against the rest of the snapshot: a reader may see a newer time
/// than the fields it reads next to it.
#[derive(Debug, Clone)]
pub struct GlobalTime(Arc<AtomicI32>);

impl GlobalTime {
    pub fn new(start: i32) -> Self {
        Self(Arc::new(AtomicI32::new(start)))
    }

    #[inline]
    pub fn load(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Move time forward to `t`. Returns `false` if `t` is behind the current
    /// value, in which case the clock is left unchanged.
    #[inline]
    pub fn advance_to(&self, t: i32) -> bool {
        self.0.fetch_max(t, Ordering::Relaxed) <= t
    }
}
