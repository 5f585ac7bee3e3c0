//! "Host actively in use" signal.

use crate::clock::Clock;
use crate::scheduler::ActivityProbe;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

const NEVER: i64 = i64::MIN;

/// Remembers when the host last reported activity. Clones share state.
#[derive(Clone)]
pub struct ActivityTracker {
    clock: Arc<dyn Clock>,
    last_active: Arc<AtomicI64>,
}

impl ActivityTracker {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            last_active: Arc::new(AtomicI64::new(NEVER)),
        }
    }

    /// Record that the host is in use now.
    pub fn mark_active(&self) {
        self.last_active
            .store(self.clock.now_millis(), Ordering::SeqCst);
    }

    /// Last recorded activity, if any.
    pub fn last_active(&self) -> Option<i64> {
        let at = self.last_active.load(Ordering::SeqCst);
        (at != NEVER).then_some(at)
    }

    /// `true` if activity was recorded within `window` of now.
    pub fn is_active_within(&self, window: Duration) -> bool {
        let Some(at) = self.last_active() else {
            return false;
        };
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let elapsed = self.clock.now_millis().saturating_sub(at);
        (0..=window_ms).contains(&elapsed)
    }

    /// Probe for [`crate::SessionScheduler`] using a fixed window.
    pub fn probe(&self, window: Duration) -> ActivityProbe {
        let tracker = self.clone();
        Box::new(move || tracker.is_active_within(window))
    }
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("last_active", &self.last_active())
            .finish_non_exhaustive()
    }
}
