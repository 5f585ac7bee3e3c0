//! Retry delay policy for delivery attempts.
//!
//! [`BackoffPolicy`] is what the scheduler consumes; [`ExponentialBackoff`]
//! is the production implementation. The delay for failure count `n` is
//! `min(max, base * 2^n)`, so a run of failures produces non-decreasing
//! retry timestamps until a success resets the count.

use crate::clock::Clock;
use crate::store::JsonFile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Converts a failure count into the next attempt time.
pub trait BackoffPolicy: Send {
    /// Current time in epoch milliseconds. The scheduler's only time source.
    fn now(&self) -> i64;

    /// `now()` plus the delay for the current failure count. Records the
    /// delay so [`BackoffPolicy::last_delay`] can report it.
    fn next_timestamp(&mut self) -> i64;

    /// Set the failure count back to zero.
    fn reset_failures(&mut self);

    /// Add one to the failure count.
    fn increment_failures(&mut self);

    /// Consecutive failures since the last reset.
    fn failure_count(&self) -> u32;

    /// Delay produced by the most recent [`BackoffPolicy::next_timestamp`].
    fn last_delay(&self) -> i64;

    /// Cancel a wake-up registered through an older scheduling mechanism.
    /// Unknown tokens are ignored.
    fn cancel_wakeup(&mut self, token: &str);
}

/// Persisted part of [`ExponentialBackoff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackoffState {
    pub failure_count: u32,
    pub last_delay_ms: i64,
    /// Repeating alarms left behind by releases that scheduled retries
    /// through the backoff policy itself.
    pub legacy_alarms: Vec<String>,
}

/// Doubling backoff between `base_ms` and `max_ms`.
pub struct ExponentialBackoff {
    clock: Box<dyn Clock>,
    base_ms: i64,
    max_ms: i64,
    state: BackoffState,
    file: Option<JsonFile<BackoffState>>,
}

impl ExponentialBackoff {
    /// In-memory backoff starting with zero failures.
    pub fn new(clock: impl Clock + 'static, base_ms: i64, max_ms: i64) -> Self {
        Self {
            clock: Box::new(clock),
            base_ms: base_ms.max(0),
            max_ms: max_ms.max(base_ms.max(0)),
            state: BackoffState::default(),
            file: None,
        }
    }

    /// Persist state to `path`, restoring whatever is already there.
    /// Every later mutation writes through.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        let file = JsonFile::<BackoffState>::new(path);
        match file.read() {
            Ok(Some(state)) => {
                debug!(
                    failures = state.failure_count,
                    "restored backoff state from {}",
                    file.path().display()
                );
                self.state = state;
            }
            Ok(None) => {}
            Err(e) => warn!("cannot load backoff state: {e}"),
        }
        self.file = Some(file);
        self
    }

    /// Start from an explicit state (e.g. one captured before a restart).
    pub fn with_state(mut self, state: BackoffState) -> Self {
        self.state = state;
        self
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> &BackoffState {
        &self.state
    }

    /// Delay for `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> i64 {
        // 2^62 already exceeds any sane max; stop shifting before overflow.
        let factor = 1_i64 << failures.min(62);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    fn persist(&self) {
        let Some(file) = &self.file else {
            return;
        };
        if let Err(e) = file.write(&self.state) {
            warn!("cannot persist backoff state: {e}");
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn next_timestamp(&mut self) -> i64 {
        let delay = self.delay_for(self.state.failure_count);
        self.state.last_delay_ms = delay;
        self.persist();
        self.now().saturating_add(delay)
    }

    fn reset_failures(&mut self) {
        if self.state.failure_count != 0 {
            self.state.failure_count = 0;
            self.persist();
        }
    }

    fn increment_failures(&mut self) {
        self.state.failure_count = self.state.failure_count.saturating_add(1);
        self.persist();
    }

    fn failure_count(&self) -> u32 {
        self.state.failure_count
    }

    fn last_delay(&self) -> i64 {
        self.state.last_delay_ms
    }

    fn cancel_wakeup(&mut self, token: &str) {
        let before = self.state.legacy_alarms.len();
        self.state.legacy_alarms.retain(|t| t != token);
        if self.state.legacy_alarms.len() != before {
            info!("cancelled legacy wake-up {token}");
            self.persist();
        }
    }
}
