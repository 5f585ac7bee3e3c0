//! Re-activation timers.
//!
//! A [`WakeupDelegate`] holds at most one pending wake-up: scheduling
//! replaces whatever was pending before.

use crate::clock::display_millis;
use crate::service::Trigger;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Arranges for the scheduler to be activated again.
pub trait WakeupDelegate: Send {
    /// Activate the scheduler at `at` (epoch ms), replacing any pending
    /// wake-up. `now` is the scheduler's notion of the current time.
    fn schedule(&mut self, now: i64, at: i64);

    /// Drop the pending wake-up, if any.
    fn cancel(&mut self);
}

/// Scheduled times kept by [`ManualWakeup::history`].
pub const WAKEUP_HISTORY_LIMIT: usize = 64;

#[derive(Debug, Default)]
struct WakeupLog {
    pending: Option<i64>,
    scheduled: VecDeque<i64>,
}

/// Records wake-ups instead of acting on them. Clones share the record.
/// Only the most recent [`WAKEUP_HISTORY_LIMIT`] scheduled times are kept.
#[derive(Debug, Clone, Default)]
pub struct ManualWakeup {
    log: Arc<Mutex<WakeupLog>>,
}

impl ManualWakeup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The wake-up currently pending.
    pub fn pending(&self) -> Option<i64> {
        self.log.lock().map(|log| log.pending).unwrap_or(None)
    }

    /// Recent times passed to [`WakeupDelegate::schedule`], oldest first.
    pub fn history(&self) -> Vec<i64> {
        self.log
            .lock()
            .map(|log| log.scheduled.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Take the pending wake-up if it is due at `now`.
    pub fn take_due(&self, now: i64) -> Option<i64> {
        let mut log = self.log.lock().ok()?;
        match log.pending {
            Some(at) if at <= now => log.pending.take(),
            _ => None,
        }
    }
}

impl WakeupDelegate for ManualWakeup {
    fn schedule(&mut self, _now: i64, at: i64) {
        if let Ok(mut log) = self.log.lock() {
            log.pending = Some(at);
            if log.scheduled.len() == WAKEUP_HISTORY_LIMIT {
                log.scheduled.pop_front();
            }
            log.scheduled.push_back(at);
        }
    }

    fn cancel(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.pending = None;
        }
    }
}

/// Sleeps on the tokio runtime and posts [`Trigger::Wakeup`] when due.
pub struct TokioWakeup {
    runtime: tokio::runtime::Handle,
    triggers: mpsc::Sender<Trigger>,
    timer: Option<JoinHandle<()>>,
}

impl TokioWakeup {
    pub fn new(runtime: tokio::runtime::Handle, triggers: mpsc::Sender<Trigger>) -> Self {
        Self {
            runtime,
            triggers,
            timer: None,
        }
    }

    /// `true` while a timer task is still sleeping.
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl WakeupDelegate for TokioWakeup {
    fn schedule(&mut self, now: i64, at: i64) {
        self.cancel();
        let delay = Duration::from_millis(u64::try_from(at.saturating_sub(now)).unwrap_or(0));
        debug!("wake-up armed for {}", display_millis(at));
        let triggers = self.triggers.clone();
        self.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed channel means the service has shut down.
            let _ = triggers.send(Trigger::Wakeup).await;
        }));
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for TokioWakeup {
    fn drop(&mut self) {
        self.cancel();
    }
}
