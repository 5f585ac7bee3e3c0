//! Async wiring around [`SessionScheduler`].
//!
//! One tokio task owns the scheduler and runs activations one at a time on
//! the blocking pool, so the network exchange never stalls the runtime and
//! two activations never interleave.

use crate::activity::ActivityTracker;
use crate::backoff::ExponentialBackoff;
use crate::clock::SystemClock;
use crate::codec::{OmahaCodec, RequestCodec};
use crate::config::OmahaConfig;
use crate::platform::HostProfile;
use crate::scheduler::{ActivationReport, ActivityProbe, SessionScheduler};
use crate::store::JsonFileStore;
use crate::transport::HttpTransport;
use crate::wakeup::WakeupDelegate;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Production scheduler for `config`: system clock, persisted backoff and
/// state, HTTP transport. An identity the codec rejects leaves the codec
/// unset, which turns every activation into a no-op.
pub fn build_scheduler(
    config: &OmahaConfig,
    host: HostProfile,
    wakeup: Box<dyn WakeupDelegate>,
    activity: ActivityProbe,
) -> SessionScheduler {
    let codec: Option<Box<dyn RequestCodec>> = match OmahaCodec::new(config.client_identity(&host))
    {
        Ok(codec) => Some(Box::new(codec)),
        Err(e) => {
            warn!("update checks unavailable: {e}");
            None
        }
    };
    let (base_ms, max_ms) = config.backoff_bounds_ms();
    let backoff = ExponentialBackoff::new(SystemClock, base_ms, max_ms)
        .with_persistence(&config.storage.backoff_path);

    SessionScheduler::new(
        config.scheduler_config(host),
        Box::new(backoff),
        codec,
        Box::new(HttpTransport::new()),
        wakeup,
        Box::new(JsonFileStore::new(&config.storage.state_path)),
        activity,
    )
}

/// Triggers queued beyond this many block their sender.
const TRIGGER_QUEUE: usize = 16;

/// Why the scheduler should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A scheduled wake-up is due.
    Wakeup,
    /// The host just became active.
    HostActive,
    /// Stop after the current activation.
    Shutdown,
}

/// Serialised activation loop.
pub struct SchedulerService {
    scheduler: SessionScheduler,
    tracker: ActivityTracker,
    triggers: mpsc::Receiver<Trigger>,
    reports: Option<mpsc::UnboundedSender<ActivationReport>>,
    heartbeat: Option<Duration>,
}

impl SchedulerService {
    /// Trigger channel. Hand the sender to [`crate::wakeup::TokioWakeup`] and
    /// to whatever reports host activity.
    pub fn channel() -> (mpsc::Sender<Trigger>, mpsc::Receiver<Trigger>) {
        mpsc::channel(TRIGGER_QUEUE)
    }

    pub fn new(
        scheduler: SessionScheduler,
        tracker: ActivityTracker,
        triggers: mpsc::Receiver<Trigger>,
    ) -> Self {
        Self {
            scheduler,
            tracker,
            triggers,
            reports: None,
            heartbeat: None,
        }
    }

    /// Publish each activation's report.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<ActivationReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Mark the host active every `period` for as long as the service
    /// runs. For hosts with no better activity source than being up; keep
    /// `period` below the probe window.
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat = Some(period.max(Duration::from_millis(1)));
        self
    }

    /// Start the loop. The task ends on [`Trigger::Shutdown`] or when every
    /// sender is gone, and hands the scheduler back (`None` if an
    /// activation panicked).
    pub fn spawn(self) -> JoinHandle<Option<SessionScheduler>> {
        let Self {
            scheduler,
            tracker,
            mut triggers,
            reports,
            heartbeat,
        } = self;

        tokio::spawn(async move {
            info!("update check service started");
            let beat = heartbeat.map(|period| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let mut tick = tokio::time::interval(period);
                    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        tick.tick().await;
                        tracker.mark_active();
                    }
                })
            });
            let mut scheduler = scheduler;
            let mut follow_up = false;

            loop {
                if !follow_up {
                    match triggers.recv().await {
                        None | Some(Trigger::Shutdown) => break,
                        Some(trigger) => note(&tracker, trigger),
                    }
                }

                let joined = tokio::task::spawn_blocking(move || {
                    let report = scheduler.activate();
                    (scheduler, report)
                })
                .await;
                let report = match joined {
                    Ok((back, report)) => {
                        scheduler = back;
                        report
                    }
                    Err(e) => {
                        error!("update check activation aborted: {e}");
                        if let Some(beat) = &beat {
                            beat.abort();
                        }
                        return None;
                    }
                };
                match serde_json::to_string(&report) {
                    Ok(json) => debug!(report = %json, "activation finished"),
                    Err(e) => warn!("cannot serialise activation report: {e}"),
                }
                if let Some(tx) = &reports {
                    let _ = tx.send(report);
                }

                // Everything that arrived meanwhile collapses into one rerun.
                follow_up = false;
                let mut shutdown = false;
                while let Ok(trigger) = triggers.try_recv() {
                    if trigger == Trigger::Shutdown {
                        shutdown = true;
                    } else {
                        note(&tracker, trigger);
                        follow_up = true;
                    }
                }
                if shutdown {
                    break;
                }
            }

            if let Some(beat) = beat {
                beat.abort();
            }
            info!("update check service stopped");
            Some(scheduler)
        })
    }
}

fn note(tracker: &ActivityTracker, trigger: Trigger) {
    debug!(?trigger, "update check triggered");
    if trigger == Trigger::HostActive {
        tracker.mark_active();
    }
}
