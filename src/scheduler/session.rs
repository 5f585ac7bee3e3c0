//! The check-in state machine.
//!
//! Each [`SessionScheduler::activate`] call runs one pass to completion:
//! eligibility, restore, activity-driven registration, delivery,
//! reschedule, save. Callers must not run two activations concurrently;
//! [`crate::service::SchedulerService`] serialises them.

use crate::backoff::BackoffPolicy;
use crate::clock::display_millis;
use crate::codec::RequestCodec;
use crate::config::SchedulerConfig;
use crate::request::{IdGenerator, PendingRequest, generate_id};
use crate::scheduler::report::{
    ActivationReport, PostReport, PostResult, Registration, SavedTimestamps, SendOutcome,
    SkipReason,
};
use crate::state::{self, PersistentState};
use crate::store::StateStore;
use crate::transport::{PostRequest, Transport};
use crate::version::UpdateStatus;
use crate::wakeup::WakeupDelegate;
use omaha_protocol::install_age_days;
use tracing::{debug, error, info, warn};

/// Reports whether the host is actively in use right now.
pub type ActivityProbe = Box<dyn Fn() -> bool + Send + Sync>;

/// Decides when to register and deliver check-ins, and persists enough to
/// carry the sequence across restarts.
pub struct SessionScheduler {
    config: SchedulerConfig,
    backoff: Box<dyn BackoffPolicy>,
    codec: Option<Box<dyn RequestCodec>>,
    transport: Box<dyn Transport>,
    wakeup: Box<dyn WakeupDelegate>,
    store: Box<dyn StateStore>,
    activity: ActivityProbe,
    ids: IdGenerator,
    /// `None` until the first activation restores it.
    state: Option<PersistentState>,
    disabled_for_testing: bool,
}

impl SessionScheduler {
    pub fn new(
        config: SchedulerConfig,
        backoff: Box<dyn BackoffPolicy>,
        codec: Option<Box<dyn RequestCodec>>,
        transport: Box<dyn Transport>,
        wakeup: Box<dyn WakeupDelegate>,
        store: Box<dyn StateStore>,
        activity: ActivityProbe,
    ) -> Self {
        Self {
            config,
            backoff,
            codec,
            transport,
            wakeup,
            store,
            activity,
            ids: Box::new(generate_id),
            state: None,
            disabled_for_testing: false,
        }
    }

    /// Replace the request/session id source.
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Force every activation to be a no-op.
    pub fn set_disabled_for_testing(&mut self, disabled: bool) {
        self.disabled_for_testing = disabled;
    }

    /// `true` iff no install timestamp has ever been persisted.
    pub fn is_probably_fresh_install(&self) -> bool {
        state::is_probably_fresh_install(self.store.as_ref())
    }

    /// State as of the end of the last activation; `None` before the first.
    pub fn state(&self) -> Option<&PersistentState> {
        self.state.as_ref()
    }

    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.state.as_ref().and_then(|s| s.request.as_ref())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Consecutive delivery failures, as tracked by the backoff policy.
    pub fn failure_count(&self) -> u32 {
        self.backoff.failure_count()
    }

    /// What the last successful check-in said about newer versions.
    pub fn update_status(&self) -> UpdateStatus {
        match &self.state {
            Some(state) => UpdateStatus::evaluate(
                &self.config.current_version,
                &state.latest_version,
                &state.latest_url,
            ),
            None => UpdateStatus::default(),
        }
    }

    /// Run one activation.
    pub fn activate(&mut self) -> ActivationReport {
        let mut report = ActivationReport::default();

        if let Some(reason) = self.skip_reason() {
            debug!(?reason, "update checks skipped");
            report.skipped = Some(reason);
            return report;
        }

        let mut state = self.restore_state();
        let now = self.backoff.now();
        let mut next_wakeup = i64::MAX;

        if (self.activity)() {
            if self.should_register(&state, now) {
                let registration = self.register_new_request(&mut state, now);
                report.registrations.push(registration);
            }
            next_wakeup = state.next_new_request_time;
        }

        let post = self.post_pending(&mut state, now, &mut report.registrations);
        if matches!(post.result, PostResult::Failed | PostResult::Scheduled) {
            next_wakeup = next_wakeup.min(state.next_post_attempt_time);
        }
        report.post = Some(post);

        if next_wakeup != i64::MAX && next_wakeup >= 0 {
            info!("next update check at {}", display_millis(next_wakeup));
            self.wakeup.schedule(now, next_wakeup);
            report.scheduled_wakeup = Some(next_wakeup);
        } else {
            debug!("no update check wake-up scheduled");
            self.wakeup.cancel();
        }

        report.saved = self.save_state(&state);
        self.state = Some(state);
        report
    }

    fn skip_reason(&self) -> Option<SkipReason> {
        if self.disabled_for_testing || !self.config.updates_enabled {
            Some(SkipReason::Disabled)
        } else if !self.config.eligibility.is_eligible() {
            Some(SkipReason::IneligiblePlatform)
        } else if self.codec.is_none() {
            Some(SkipReason::MissingCodec)
        } else {
            None
        }
    }

    /// Restores from the store on first use; afterwards returns the
    /// in-memory state.
    fn restore_state(&mut self) -> PersistentState {
        if let Some(state) = self.state.take() {
            return state;
        }
        let record = match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!("cannot load scheduler state, starting fresh: {e}");
                None
            }
        };
        let now = self.backoff.now();
        PersistentState::restore(record, now, &self.config, self.backoff.as_mut(), &*self.ids)
    }

    /// Register when the pending request is stale or a new one is overdue.
    fn should_register(&self, state: &PersistentState, now: i64) -> bool {
        let stale = state
            .request
            .as_ref()
            .is_some_and(|r| r.age_millis(now) >= self.config.between_requests_ms);
        let overdue = now >= state.next_new_request_time;
        stale || overdue
    }

    fn register_new_request(&mut self, state: &mut PersistentState, now: i64) -> Registration {
        let request_id = match &state.request {
            Some(existing) if existing.is_send_install_event() && state.send_install_event => {
                existing.request_id().to_owned()
            }
            _ => (self.ids)(),
        };
        state.request = Some(PendingRequest::new(
            state.send_install_event,
            now,
            request_id.clone(),
            state.install_source.clone(),
        ));

        self.backoff.reset_failures();
        state.next_post_attempt_time = now;
        state.next_new_request_time = now.saturating_add(self.config.between_requests_ms);

        info!(
            request_id = %request_id,
            install_event = state.send_install_event,
            "registered update check request"
        );
        Registration {
            request_id,
            send_install_event: state.send_install_event,
            next_new_request_time: state.next_new_request_time,
            next_post_attempt_time: state.next_post_attempt_time,
        }
    }

    fn post_pending(
        &mut self,
        state: &mut PersistentState,
        now: i64,
        registrations: &mut Vec<Registration>,
    ) -> PostReport {
        let Some(request) = state.request.clone() else {
            return PostReport::without_send(PostResult::NoRequest);
        };
        if now < state.next_post_attempt_time {
            debug!(
                "request {} waits until {}",
                request.request_id(),
                display_millis(state.next_post_attempt_time)
            );
            return PostReport::without_send(PostResult::Scheduled);
        }

        let session_id = (self.ids)();
        let mut report = PostReport::without_send(PostResult::Failed);
        report.session_id = Some(session_id.clone());

        let mut succeeded = self.send(state, &request, &session_id, now);
        report.sends.push(SendOutcome {
            request_id: request.request_id().to_owned(),
            install_event: request.is_send_install_event(),
            success: succeeded,
        });

        if succeeded && request.is_send_install_event() {
            // The install event is never resent once accepted, even if the
            // chained request below fails.
            state.send_install_event = false;
            report.install_event_sent = true;
            registrations.push(self.register_new_request(state, now));

            if let Some(chained) = state.request.clone() {
                succeeded = self.send(state, &chained, &session_id, now);
                report.sends.push(SendOutcome {
                    request_id: chained.request_id().to_owned(),
                    install_event: false,
                    success: succeeded,
                });
            }
        }

        if succeeded {
            state.request = None;
            self.backoff.reset_failures();
            state.next_new_request_time = now.saturating_add(self.config.between_requests_ms);
            state.next_post_attempt_time = self.backoff.next_timestamp();
            report.result = PostResult::Sent;
            info!(session_id = %session_id, "update check delivered");
        } else {
            state.next_post_attempt_time = self.backoff.next_timestamp();
            self.backoff.increment_failures();
            info!(
                failures = self.backoff.failure_count(),
                "update check failed, retry at {}",
                display_millis(state.next_post_attempt_time)
            );
        }
        report
    }

    /// One encode, exchange, decode cycle. Every failure folds into `false`.
    fn send(
        &self,
        state: &mut PersistentState,
        request: &PendingRequest,
        session_id: &str,
        now: i64,
    ) -> bool {
        let Some(codec) = self.codec.as_deref() else {
            return false;
        };

        let age = install_age_days(now, state.install_timestamp, request.is_send_install_event());
        let body = match codec.encode(session_id, &self.config.current_version, age, request) {
            Ok(body) => body,
            Err(e) => {
                error!("cannot encode request {}: {e}", request.request_id());
                return false;
            }
        };

        let request_age_secs = (request.is_send_install_event()
            && self.backoff.failure_count() > 0)
            .then(|| request.age_secs(now));
        let post = PostRequest {
            endpoint: codec.server_endpoint(),
            body: &body,
            timeout: self.config.connection_timeout,
            request_age_secs,
        };

        let reply = match self.transport.send(&post) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("update check {} not delivered: {e}", request.request_id());
                return false;
            }
        };

        match codec.decode(&reply, request) {
            Ok(check) => {
                debug!(
                    version = %check.version,
                    has_update = check.has_update(),
                    "update check reply accepted"
                );
                state.latest_version = check.version;
                state.latest_url = check.url;
                true
            }
            Err(e) => {
                warn!("rejected reply to {}: {e}", request.request_id());
                false
            }
        }
    }

    fn save_state(&self, state: &PersistentState) -> Option<SavedTimestamps> {
        match self.store.save(&state.to_record()) {
            Ok(()) => Some(SavedTimestamps {
                next_new_request_time: state.next_new_request_time,
                next_post_attempt_time: state.next_post_attempt_time,
            }),
            Err(e) => {
                error!("cannot save scheduler state: {e}");
                None
            }
        }
    }
}
