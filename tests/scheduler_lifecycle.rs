//! End-to-end activations of the session scheduler against scripted
//! collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use omaha::codec::CodecError;
use omaha::platform::HostProfile;
use omaha::{
    Clock, ExponentialBackoff, ManualClock, ManualWakeup, MemoryStore, OmahaConfig, PendingRequest,
    PostRequest, PostResult, RequestCodec, SessionScheduler, SkipReason, StoredRecord, Transport,
    TransportError,
};
use omaha_protocol::UpdateCheck;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const HOUR: i64 = 3_600_000;
const DAY: i64 = 24 * HOUR;
const T: i64 = 1_700_000_000_000;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Encodes the fields the tests inspect as JSON; accepts every reply.
struct FakeCodec;

impl RequestCodec for FakeCodec {
    fn app_id(&self) -> &str {
        "{APP}"
    }

    fn server_endpoint(&self) -> &str {
        "http://update.test/service"
    }

    fn encode(
        &self,
        session_id: &str,
        version: &str,
        install_age_days: i64,
        request: &PendingRequest,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(json!({
            "session": session_id,
            "request": request.request_id(),
            "install": request.is_send_install_event(),
            "age": install_age_days,
            "version": version,
        })
        .to_string()
        .into_bytes())
    }

    fn decode(&self, _: &[u8], request: &PendingRequest) -> Result<UpdateCheck, CodecError> {
        if request.is_send_install_event() {
            return Ok(UpdateCheck::default());
        }
        Ok(UpdateCheck {
            version: "99.0.0".to_owned(),
            url: "https://dl.example.com/app".to_owned(),
        })
    }
}

#[derive(Debug, Clone)]
struct Sent {
    body: Value,
    request_age_secs: Option<i64>,
}

#[derive(Default)]
struct Script {
    outcomes: VecDeque<bool>,
    fallback: bool,
    sent: Vec<Sent>,
}

/// Replays a queue of success/failure outcomes, then `fallback`.
#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    fn always(ok: bool) -> Self {
        let t = Self::default();
        t.script.lock().unwrap().fallback = ok;
        t
    }

    fn push(&self, outcomes: &[bool]) {
        self.script.lock().unwrap().outcomes.extend(outcomes);
    }

    fn set_fallback(&self, ok: bool) {
        self.script.lock().unwrap().fallback = ok;
    }

    fn sent(&self) -> Vec<Sent> {
        self.script.lock().unwrap().sent.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &PostRequest<'_>) -> Result<Vec<u8>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.sent.push(Sent {
            body: serde_json::from_slice(request.body).unwrap(),
            request_age_secs: request.request_age_secs,
        });
        let ok = script.outcomes.pop_front().unwrap_or(script.fallback);
        if ok {
            Ok(b"{}".to_vec())
        } else {
            Err(TransportError::Status(503))
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    clock: ManualClock,
    store: MemoryStore,
    wakeup: ManualWakeup,
    transport: ScriptedTransport,
    active: Arc<AtomicBool>,
    config: OmahaConfig,
}

impl Harness {
    fn new(transport: ScriptedTransport) -> Self {
        Self {
            clock: ManualClock::new(T),
            store: MemoryStore::new(),
            wakeup: ManualWakeup::new(),
            transport,
            active: Arc::new(AtomicBool::new(true)),
            config: OmahaConfig::default(),
        }
    }

    fn with_record(mut self, record: StoredRecord) -> Self {
        self.store = MemoryStore::with_record(record);
        self
    }

    fn scheduler(&self) -> SessionScheduler {
        let (base, max) = self.config.backoff_bounds_ms();
        let active = Arc::clone(&self.active);
        SessionScheduler::new(
            self.config.scheduler_config(HostProfile::detect()),
            Box::new(ExponentialBackoff::new(self.clock.clone(), base, max)),
            Some(Box::new(FakeCodec)),
            Box::new(self.transport.clone()),
            Box::new(self.wakeup.clone()),
            Box::new(self.store.clone()),
            Box::new(move || active.load(Ordering::SeqCst)),
        )
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    fn record(&self) -> StoredRecord {
        self.store.snapshot().expect("state saved")
    }
}

/// A record from a client that delivered its install event long ago.
fn installed_record() -> StoredRecord {
    StoredRecord {
        send_install_event: Some(false),
        timestamp_of_install: Some(T - 30 * DAY),
        install_source: Some("organic".to_owned()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Registration and delivery
// ---------------------------------------------------------------------------

#[test]
fn five_hour_example_registers_then_delivers() {
    let h = Harness::new(ScriptedTransport::always(true)).with_record(installed_record());
    let mut scheduler = h.scheduler();

    let report = scheduler.activate();

    assert_eq!(report.registrations.len(), 1);
    let registration = &report.registrations[0];
    assert!(!registration.send_install_event);
    assert_eq!(registration.next_post_attempt_time, T);
    assert_eq!(registration.next_new_request_time, T + 5 * HOUR);

    assert_eq!(report.post_result(), Some(PostResult::Sent));
    assert!(scheduler.pending_request().is_none());

    let saved = report.saved.expect("saved");
    assert_eq!(saved.next_new_request_time, T + 5 * HOUR);
    assert_eq!(saved.next_post_attempt_time, T + HOUR);
    assert_eq!(report.scheduled_wakeup, Some(T + 5 * HOUR));
    assert_eq!(h.wakeup.pending(), Some(T + 5 * HOUR));

    let record = h.record();
    assert_eq!(record.timestamp_of_request, None);
    assert_eq!(record.latest_version.as_deref(), Some("99.0.0"));
}

#[test]
fn registered_request_waits_for_post_time() {
    let h = Harness::new(ScriptedTransport::always(false)).with_record(installed_record());
    let mut scheduler = h.scheduler();
    scheduler.activate();
    assert_eq!(h.transport.sent().len(), 1);

    h.clock.advance(HOUR / 2);
    let report = scheduler.activate();
    assert!(report.registrations.is_empty());
    assert_eq!(report.post_result(), Some(PostResult::Scheduled));
    assert_eq!(report.scheduled_wakeup, Some(T + HOUR));
    assert_eq!(h.transport.sent().len(), 1);
}

#[test]
fn inactive_host_without_request_schedules_nothing() {
    let h = Harness::new(ScriptedTransport::always(true)).with_record(installed_record());
    h.set_active(false);
    let mut scheduler = h.scheduler();

    let report = scheduler.activate();
    assert!(report.registrations.is_empty());
    assert_eq!(report.post_result(), Some(PostResult::NoRequest));
    assert_eq!(report.scheduled_wakeup, None);
    assert_eq!(h.wakeup.pending(), None);
    assert!(report.saved.is_some());
}

#[test]
fn failures_back_off_one_two_four_then_cap_at_five_hours() {
    let h = Harness::new(ScriptedTransport::always(false)).with_record(installed_record());
    let mut scheduler = h.scheduler();

    scheduler.activate();
    h.set_active(false);

    // Each delay is measured from the attempt that produced it.
    let mut delays = Vec::new();
    for _ in 0..5 {
        let next = scheduler.state().unwrap().next_post_attempt_time;
        delays.push(next - h.clock.now_millis());
        h.clock.set(next);
        let report = scheduler.activate();
        assert_eq!(report.post_result(), Some(PostResult::Failed));
        assert_eq!(
            h.wakeup.pending(),
            Some(scheduler.state().unwrap().next_post_attempt_time)
        );
    }
    delays.push(scheduler.state().unwrap().next_post_attempt_time - h.clock.now_millis());

    assert_eq!(
        delays,
        vec![HOUR, 2 * HOUR, 4 * HOUR, 5 * HOUR, 5 * HOUR, 5 * HOUR]
    );
    assert_eq!(scheduler.failure_count(), 6);
}

#[test]
fn retry_timestamps_never_decrease_until_success() {
    let transport = ScriptedTransport::always(false);
    let h = Harness::new(transport.clone()).with_record(installed_record());
    let mut scheduler = h.scheduler();
    scheduler.activate();
    h.set_active(false);

    let mut previous = scheduler.state().unwrap().next_post_attempt_time;
    for _ in 0..8 {
        h.clock.set(previous);
        scheduler.activate();
        let next = scheduler.state().unwrap().next_post_attempt_time;
        assert!(next >= previous);
        previous = next;
    }

    transport.set_fallback(true);
    h.clock.set(previous);
    let report = scheduler.activate();
    assert_eq!(report.post_result(), Some(PostResult::Sent));
    assert_eq!(scheduler.failure_count(), 0);
    assert_eq!(
        scheduler.state().unwrap().next_post_attempt_time,
        previous + HOUR
    );
}

#[test]
fn at_most_one_request_is_ever_pending() {
    let transport = ScriptedTransport::always(false);
    let h = Harness::new(transport.clone());
    let mut scheduler = h.scheduler();

    let steps: [(i64, bool, bool); 8] = [
        (0, true, false),
        (HOUR, true, false),
        (5 * HOUR, true, false),
        (HOUR, false, true),
        (6 * HOUR, true, false),
        (6 * HOUR, true, true),
        (2 * HOUR, true, false),
        (10 * HOUR, true, false),
    ];
    for (advance, active, ok) in steps {
        h.clock.advance(advance);
        h.set_active(active);
        transport.set_fallback(ok);
        let report = scheduler.activate();

        let record = h.record();
        match scheduler.pending_request() {
            Some(request) => {
                assert_eq!(record.timestamp_of_request, Some(request.creation_timestamp()));
                if let Some(last) = report.registrations.last() {
                    assert_eq!(request.request_id(), last.request_id);
                }
            }
            None => assert_eq!(record.timestamp_of_request, None),
        }
    }
}

// ---------------------------------------------------------------------------
// Install event
// ---------------------------------------------------------------------------

#[test]
fn install_event_is_delivered_once_then_chained_ping_shares_session() {
    let transport = ScriptedTransport::always(true);
    transport.push(&[false, false, false]);
    let h = Harness::new(transport.clone());
    let mut scheduler = h.scheduler();
    assert!(scheduler.is_probably_fresh_install());

    // Three failed attempts of the install event.
    scheduler.activate();
    h.set_active(false);
    for _ in 0..2 {
        h.clock.set(scheduler.state().unwrap().next_post_attempt_time);
        scheduler.activate();
    }
    assert!(scheduler.state().unwrap().send_install_event);

    h.clock.set(scheduler.state().unwrap().next_post_attempt_time);
    let report = scheduler.activate();
    let post = report.post.clone().expect("post");
    assert_eq!(post.result, PostResult::Sent);
    assert!(post.install_event_sent);
    assert!(!scheduler.state().unwrap().send_install_event);
    assert!(!scheduler.is_probably_fresh_install());

    let sent = transport.sent();
    assert_eq!(sent.len(), 5);
    let install_ids: Vec<&Value> = sent[..4].iter().map(|s| &s.body["request"]).collect();
    assert!(install_ids.iter().all(|id| *id == install_ids[0]));
    assert!(sent[..4].iter().all(|s| s.body["install"] == true));
    assert_eq!(sent[0].request_age_secs, None);
    assert_eq!(sent[3].request_age_secs, Some(7 * 3600));

    let ping = &sent[4];
    assert_eq!(ping.body["install"], false);
    assert_eq!(ping.body["session"], sent[3].body["session"]);
    assert_ne!(ping.body["request"], sent[3].body["request"]);
    assert_eq!(ping.request_age_secs, None);

    // Later check-ins never carry the install event again.
    h.set_active(true);
    for _ in 0..3 {
        h.clock.advance(6 * HOUR);
        scheduler.activate();
    }
    let later = transport.sent();
    assert_eq!(later.len(), 8);
    assert!(later[5..].iter().all(|s| s.body["install"] == false));
}

#[test]
fn install_event_reports_immediate_install_age() {
    let transport = ScriptedTransport::always(false);
    let h = Harness::new(transport.clone());
    h.scheduler().activate();
    assert_eq!(transport.sent()[0].body["age"], -1);
}

#[test]
fn install_event_keeps_its_id_across_restart() {
    let transport = ScriptedTransport::always(false);
    let h = Harness::new(transport.clone());
    h.scheduler().activate();
    let first_id = transport.sent()[0].body["request"].clone();
    assert_eq!(
        h.record().persisted_request_id.as_deref(),
        first_id.as_str()
    );

    let mut restarted = h.scheduler();
    h.clock.advance(HOUR);
    restarted.activate();
    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].body["request"], first_id);
}

#[test]
fn failed_chained_ping_still_consumes_install_event() {
    let transport = ScriptedTransport::always(false);
    transport.push(&[true, false]);
    let h = Harness::new(transport.clone());
    let mut scheduler = h.scheduler();

    let report = scheduler.activate();
    let post = report.post.expect("post");
    assert_eq!(post.result, PostResult::Failed);
    assert!(post.install_event_sent);
    assert_eq!(
        post.sends.iter().map(|s| s.success).collect::<Vec<_>>(),
        vec![true, false]
    );

    let state = scheduler.state().unwrap();
    assert!(!state.send_install_event);
    let pending = scheduler.pending_request().expect("chained ping stays pending");
    assert!(!pending.is_send_install_event());
    assert_eq!(state.next_post_attempt_time, T + HOUR);
    assert_eq!(h.record().send_install_event, Some(false));

    transport.set_fallback(true);
    h.set_active(false);
    h.clock.set(T + HOUR);
    scheduler.activate();
    let last = transport.sent().pop().unwrap();
    assert_eq!(last.body["install"], false);
}

// ---------------------------------------------------------------------------
// Restore rules
// ---------------------------------------------------------------------------

#[test]
fn skewed_next_request_time_is_clamped_and_registers_now() {
    let record = StoredRecord {
        timestamp_for_new_request: Some(T + 1000 * 5 * HOUR),
        ..installed_record()
    };
    let h = Harness::new(ScriptedTransport::always(false)).with_record(record);
    let report = h.scheduler().activate();

    assert_eq!(report.registrations.len(), 1);
    assert_eq!(
        report.registrations[0].next_new_request_time,
        T + 5 * HOUR
    );
}

#[test]
fn skewed_post_time_is_clamped_to_now() {
    let record = StoredRecord {
        timestamp_of_request: Some(T - HOUR),
        timestamp_for_new_request: Some(T + 4 * HOUR),
        timestamp_for_next_post_attempt: Some(T + 1000 * HOUR),
        ..installed_record()
    };
    let transport = ScriptedTransport::always(true);
    let h = Harness::new(transport.clone()).with_record(record);
    h.set_active(false);

    let report = h.scheduler().activate();
    assert_eq!(report.post_result(), Some(PostResult::Sent));
    assert_eq!(transport.sent().len(), 1);
}

#[test]
fn stale_ping_request_is_replaced() {
    let record = StoredRecord {
        timestamp_of_request: Some(T - 5 * HOUR - 1),
        timestamp_for_new_request: Some(T + HOUR),
        timestamp_for_next_post_attempt: Some(T + HOUR),
        persisted_request_id: Some("{OLD}".to_owned()),
        ..installed_record()
    };
    let h = Harness::new(ScriptedTransport::always(false)).with_record(record);
    let mut scheduler = h.scheduler();
    let report = scheduler.activate();

    assert_eq!(report.registrations.len(), 1);
    assert_ne!(report.registrations[0].request_id, "{OLD}");
    assert_eq!(scheduler.pending_request().unwrap().creation_timestamp(), T);
}

#[test]
fn stale_install_event_keeps_its_id() {
    let record = StoredRecord {
        send_install_event: Some(true),
        timestamp_of_install: Some(T - DAY),
        timestamp_of_request: Some(T - 5 * HOUR - 1),
        timestamp_for_new_request: Some(T + HOUR),
        timestamp_for_next_post_attempt: Some(T + HOUR),
        persisted_request_id: Some("{INSTALL}".to_owned()),
        ..Default::default()
    };
    let h = Harness::new(ScriptedTransport::always(false)).with_record(record);
    let report = h.scheduler().activate();

    assert_eq!(report.registrations.len(), 1);
    assert_eq!(report.registrations[0].request_id, "{INSTALL}");
    assert!(report.registrations[0].send_install_event);
}

#[test]
fn fresh_request_within_interval_is_not_replaced() {
    let record = StoredRecord {
        timestamp_of_request: Some(T - HOUR),
        timestamp_for_new_request: Some(T + 4 * HOUR),
        timestamp_for_next_post_attempt: Some(T),
        ..installed_record()
    };
    let h = Harness::new(ScriptedTransport::always(false)).with_record(record);
    let mut scheduler = h.scheduler();
    let report = scheduler.activate();
    assert!(report.registrations.is_empty());
    assert_eq!(report.post_result(), Some(PostResult::Failed));
    assert_eq!(
        scheduler.pending_request().unwrap().creation_timestamp(),
        T - HOUR
    );
}

#[test]
fn post_time_beyond_last_delay_is_clamped_after_restart() {
    // A fresh backoff has no recorded delay, so any future post time is skew.
    let record = StoredRecord {
        timestamp_of_request: Some(T - HOUR),
        timestamp_for_new_request: Some(T + 4 * HOUR),
        timestamp_for_next_post_attempt: Some(T + HOUR),
        ..installed_record()
    };
    let h = Harness::new(ScriptedTransport::always(false)).with_record(record);
    h.set_active(false);
    let report = h.scheduler().activate();
    assert_eq!(report.post_result(), Some(PostResult::Failed));
    assert_eq!(h.transport.sent().len(), 1);
}

#[test]
fn clock_before_install_reports_zero_age() {
    let record = StoredRecord {
        timestamp_of_install: Some(T + 10 * DAY),
        ..installed_record()
    };
    let transport = ScriptedTransport::always(true);
    let h = Harness::new(transport.clone()).with_record(record);
    let mut scheduler = h.scheduler();
    let report = scheduler.activate();

    assert_eq!(report.post_result(), Some(PostResult::Sent));
    assert_eq!(transport.sent()[0].body["age"], 0);
    // The install timestamp is kept as stored, not moved back to now.
    assert_eq!(h.record().timestamp_of_install, Some(T + 10 * DAY));
}

#[test]
fn elapsed_days_reported_for_pings() {
    let transport = ScriptedTransport::always(true);
    let h = Harness::new(transport.clone()).with_record(installed_record());
    h.scheduler().activate();
    assert_eq!(transport.sent()[0].body["age"], 30);
}

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

#[test]
fn ineligible_platform_touches_nothing() {
    let mut h = Harness::new(ScriptedTransport::always(true));
    h.config.platform.supported_os = vec!["plan9".to_owned()];
    let mut scheduler = h.scheduler();

    let report = scheduler.activate();
    assert_eq!(report.skipped, Some(SkipReason::IneligiblePlatform));
    assert!(h.store.snapshot().is_none());
    assert!(h.wakeup.history().is_empty());
    assert!(h.transport.sent().is_empty());
}

#[test]
fn administratively_disabled_touches_nothing() {
    let mut h = Harness::new(ScriptedTransport::always(true));
    h.config.app.updates_enabled = false;
    let report = h.scheduler().activate();
    assert_eq!(report.skipped, Some(SkipReason::Disabled));
    assert!(h.store.snapshot().is_none());
}
