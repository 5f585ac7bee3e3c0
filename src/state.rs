//! Durable scheduler state and its restore rules.
//!
//! [`StoredRecord`] is the on-disk shape; every field is optional so a
//! missing key can be told apart from a stored value. [`PersistentState`]
//! is the in-memory view the scheduler works on. Restoring applies
//! defaults, drops request ids that must not survive a restart and clamps
//! timestamps a skewed clock pushed too far into the future.

use crate::backoff::BackoffPolicy;
use crate::config::SchedulerConfig;
use crate::request::{INVALID_REQUEST_ID, PendingRequest};
use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Repeating alarm registered by releases that retried through the backoff
/// policy instead of the wake-up delegate.
pub const LEGACY_ALARM_TOKEN: &str = "omaha.legacy-repeating-alarm";

/// Persisted record, keyed by the names older releases used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoredRecord {
    pub install_source: Option<String>,
    pub latest_version: Option<String>,
    pub market_url: Option<String>,
    pub persisted_request_id: Option<String>,
    pub send_install_event: Option<bool>,
    pub timestamp_for_new_request: Option<i64>,
    pub timestamp_for_next_post_attempt: Option<i64>,
    pub timestamp_of_install: Option<i64>,
    pub timestamp_of_request: Option<i64>,
}

/// The scheduler's working state between restore and save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentState {
    /// Earliest time a fresh request should be registered.
    pub next_new_request_time: i64,
    /// Earliest time the pending request may be (re)sent.
    pub next_post_attempt_time: i64,
    /// First-ever activation.
    pub install_timestamp: i64,
    /// `true` until the install event has been delivered.
    pub send_install_event: bool,
    pub install_source: String,
    pub latest_version: String,
    pub latest_url: String,
    /// The single outstanding request, if any.
    pub request: Option<PendingRequest>,
}

impl PersistentState {
    /// Rebuild state from `record` (or defaults when nothing was persisted).
    ///
    /// Absent timestamps default to `now`, the install-event flag to `true`.
    /// The persisted request id is honoured only while the install event is
    /// still outstanding; otherwise a reconstructed request gets a fresh id
    /// from `ids`.
    pub fn restore(
        record: Option<StoredRecord>,
        now: i64,
        config: &SchedulerConfig,
        backoff: &mut dyn BackoffPolicy,
        ids: &dyn Fn() -> String,
    ) -> Self {
        let record = record.unwrap_or_default();

        let send_install_event = record.send_install_event.unwrap_or(true);
        let install_source = record
            .install_source
            .unwrap_or_else(|| config.default_install_source.clone());

        let persisted_id = if send_install_event {
            record
                .persisted_request_id
                .unwrap_or_else(|| INVALID_REQUEST_ID.to_owned())
        } else {
            INVALID_REQUEST_ID.to_owned()
        };

        let request = record.timestamp_of_request.map(|created| {
            let id = if persisted_id == INVALID_REQUEST_ID || persisted_id.is_empty() {
                ids()
            } else {
                persisted_id
            };
            PendingRequest::new(send_install_event, created, id, install_source.clone())
        });

        let mut state = Self {
            next_new_request_time: record.timestamp_for_new_request.unwrap_or(now),
            next_post_attempt_time: record.timestamp_for_next_post_attempt.unwrap_or(now),
            install_timestamp: record.timestamp_of_install.unwrap_or(now),
            send_install_event,
            install_source,
            latest_version: record.latest_version.unwrap_or_default(),
            latest_url: record.market_url.unwrap_or_default(),
            request,
        };
        state.clamp_skew(now, config.between_requests_ms, backoff.last_delay());

        backoff.cancel_wakeup(LEGACY_ALARM_TOKEN);

        debug!(
            pending = state.request.is_some(),
            send_install_event = state.send_install_event,
            "restored scheduler state"
        );
        state
    }

    /// Pull timestamps that sit further in the future than any legitimate
    /// schedule could have put them back to `now`.
    fn clamp_skew(&mut self, now: i64, between_requests_ms: i64, last_delay_ms: i64) {
        if self.next_new_request_time.saturating_sub(now) > between_requests_ms {
            warn!(
                stored = self.next_new_request_time,
                now, "next request time too far in the future, resetting to now"
            );
            self.next_new_request_time = now;
        }
        if self.next_post_attempt_time.saturating_sub(now) > last_delay_ms {
            warn!(
                stored = self.next_post_attempt_time,
                now, "next post attempt too far in the future, resetting to now"
            );
            self.next_post_attempt_time = now;
        }
    }

    /// Full snapshot for [`StateStore::save`].
    pub fn to_record(&self) -> StoredRecord {
        let persisted_request_id = match &self.request {
            Some(request) if request.is_send_install_event() => request.request_id().to_owned(),
            _ => INVALID_REQUEST_ID.to_owned(),
        };
        StoredRecord {
            install_source: Some(self.install_source.clone()),
            latest_version: Some(self.latest_version.clone()),
            market_url: Some(self.latest_url.clone()),
            persisted_request_id: Some(persisted_request_id),
            send_install_event: Some(self.send_install_event),
            timestamp_for_new_request: Some(self.next_new_request_time),
            timestamp_for_next_post_attempt: Some(self.next_post_attempt_time),
            timestamp_of_install: Some(self.install_timestamp),
            timestamp_of_request: self.request.as_ref().map(PendingRequest::creation_timestamp),
        }
    }
}

/// `true` when no install timestamp has ever been persisted.
///
/// A store that cannot be read counts as fresh.
pub fn is_probably_fresh_install(store: &dyn StateStore) -> bool {
    match store.load() {
        Ok(Some(record)) => record.timestamp_of_install.is_none(),
        Ok(None) => true,
        Err(e) => {
            warn!("cannot read scheduler state: {e}");
            true
        }
    }
}
