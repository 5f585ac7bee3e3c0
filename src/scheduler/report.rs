//! What one activation did, phase by phase.

use serde::Serialize;

/// Why an activation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Updates are switched off (configuration or test override).
    Disabled,
    /// The host OS or its version is not supported.
    IneligiblePlatform,
    /// No request codec was supplied.
    MissingCodec,
}

/// Outcome of the delivery phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostResult {
    /// Nothing was pending.
    NoRequest,
    /// Everything sent in this activation was accepted.
    Sent,
    /// A send failed; the retry time moved out per backoff.
    Failed,
    /// A request is pending but its retry time has not come yet.
    Scheduled,
}

/// A request registered during the activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub request_id: String,
    pub send_install_event: bool,
    pub next_new_request_time: i64,
    pub next_post_attempt_time: i64,
}

/// One network exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub request_id: String,
    pub install_event: bool,
    pub success: bool,
}

/// Result of the delivery phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostReport {
    pub result: PostResult,
    /// Session id shared by every send in this activation.
    pub session_id: Option<String>,
    /// `true` when the install event was accepted in this activation.
    pub install_event_sent: bool,
    /// Sends in order; at most two (install event, then the chained ping).
    pub sends: Vec<SendOutcome>,
}

impl PostReport {
    pub(crate) fn without_send(result: PostResult) -> Self {
        Self {
            result,
            session_id: None,
            install_event_sent: false,
            sends: Vec::new(),
        }
    }
}

/// Timestamps written by the final save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavedTimestamps {
    pub next_new_request_time: i64,
    pub next_post_attempt_time: i64,
}

/// Everything one call to `activate()` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Set when the activation exited before touching state.
    pub skipped: Option<SkipReason>,
    /// Registrations in order; the second one, if any, is the request
    /// chained after an accepted install event.
    pub registrations: Vec<Registration>,
    pub post: Option<PostReport>,
    /// Wake-up handed to the delegate, if any.
    pub scheduled_wakeup: Option<i64>,
    /// `None` when skipped or when the save failed.
    pub saved: Option<SavedTimestamps>,
}

impl ActivationReport {
    /// Delivery outcome, or `None` if the activation was skipped.
    pub fn post_result(&self) -> Option<PostResult> {
        self.post.as_ref().map(|p| p.result)
    }
}
