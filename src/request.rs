//! The single outstanding check-in awaiting delivery.

/// Request id persisted when no install-event request is in flight.
pub const INVALID_REQUEST_ID: &str = "invalid";

/// Install source for builds preloaded on the system image.
pub const INSTALL_SOURCE_SYSTEM: &str = "system_image";

/// Install source for builds the user installed themselves.
pub const INSTALL_SOURCE_ORGANIC: &str = "organic";

/// Produces request and session ids.
pub type IdGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Brace-wrapped upper-case UUID v4, the id format the server expects.
pub fn generate_id() -> String {
    format!("{{{}}}", uuid::Uuid::new_v4().to_string().to_uppercase())
}

/// A registered check-in that has not been delivered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    send_install_event: bool,
    creation_timestamp: i64,
    request_id: String,
    install_source: String,
}

impl PendingRequest {
    pub fn new(
        send_install_event: bool,
        creation_timestamp: i64,
        request_id: impl Into<String>,
        install_source: impl Into<String>,
    ) -> Self {
        Self {
            send_install_event,
            creation_timestamp,
            request_id: request_id.into(),
            install_source: install_source.into(),
        }
    }

    /// Whether this request reports the one-time install event.
    pub fn is_send_install_event(&self) -> bool {
        self.send_install_event
    }

    pub fn creation_timestamp(&self) -> i64 {
        self.creation_timestamp
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn install_source(&self) -> &str {
        &self.install_source
    }

    /// Milliseconds since registration. Negative if the clock moved back.
    pub fn age_millis(&self, now: i64) -> i64 {
        now.saturating_sub(self.creation_timestamp)
    }

    /// Whole seconds since registration.
    pub fn age_secs(&self, now: i64) -> i64 {
        self.age_millis(now) / 1000
    }
}
