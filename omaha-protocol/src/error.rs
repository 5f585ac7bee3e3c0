//! Error types for the omaha-protocol crate.
//!
//! Every variant carries a stable, human-readable message. Request and
//! response bodies never appear in error messages.

/// Errors raised while building a request or validating a server reply.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The reply (or an outgoing request) was not valid JSON for the
    /// expected shape.
    #[error("JSON error: {0}")]
    Json(String),

    /// The reply advertised a protocol version this client does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocol(String),

    /// The reply did not contain an entry for the requesting application.
    #[error("no app entry for {0}")]
    AppMismatch(String),

    /// The server rejected the application as a whole.
    #[error("app status was {0}")]
    AppStatus(String),

    /// A required element was missing from the reply.
    #[error("missing element: {0}")]
    MissingElement(&'static str),

    /// The server did not acknowledge the install event.
    #[error("event status was {0}")]
    EventStatus(String),

    /// The server did not acknowledge the ping.
    #[error("ping status was {0}")]
    PingStatus(String),

    /// The update check came back with an unexpected status.
    #[error("updatecheck status was {0}")]
    UpdateCheckStatus(String),

    /// Invalid client identity configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Convenience type alias for omaha-protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;
