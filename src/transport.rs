//! Network exchange for delivery attempts.
//!
//! Every failure mode maps to a [`TransportError`]; the scheduler does not
//! distinguish between them and retries uniformly.

use std::io::Read;
use std::time::Duration;

/// Largest reply body accepted, in bytes.
const MAX_REPLY_BYTES: u64 = 1024 * 1024;

/// Header carrying how long an install event has been waiting, in seconds.
pub const REQUEST_AGE_HEADER: &str = "X-RequestAge";

/// A network exchange failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("cannot connect: {0}")]
    Connect(String),

    /// The exchange did not finish within the timeout.
    #[error("timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("server returned HTTP {0}")]
    Status(u16),

    /// Writing the request or reading the reply failed.
    #[error("I/O failure: {0}")]
    Io(String),
}

/// One POST to the update server.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub endpoint: &'a str,
    pub body: &'a [u8],
    pub timeout: Duration,
    /// Seconds an install event has been waiting; sent only on retries.
    pub request_age_secs: Option<i64>,
}

/// Performs the network exchange.
pub trait Transport: Send {
    /// Send `request` and return the raw reply body.
    fn send(&self, request: &PostRequest<'_>) -> Result<Vec<u8>, TransportError>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    user_agent: String,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            user_agent: format!("omaha-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &PostRequest<'_>) -> Result<Vec<u8>, TransportError> {
        let mut call = self
            .agent
            .post(request.endpoint)
            .timeout(request.timeout)
            .set("User-Agent", &self.user_agent)
            .set("Content-Type", "application/json");
        if let Some(age) = request.request_age_secs {
            call = call.set(REQUEST_AGE_HEADER, &age.to_string());
        }

        let resp = match call.send_bytes(request.body) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => return Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(t)) => return Err(classify_transport(&t)),
        };

        let status = resp.status();
        if !(200..300).contains(&status) {
            return Err(TransportError::Status(status));
        }

        let mut body = Vec::new();
        resp.into_reader()
            .take(MAX_REPLY_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| classify_io(&e))?;
        Ok(body)
    }
}

fn classify_io(e: &std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Io(e.to_string()),
    }
}

fn classify_transport(t: &ureq::Transport) -> TransportError {
    let io = std::error::Error::source(t).and_then(|s| s.downcast_ref::<std::io::Error>());
    match (t.kind(), io) {
        (_, Some(e))
            if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) =>
        {
            TransportError::Timeout
        }
        (ureq::ErrorKind::Io, Some(e)) => TransportError::Io(e.to_string()),
        _ => TransportError::Connect(t.to_string()),
    }
}
