//! Wire types for the JSON rendition of the update-check protocol.
//!
//! Request types are only ever serialized and response types only ever
//! deserialized. Response fields are all optional so that validation can
//! report which element is missing instead of failing inside serde.

use serde::{Deserialize, Serialize};

/// Protocol version written into every request.
pub const PROTOCOL_VERSION: &str = "3.1";

/// Protocol versions accepted in replies.
pub const ACCEPTED_PROTOCOLS: &[&str] = &["3.0", "3.1"];

/// `installage` value sent with an install event.
pub const INSTALL_AGE_IMMEDIATELY_AFTER_INSTALLING: i64 = -1;

/// Event type for "install completed".
pub const EVENT_TYPE_INSTALL: u32 = 2;

/// Event result for "success".
pub const EVENT_RESULT_SUCCESS: u32 = 1;

/// Prefix some servers put in front of JSON replies to defeat XSSI.
pub const XSSI_PREFIX: &str = ")]}'";

/// Top-level request document.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    pub request: Request,
}

/// Body of a request.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub protocol: String,
    pub requestid: String,
    pub sessionid: String,
    pub installsource: String,
    pub ismachine: String,
    pub updater: String,
    pub updaterversion: String,
    pub os: OsInfo,
    pub app: Vec<AppRequest>,
}

/// Host operating system description.
#[derive(Debug, Clone, Serialize)]
pub struct OsInfo {
    pub platform: String,
    pub version: String,
    pub arch: String,
}

/// Per-application part of a request.
#[derive(Debug, Clone, Serialize)]
pub struct AppRequest {
    pub appid: String,
    pub version: String,
    pub lang: String,
    pub brand: String,
    pub client: String,
    pub installage: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Vec<EventRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<PingRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updatecheck: Option<UpdateCheckRequest>,
}

/// Event report (install completed).
#[derive(Debug, Clone, Serialize)]
pub struct EventRequest {
    pub eventtype: u32,
    pub eventresult: u32,
}

/// Active ping.
#[derive(Debug, Clone, Serialize)]
pub struct PingRequest {
    pub active: u32,
}

/// Empty update-check marker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCheckRequest {}

/// Top-level response document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEnvelope {
    pub response: Option<Response>,
}

/// Body of a response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Response {
    pub protocol: Option<String>,
    pub server: Option<String>,
    pub daystart: Option<DayStart>,
    pub app: Vec<AppResponse>,
}

/// Server-side notion of how far into the day the request landed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DayStart {
    pub elapsed_seconds: Option<i64>,
    pub elapsed_days: Option<i64>,
}

/// Per-application part of a response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppResponse {
    pub appid: Option<String>,
    pub status: Option<String>,
    pub event: Vec<StatusOnly>,
    pub ping: Option<StatusOnly>,
    pub updatecheck: Option<UpdateCheckResponse>,
}

/// Element whose only content is a status string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusOnly {
    pub status: Option<String>,
}

/// Update-check verdict.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateCheckResponse {
    pub status: Option<String>,
    pub urls: Option<Urls>,
    pub manifest: Option<Manifest>,
}

/// Download locations for an available update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Urls {
    pub url: Vec<Url>,
}

/// A single download location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Url {
    pub codebase: Option<String>,
}

/// Description of the offered version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub version: Option<String>,
}

/// Parsed outcome of a validated reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheck {
    /// Version the server offers; empty when there is no update or the
    /// request only carried an install event.
    pub version: String,
    /// Where the offered version can be obtained; empty alongside `version`.
    pub url: String,
}

impl UpdateCheck {
    /// Returns `true` when the server offered a version.
    pub fn has_update(&self) -> bool {
        !self.version.is_empty()
    }
}
