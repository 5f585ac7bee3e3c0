//! Request document construction.

use crate::config::ClientIdentity;
use crate::error::Result;
use crate::types::{
    AppRequest, EventRequest, OsInfo, PingRequest, Request, RequestEnvelope, UpdateCheckRequest,
    EVENT_RESULT_SUCCESS, EVENT_TYPE_INSTALL, INSTALL_AGE_IMMEDIATELY_AFTER_INSTALLING,
    PROTOCOL_VERSION,
};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Per-request values that change between sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams<'a> {
    /// Shared by every request sent during one activation.
    pub session_id: &'a str,
    /// Stable across retries of the same logical request.
    pub request_id: &'a str,
    /// Version of the application being reported.
    pub version: &'a str,
    /// Whole days since install, or `-1` for an install event.
    pub install_age_days: i64,
    /// Provenance tag fixed at first registration.
    pub install_source: &'a str,
    /// Whether this request reports the one-time install event instead of
    /// a ping and update check.
    pub send_install_event: bool,
}

/// Computes the `installage` value for a request.
///
/// Install events always report `-1`. Otherwise the age is the number of
/// whole days between `install_timestamp` and `now`, clamped at zero so a
/// clock that moved backwards never reports a negative age.
pub fn install_age_days(now: i64, install_timestamp: i64, send_install_event: bool) -> i64 {
    if send_install_event {
        INSTALL_AGE_IMMEDIATELY_AFTER_INSTALLING
    } else {
        (now.saturating_sub(install_timestamp) / MS_PER_DAY).max(0)
    }
}

/// Builds the request envelope for `params`.
pub fn build_request(identity: &ClientIdentity, params: &RequestParams<'_>) -> RequestEnvelope {
    let (event, ping, updatecheck) = if params.send_install_event {
        (
            Some(vec![EventRequest {
                eventtype: EVENT_TYPE_INSTALL,
                eventresult: EVENT_RESULT_SUCCESS,
            }]),
            None,
            None,
        )
    } else {
        (
            None,
            Some(PingRequest { active: 1 }),
            Some(UpdateCheckRequest::default()),
        )
    };

    RequestEnvelope {
        request: Request {
            protocol: PROTOCOL_VERSION.to_owned(),
            requestid: params.request_id.to_owned(),
            sessionid: params.session_id.to_owned(),
            installsource: params.install_source.to_owned(),
            ismachine: "0".to_owned(),
            updater: identity.updater.clone(),
            updaterversion: identity.updater_version.clone(),
            os: OsInfo {
                platform: identity.platform.clone(),
                version: identity.os_version.clone(),
                arch: identity.arch.clone(),
            },
            app: vec![AppRequest {
                appid: identity.app_id.clone(),
                version: params.version.to_owned(),
                lang: identity.language.clone(),
                brand: identity.brand.clone(),
                client: identity.client.clone(),
                installage: params.install_age_days,
                event,
                ping,
                updatecheck,
            }],
        },
    }
}

/// Builds and serializes the request for `params`.
///
/// # Errors
///
/// Returns [`crate::ProtocolError::Json`] if serialization fails.
pub fn encode_request(identity: &ClientIdentity, params: &RequestParams<'_>) -> Result<String> {
    let envelope = build_request(identity, params);
    let body = serde_json::to_string(&envelope)?;
    tracing::trace!(
        request_id = params.request_id,
        install_event = params.send_install_event,
        "encoded update request"
    );
    Ok(body)
}
