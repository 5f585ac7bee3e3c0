//! Response validation.
//!
//! A reply only counts as a successful delivery when every element the
//! request asked about was acknowledged. Anything else is an error, which
//! the caller retries exactly like a network failure.

use crate::error::{ProtocolError, Result};
use crate::types::{
    AppResponse, ResponseEnvelope, UpdateCheck, ACCEPTED_PROTOCOLS, XSSI_PREFIX,
};

const STATUS_OK: &str = "ok";
const STATUS_NO_UPDATE: &str = "noupdate";

/// Parses and validates a reply to a request for `app_id`.
///
/// `expect_install_event` must match the request that produced the reply:
/// install-event replies need an acknowledged event, everything else needs
/// an acknowledged ping and an update check verdict.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing the first element that failed
/// validation.
pub fn parse_response(body: &str, app_id: &str, expect_install_event: bool) -> Result<UpdateCheck> {
    let trimmed = body.trim_start();
    let json = trimmed.strip_prefix(XSSI_PREFIX).unwrap_or(trimmed);

    let envelope: ResponseEnvelope = serde_json::from_str(json)?;
    let response = envelope
        .response
        .ok_or(ProtocolError::MissingElement("response"))?;

    let protocol = response
        .protocol
        .as_deref()
        .ok_or(ProtocolError::MissingElement("protocol"))?;
    if !ACCEPTED_PROTOCOLS.contains(&protocol) {
        return Err(ProtocolError::UnsupportedProtocol(protocol.to_owned()));
    }

    if let Some(elapsed) = response.daystart.as_ref().and_then(|d| d.elapsed_seconds) {
        tracing::trace!(elapsed_seconds = elapsed, "server daystart");
    }

    let app = response
        .app
        .iter()
        .find(|app| {
            app.appid
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(app_id))
        })
        .ok_or_else(|| ProtocolError::AppMismatch(app_id.to_owned()))?;

    check_status(app.status.as_deref(), ProtocolError::AppStatus)?;

    if expect_install_event {
        validate_install_event(app)?;
        return Ok(UpdateCheck::default());
    }

    validate_ping(app)?;
    parse_update_check(app)
}

fn check_status(status: Option<&str>, err: fn(String) -> ProtocolError) -> Result<()> {
    match status {
        Some(STATUS_OK) => Ok(()),
        Some(other) => Err(err(other.to_owned())),
        None => Err(err("<absent>".to_owned())),
    }
}

fn validate_install_event(app: &AppResponse) -> Result<()> {
    let event = app
        .event
        .first()
        .ok_or(ProtocolError::MissingElement("event"))?;
    check_status(event.status.as_deref(), ProtocolError::EventStatus)
}

fn validate_ping(app: &AppResponse) -> Result<()> {
    let ping = app
        .ping
        .as_ref()
        .ok_or(ProtocolError::MissingElement("ping"))?;
    check_status(ping.status.as_deref(), ProtocolError::PingStatus)
}

fn parse_update_check(app: &AppResponse) -> Result<UpdateCheck> {
    let check = app
        .updatecheck
        .as_ref()
        .ok_or(ProtocolError::MissingElement("updatecheck"))?;

    match check.status.as_deref() {
        Some(STATUS_NO_UPDATE) => Ok(UpdateCheck::default()),
        Some(STATUS_OK) => {
            let url = check
                .urls
                .as_ref()
                .and_then(|urls| urls.url.iter().find_map(|u| u.codebase.clone()))
                .filter(|codebase| !codebase.is_empty())
                .ok_or(ProtocolError::MissingElement("urls"))?;
            let version = check
                .manifest
                .as_ref()
                .and_then(|m| m.version.clone())
                .filter(|v| !v.is_empty())
                .ok_or(ProtocolError::MissingElement("manifest"))?;
            Ok(UpdateCheck { version, url })
        }
        Some(other) => Err(ProtocolError::UpdateCheckStatus(other.to_owned())),
        None => Err(ProtocolError::UpdateCheckStatus("<absent>".to_owned())),
    }
}
