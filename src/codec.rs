//! Turning a pending request into bytes and a reply into an update verdict.

use crate::request::PendingRequest;
use omaha_protocol::{ClientIdentity, ProtocolError, RequestParams, UpdateCheck};

/// Codec failure. Decode failures are retried like transport failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The request could not be encoded.
    #[error("cannot encode request: {0}")]
    Encode(String),

    /// The reply failed protocol validation.
    #[error("invalid reply: {0}")]
    Protocol(#[from] ProtocolError),

    /// The reply was not UTF-8.
    #[error("reply is not UTF-8")]
    NotUtf8,
}

/// Wire codec contract consumed by the scheduler.
pub trait RequestCodec: Send {
    /// Application id the server knows this product by.
    fn app_id(&self) -> &str;

    /// Endpoint requests are POSTed to.
    fn server_endpoint(&self) -> &str;

    /// Serialize `request` with its session and version context.
    fn encode(
        &self,
        session_id: &str,
        version: &str,
        install_age_days: i64,
        request: &PendingRequest,
    ) -> Result<Vec<u8>, CodecError>;

    /// Validate a reply to `request` and extract the offered version and
    /// distribution URL (both empty when nothing is offered).
    fn decode(&self, payload: &[u8], request: &PendingRequest) -> Result<UpdateCheck, CodecError>;
}

/// [`RequestCodec`] speaking the JSON update-check protocol.
#[derive(Debug, Clone)]
pub struct OmahaCodec {
    identity: ClientIdentity,
}

impl OmahaCodec {
    /// # Errors
    ///
    /// Returns [`CodecError::Protocol`] if `identity` fails validation.
    pub fn new(identity: ClientIdentity) -> Result<Self, CodecError> {
        identity.validate()?;
        Ok(Self { identity })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }
}

impl RequestCodec for OmahaCodec {
    fn app_id(&self) -> &str {
        &self.identity.app_id
    }

    fn server_endpoint(&self) -> &str {
        &self.identity.server_url
    }

    fn encode(
        &self,
        session_id: &str,
        version: &str,
        install_age_days: i64,
        request: &PendingRequest,
    ) -> Result<Vec<u8>, CodecError> {
        let params = RequestParams {
            session_id,
            request_id: request.request_id(),
            version,
            install_age_days,
            install_source: request.install_source(),
            send_install_event: request.is_send_install_event(),
        };
        omaha_protocol::encode_request(&self.identity, &params)
            .map(String::into_bytes)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &[u8], request: &PendingRequest) -> Result<UpdateCheck, CodecError> {
        let body = std::str::from_utf8(payload).map_err(|_| CodecError::NotUtf8)?;
        let check = omaha_protocol::parse_response(
            body,
            &self.identity.app_id,
            request.is_send_install_event(),
        )?;
        Ok(check)
    }
}
