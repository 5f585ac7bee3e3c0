//! Client identity sent with every request.
//!
//! [`ClientIdentity`] describes who is asking: the application id, the
//! distribution channel tags, and the host platform. It is fixed for the
//! lifetime of a process.

use crate::error::ProtocolError;

/// Static description of the client embedded in each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Application id the server knows this product by.
    pub app_id: String,
    /// Endpoint requests are POSTed to.
    pub server_url: String,
    /// Brand code identifying the distribution partner.
    pub brand: String,
    /// Client tag identifying the distribution channel.
    pub client: String,
    /// UI language, BCP 47.
    pub language: String,
    /// Operating system family (`linux`, `macos`, `windows`).
    pub platform: String,
    /// Operating system version string.
    pub os_version: String,
    /// CPU architecture.
    pub arch: String,
    /// Name of the updater component sending the request.
    pub updater: String,
    /// Version of the updater component.
    pub updater_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            server_url: String::new(),
            brand: String::new(),
            client: String::new(),
            language: "en-US".to_owned(),
            platform: std::env::consts::OS.to_owned(),
            os_version: String::new(),
            arch: std::env::consts::ARCH.to_owned(),
            updater: "omaha-rs".to_owned(),
            updater_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl ClientIdentity {
    /// Validates this identity, returning an error if any field is unusable.
    ///
    /// Checks:
    /// - `app_id` must not be empty
    /// - `server_url` must be an `http` or `https` URL
    /// - `language` must not be empty
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.app_id.trim().is_empty() {
            return Err(ProtocolError::Config("app_id must not be empty".into()));
        }
        if !(self.server_url.starts_with("https://") || self.server_url.starts_with("http://")) {
            return Err(ProtocolError::Config(
                "server_url must be an http(s) URL".into(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(ProtocolError::Config("language must not be empty".into()));
        }
        Ok(())
    }
}
