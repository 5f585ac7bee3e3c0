//! Error types for the update-check client.

/// Top-level error type for the update-check client.
#[derive(Debug, thiserror::Error)]
pub enum OmahaError {
    /// Configuration file or value error.
    #[error("config error: {0}")]
    Config(String),

    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    State(String),

    /// Request encoding or reply decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// Network exchange error.
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, OmahaError>;
