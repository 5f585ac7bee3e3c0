//! # omaha-protocol
//!
//! JSON request builder and response validator for the Omaha
//! update-check protocol (version 3.1).
//!
//! ## Design
//!
//! - One request reports either the one-time install event or an active
//!   ping plus an update check, never both
//! - Replies are validated element by element; any missing or rejected
//!   element is an error so the caller can retry
//! - No I/O: this crate turns values into bytes and bytes into values
//!
//! The crate is deliberately independent of any scheduling or transport
//! concerns so it can be reused by other clients of the same server.

pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod types;

pub use config::ClientIdentity;
pub use error::{ProtocolError, Result};
pub use request::{build_request, encode_request, install_age_days, RequestParams};
pub use response::parse_response;
pub use types::UpdateCheck;
