//! Omaha: background update-check client.
//!
//! Decides, across repeated wake-ups of a long-lived process, when to
//! register a check-in with the update server, when to deliver it, how to
//! back off after failures, and what to persist so the sequence survives
//! restarts.
//!
//! # Architecture
//!
//! - **SessionScheduler**: one run-to-completion pass per activation
//! - **PersistentState**: restore/save with clock-skew clamping
//! - **BackoffPolicy**: doubling retry delay, reset on success
//! - **RequestCodec** / **Transport**: wire format and network exchange
//! - **WakeupDelegate**: replace-semantics re-activation timer
//! - **SchedulerService**: serialises activations on a tokio runtime

pub mod activity;
pub mod backoff;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod platform;
pub mod request;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod store;
pub mod transport;
pub mod version;
pub mod wakeup;

pub use activity::ActivityTracker;
pub use backoff::{BackoffPolicy, BackoffState, ExponentialBackoff};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CodecError, OmahaCodec, RequestCodec};
pub use config::{OmahaConfig, SchedulerConfig};
pub use error::{OmahaError, Result};
pub use platform::{HostProfile, PlatformEligibility};
pub use request::{IdGenerator, PendingRequest};
pub use scheduler::{ActivationReport, ActivityProbe, PostResult, SessionScheduler, SkipReason};
pub use service::{SchedulerService, Trigger, build_scheduler};
pub use state::{PersistentState, StoredRecord};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use transport::{HttpTransport, PostRequest, Transport, TransportError};
pub use version::{UpdateStatus, VersionNumber};
pub use wakeup::{ManualWakeup, TokioWakeup, WakeupDelegate};
