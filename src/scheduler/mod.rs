//! Update-check session scheduling.
//!
//! Decides, across repeated wake-ups, when to register a check-in, when to
//! (re)send it and when to come back.

pub mod report;
pub mod session;

pub use report::{
    ActivationReport, PostReport, PostResult, Registration, SavedTimestamps, SendOutcome,
    SkipReason,
};
pub use session::{ActivityProbe, SessionScheduler};
