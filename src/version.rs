//! Dotted numeric version comparison and update status.

use std::cmp::Ordering;
use std::fmt;

/// A dotted numeric version such as `1.2.3.4`.
///
/// Missing trailing components compare as zero, so `1.2` == `1.2.0.0`.
/// Any non-numeric suffix on a component (as in kernel releases like
/// `6.1.0-13-amd64`) ends parsing at that component.
#[derive(Debug, Clone, Eq)]
pub struct VersionNumber {
    parts: Vec<u64>,
}

impl VersionNumber {
    /// Parses `s`, returning `None` when it does not start with a number.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for component in s.trim().split('.') {
            let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse::<u64>().ok()?);
            if digits.len() != component.len() {
                break;
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    fn component(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for VersionNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        write!(f, "{}", joined.join("."))
    }
}

/// What the last successful check-in said about newer versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// `true` when the server offered a version newer than the running one.
    pub newer_version_available: bool,
    /// Latest version reported by the server (empty if none).
    pub latest_version: String,
    /// Where the latest version can be obtained (empty if none).
    pub distribution_url: String,
}

impl UpdateStatus {
    /// Compares `latest_version` against `current_version`.
    pub fn evaluate(current_version: &str, latest_version: &str, distribution_url: &str) -> Self {
        let newer = match (
            VersionNumber::parse(current_version),
            VersionNumber::parse(latest_version),
        ) {
            (Some(current), Some(latest)) => latest > current,
            _ => false,
        };
        Self {
            newer_version_available: newer,
            latest_version: latest_version.to_owned(),
            distribution_url: distribution_url.to_owned(),
        }
    }
}
