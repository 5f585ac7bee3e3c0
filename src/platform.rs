//! Host platform detection and update eligibility.
//!
//! Keep this dependency-free: rely on best-effort OS commands where available.

use crate::version::VersionNumber;
use std::process::Command;

/// Operating system facts that go into requests and eligibility checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    pub os: String,
    pub arch: String,
    pub os_version: String,
}

impl HostProfile {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            os_version: detect_os_version().unwrap_or_default(),
        }
    }
}

fn run_cmd(args: &[&str]) -> Option<String> {
    let (program, rest) = args.split_first()?;
    let out = Command::new(program).args(rest).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8(out.stdout).ok()?;
    let trimmed = s.trim().to_owned();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn detect_os_version() -> Option<String> {
    // macOS: product version, e.g. 14.4.1
    if cfg!(target_os = "macos") {
        return run_cmd(&["sw_vers", "-productVersion"]);
    }
    // Linux: kernel release, e.g. 6.1.0-13-amd64
    if cfg!(target_os = "linux") {
        let release = std::fs::read_to_string("/proc/sys/kernel/osrelease").ok()?;
        let trimmed = release.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_owned());
    }
    if cfg!(target_os = "windows") {
        let out = run_cmd(&["cmd", "/C", "ver"])?;
        // "Microsoft Windows [Version 10.0.22631.3296]"
        let start = out.find("Version ")? + "Version ".len();
        let end = out[start..].find(']').map_or(out.len(), |i| start + i);
        return Some(out[start..end].to_owned());
    }
    None
}

/// Decides whether this host may run update checks at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEligibility {
    /// OS families allowed to check in.
    pub supported_os: Vec<String>,
    /// Lowest OS version allowed to check in, if any.
    pub min_os_version: Option<String>,
    /// The host being judged.
    pub host: HostProfile,
}

impl PlatformEligibility {
    /// Returns `true` when the host OS is supported and, if a minimum is
    /// configured, its version is known and at least that minimum.
    pub fn is_eligible(&self) -> bool {
        if !self
            .supported_os
            .iter()
            .any(|os| os.eq_ignore_ascii_case(&self.host.os))
        {
            return false;
        }

        let Some(min) = self.min_os_version.as_deref() else {
            return true;
        };
        match (
            VersionNumber::parse(&self.host.os_version),
            VersionNumber::parse(min),
        ) {
            (Some(host), Some(min)) => host >= min,
            _ => false,
        }
    }
}
