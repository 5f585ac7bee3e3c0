//! Configuration types for the update-check client.
//!
//! [`OmahaConfig`] is the on-disk TOML document. [`SchedulerConfig`] is the
//! runtime struct the scheduler is constructed with.

use crate::error::{OmahaError, Result};
use crate::platform::{HostProfile, PlatformEligibility};
use crate::request::{INSTALL_SOURCE_ORGANIC, INSTALL_SOURCE_SYSTEM};
use omaha_protocol::ClientIdentity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OmahaConfig {
    /// Check-in cadence and retry timing.
    pub schedule: ScheduleConfig,
    /// Application identity and server.
    pub app: AppConfig,
    /// Which hosts may check in.
    pub platform: PlatformConfig,
    /// Where state is persisted.
    pub storage: StorageConfig,
}

/// Check-in cadence and retry timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minimum time between two registered check-ins.
    pub between_requests_secs: u64,
    /// Retry delay after the first failed delivery.
    pub post_base_delay_secs: u64,
    /// Upper bound for the retry delay.
    pub post_max_delay_secs: u64,
    /// Connect and read timeout for one delivery attempt.
    pub connection_timeout_secs: u64,
    /// How long a "host became active" signal keeps the host counted as
    /// actively in use.
    pub activity_window_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            between_requests_secs: 5 * 3600,
            post_base_delay_secs: 3600,
            post_max_delay_secs: 5 * 3600,
            connection_timeout_secs: 60,
            activity_window_secs: 10 * 60,
        }
    }
}

/// Application identity and server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application id registered with the update server.
    pub app_id: String,
    /// Update server endpoint.
    pub server_url: String,
    /// Version reported as currently installed.
    pub version: String,
    /// Distribution partner code.
    pub brand: String,
    /// Distribution channel tag.
    pub client: String,
    /// UI language.
    pub language: String,
    /// Preloaded on the system image rather than installed by the user.
    pub system_image: bool,
    /// Master switch; `false` turns every activation into a no-op.
    pub updates_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            server_url: String::new(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            brand: String::new(),
            client: String::new(),
            language: "en-US".to_owned(),
            system_image: false,
            updates_enabled: true,
        }
    }
}

/// Which hosts may check in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// OS families allowed to check in.
    pub supported_os: Vec<String>,
    /// Lowest OS version allowed to check in.
    pub min_os_version: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            supported_os: vec!["linux".to_owned(), "macos".to_owned(), "windows".to_owned()],
            min_os_version: None,
        }
    }
}

/// Where state is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Scheduler record.
    pub state_path: PathBuf,
    /// Backoff failure count and last delay.
    pub backoff_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = default_data_dir();
        Self {
            state_path: root.join("omaha-state.json"),
            backoff_path: root.join("omaha-backoff.json"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("omaha")
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

impl OmahaConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| OmahaError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| OmahaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/omaha/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("omaha").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("omaha")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/omaha-config/config.toml")
        }
    }

    /// Checks the values the scheduler cannot work without.
    ///
    /// # Errors
    ///
    /// Returns [`OmahaError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        if s.between_requests_secs == 0 {
            return Err(OmahaError::Config(
                "between_requests_secs must be greater than 0".into(),
            ));
        }
        if s.post_base_delay_secs == 0 || s.connection_timeout_secs == 0 {
            return Err(OmahaError::Config(
                "post_base_delay_secs and connection_timeout_secs must be greater than 0".into(),
            ));
        }
        if s.post_base_delay_secs > s.post_max_delay_secs {
            return Err(OmahaError::Config(
                "post_base_delay_secs must be <= post_max_delay_secs".into(),
            ));
        }
        if self.app.app_id.trim().is_empty() || self.app.server_url.trim().is_empty() {
            return Err(OmahaError::Config(
                "app_id and server_url must be set".into(),
            ));
        }
        Ok(())
    }

    /// Runtime scheduler settings for `host`.
    pub fn scheduler_config(&self, host: HostProfile) -> SchedulerConfig {
        SchedulerConfig {
            between_requests_ms: secs_to_millis(self.schedule.between_requests_secs),
            connection_timeout: Duration::from_secs(self.schedule.connection_timeout_secs),
            updates_enabled: self.app.updates_enabled,
            eligibility: PlatformEligibility {
                supported_os: self.platform.supported_os.clone(),
                min_os_version: self.platform.min_os_version.clone(),
                host,
            },
            current_version: self.app.version.clone(),
            default_install_source: if self.app.system_image {
                INSTALL_SOURCE_SYSTEM.to_owned()
            } else {
                INSTALL_SOURCE_ORGANIC.to_owned()
            },
        }
    }

    /// Retry delay bounds in milliseconds, `(base, max)`.
    pub fn backoff_bounds_ms(&self) -> (i64, i64) {
        (
            secs_to_millis(self.schedule.post_base_delay_secs),
            secs_to_millis(self.schedule.post_max_delay_secs),
        )
    }

    /// Identity block for the wire codec.
    pub fn client_identity(&self, host: &HostProfile) -> ClientIdentity {
        ClientIdentity {
            app_id: self.app.app_id.clone(),
            server_url: self.app.server_url.clone(),
            brand: self.app.brand.clone(),
            client: self.app.client.clone(),
            language: self.app.language.clone(),
            platform: host.os.clone(),
            os_version: host.os_version.clone(),
            arch: host.arch.clone(),
            ..ClientIdentity::default()
        }
    }
}

/// Everything the scheduler needs to know that is not a collaborator.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed inter-request interval; also the staleness threshold and the
    /// skew bound for `nextNewRequestTime`.
    pub between_requests_ms: i64,
    /// Timeout handed to the transport for each send.
    pub connection_timeout: Duration,
    /// Administrative switch.
    pub updates_enabled: bool,
    /// Platform/version predicate.
    pub eligibility: PlatformEligibility,
    /// Version reported to the server and compared against offers.
    pub current_version: String,
    /// Install source used when none has been persisted yet.
    pub default_install_source: String,
}
