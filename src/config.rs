//! Execution configuration loading via `ortho-config`.
//!
//! The surrounding framework owns how values are supplied (configuration
//! files, environment variables); this module defines their meaning and
//! converts them into the policies used by the job client, the façade and
//! the default health monitor.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backoff::{PollPolicy, TimingProfile};
use crate::health::HealthSettings;

/// Default TCP port of the remote execution daemon.
pub const DEFAULT_DAEMON_PORT: u16 = 8936;

/// Execution settings derived from defaults, configuration files, and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VIGIL",
    discovery(
        app_name = "vigil",
        env_var = "VIGIL_CONFIG_PATH",
        config_file_name = "vigil.toml",
        dotfile_name = ".vigil.toml",
        project_file_name = "vigil.toml"
    )
)]
pub struct ExecConfig {
    /// Timeout applied when a caller does not pass one. Unset means commands
    /// may run indefinitely.
    pub default_timeout_secs: Option<u64>,
    /// Port the execution daemon listens on.
    #[ortho_config(default = 8936)]
    pub daemon_port: u16,
    /// Per-request timeout for daemon RPC calls.
    #[ortho_config(default = 30)]
    pub rpc_timeout_secs: u64,
    /// First interval between job polls, in milliseconds.
    #[ortho_config(default = 1000)]
    pub poll_initial_ms: u64,
    /// Cap on the interval between job polls, in milliseconds.
    #[ortho_config(default = 16000)]
    pub poll_max_ms: u64,
    /// Consecutive poll socket errors tolerated before a job fails.
    #[ortho_config(default = 2)]
    pub poll_error_allowance: u32,
    /// Loosens poll intervals, the poll error allowance and reconnect delays
    /// for slow or overloaded environments.
    #[ortho_config(default = false)]
    pub generous_timing: bool,
    /// Multiplier applied when `generous_timing` is enabled.
    #[ortho_config(default = 2)]
    pub timing_multiplier: u32,
    /// Filesystem checked by the default health monitor.
    #[ortho_config(default = "/".to_owned())]
    pub health_filesystem: String,
    /// Usage percentage at or above which the filesystem is reported as full.
    #[ortho_config(default = 95)]
    pub health_disk_threshold_percent: u8,
    /// Background process whose CPU usage the default health monitor checks.
    #[ortho_config(default = "xapi".to_owned())]
    pub health_process: String,
    /// CPU percentage at or above which the process is reported as pinning a
    /// core.
    #[ortho_config(default = 90)]
    pub health_cpu_threshold_percent: u32,
}

/// Errors raised while loading or validating [`ExecConfig`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when a value is missing or out of range.
    #[error("invalid {field}: {reason} (set {env_var} or add {field} to vigil.toml)")]
    Invalid {
        /// Configuration field that failed validation.
        field: String,
        /// Environment variable that overrides the field.
        env_var: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(prefix: &str, field: &str, reason: &str) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            env_var: format!("{prefix}_{}", field.to_uppercase()),
            reason: reason.to_owned(),
        }
    }
}

impl ExecConfig {
    /// Built-in defaults, identical to what an empty environment loads.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            default_timeout_secs: None,
            daemon_port: DEFAULT_DAEMON_PORT,
            rpc_timeout_secs: 30,
            poll_initial_ms: 1000,
            poll_max_ms: 16_000,
            poll_error_allowance: 2,
            generous_timing: false,
            timing_multiplier: 2,
            health_filesystem: String::from("/"),
            health_disk_threshold_percent: 95,
            health_process: String::from("xapi"),
            health_cpu_threshold_percent: 90,
        }
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails, or
    /// [`ConfigError::Invalid`] when validation rejects a value.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("vigil")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that intervals and ports are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon_port == 0 {
            return Err(ConfigError::invalid("VIGIL", "daemon_port", "must be non-zero"));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "VIGIL",
                "rpc_timeout_secs",
                "must be non-zero",
            ));
        }
        if self.poll_initial_ms == 0 {
            return Err(ConfigError::invalid(
                "VIGIL",
                "poll_initial_ms",
                "must be non-zero",
            ));
        }
        if self.poll_max_ms < self.poll_initial_ms {
            return Err(ConfigError::invalid(
                "VIGIL",
                "poll_max_ms",
                "must not be smaller than poll_initial_ms",
            ));
        }
        if self.health_filesystem.trim().is_empty() {
            return Err(ConfigError::invalid(
                "VIGIL",
                "health_filesystem",
                "must not be empty",
            ));
        }
        if self.health_process.trim().is_empty() {
            return Err(ConfigError::invalid(
                "VIGIL",
                "health_process",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Timing profile selected by `generous_timing`.
    #[must_use]
    pub fn timing(&self) -> TimingProfile {
        if self.generous_timing {
            TimingProfile::generous(self.timing_multiplier)
        } else {
            TimingProfile::STANDARD
        }
    }

    /// Poll policy with the timing profile applied.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(self.poll_initial_ms),
            maximum: Duration::from_millis(self.poll_max_ms),
            error_allowance: self.poll_error_allowance,
        }
        .scaled(self.timing())
    }

    /// Timeout applied when callers omit one.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }

    /// Per-request RPC timeout.
    #[must_use]
    pub const fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Thresholds consumed by the default health monitor.
    #[must_use]
    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            filesystem: self.health_filesystem.clone(),
            disk_threshold_percent: self.health_disk_threshold_percent,
            process: self.health_process.clone(),
            cpu_threshold_percent: self.health_cpu_threshold_percent,
        }
    }
}
