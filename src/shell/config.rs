//! Shell transport configuration structures and validation.
//!
//! This module defines [`ShellConfig`] for SSH settings and the reconnect
//! policy. Configuration is loaded via `ortho-config` which merges defaults,
//! configuration files, and environment variables.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::backoff::{ReconnectPolicy, TimingProfile};
use crate::config::ConfigError;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// SSH settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VIGIL_SHELL",
    discovery(
        app_name = "vigil",
        env_var = "VIGIL_CONFIG_PATH",
        config_file_name = "vigil.toml",
        dotfile_name = ".vigil.toml",
        project_file_name = "vigil.toml"
    )
)]
pub struct ShellConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `sshpass` executable used for password credentials.
    #[ortho_config(default = "sshpass".to_owned())]
    pub sshpass_bin: String,
    /// Remote user when a target has no credential.
    #[ortho_config(default = "root".to_owned())]
    pub default_user: String,
    /// TCP port of the SSH server.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Whether to force batch mode for key-based sessions to avoid password
    /// prompts. Password sessions never use batch mode.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; defaults to disabling because
    /// machines under test are reinstalled constantly.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Seconds the SSH client waits for the TCP connection.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
    /// Connection attempts before the target is declared unreachable.
    #[ortho_config(default = 3)]
    pub reconnect_attempts: u32,
    /// Fixed delay between connection attempts, in seconds.
    #[ortho_config(default = 15)]
    pub reconnect_delay_secs: u64,
}

impl ShellConfig {
    /// Built-in defaults, identical to what an empty environment loads.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            sshpass_bin: String::from("sshpass"),
            default_user: String::from("root"),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            connect_timeout_secs: 10,
            reconnect_attempts: 3,
            reconnect_delay_secs: 15,
        }
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails, or
    /// [`ConfigError::Invalid`] when validation rejects a value.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("vigil")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any required field is empty or
    /// out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.sshpass_bin, "sshpass_bin")?;
        Self::require_value(&self.default_user, "default_user")?;
        if self.ssh_port == 0 {
            return Err(ConfigError::invalid("VIGIL_SHELL", "ssh_port", "must be non-zero"));
        }
        if self.reconnect_attempts == 0 {
            return Err(ConfigError::invalid(
                "VIGIL_SHELL",
                "reconnect_attempts",
                "must allow at least one attempt",
            ));
        }
        Ok(())
    }

    /// Reconnect policy with the timing profile applied.
    #[must_use]
    pub fn reconnect_policy(&self, timing: TimingProfile) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect_attempts,
            Duration::from_secs(self.reconnect_delay_secs),
        )
        .scaled(timing)
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid("VIGIL_SHELL", field, "must not be empty"));
        }
        Ok(())
    }
}
