//! Blocking shell-session transport for shell-capable targets.
//!
//! Every command runs in a fresh `ssh` client process, so a session that hit
//! its deadline is killed with its process and never reused. Connection
//! failures are retried under the fixed-delay [`ReconnectPolicy`]; command
//! failures and timeouts are never retried here.

use std::ffi::OsString;
use std::net::IpAddr;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::{ReconnectPolicy, TimingProfile};
use crate::config::ConfigError;
use crate::target::{Credential, Secret};

mod classify;
mod config;
mod types;

pub use classify::is_connection_failure;
pub use config::{DEFAULT_SSH_PORT, ShellConfig};
pub use types::{CommandOutput, CommandRunner, Invocation, ProcessCommandRunner, ShellOutput};

/// Environment variable `sshpass -e` reads the password from.
const SSHPASS_ENV: &str = "SSHPASS";

/// Errors surfaced by the shell transport.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ShellError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a spawned command cannot be waited on or read from.
    #[error("i/o failure running {program}: {message}")]
    Io {
        /// Command being run.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when no connection could be established within the reconnect
    /// budget.
    #[error("could not connect to {host} after {attempts} attempt(s): {message}")]
    Unreachable {
        /// Host that refused or dropped the connection.
        host: String,
        /// Connection attempts made.
        attempts: u32,
        /// Last diagnostic printed by the SSH client.
        message: String,
    },
    /// Raised when the deadline passes before the remote command exits.
    #[error("command on {host} did not finish within {timeout:?}")]
    Timeout {
        /// Host running the command.
        host: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Raised when the client terminated without an exit status.
    #[error("command on {host} terminated without an exit status")]
    MissingExitCode {
        /// Host running the command.
        host: String,
    },
}

/// Runs commands on shell-capable targets through the system `ssh` client.
#[derive(Clone, Debug)]
pub struct ShellSession<R: CommandRunner> {
    config: ShellConfig,
    runner: R,
    reconnect: ReconnectPolicy,
}

impl ShellSession<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when validation fails.
    pub fn with_process_runner(
        config: ShellConfig,
        timing: TimingProfile,
    ) -> Result<Self, ConfigError> {
        Self::new(config, ProcessCommandRunner, timing)
    }
}

impl<R: CommandRunner> ShellSession<R> {
    /// Creates a new session using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration validation fails.
    pub fn new(config: ShellConfig, runner: R, timing: TimingProfile) -> Result<Self, ConfigError> {
        config.validate()?;
        let reconnect = config.reconnect_policy(timing);
        Ok(Self {
            config,
            runner,
            reconnect,
        })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Returns the reconnect policy in effect.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        self.reconnect
    }

    /// Runs `command` on `address` and blocks until it exits or `timeout`
    /// elapses.
    ///
    /// Connection failures are retried with a fixed delay up to the
    /// configured attempt count. The timeout is a single deadline covering
    /// every attempt and every wait between them; a host still refusing
    /// connections when it passes is reported as unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Unreachable`] when no connection could be made,
    /// [`ShellError::Timeout`] when the deadline passes,
    /// [`ShellError::MissingExitCode`] when the client died without a status,
    /// and spawn or I/O errors from the [`CommandRunner`].
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote shell. Ensure any
    /// caller-provided arguments are validated or quoted upstream.
    pub fn run(
        &self,
        address: IpAddr,
        credential: Option<&Credential>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ShellOutput, ShellError> {
        self.run_with(self.reconnect, address, credential, command, timeout)
    }

    /// Like [`ShellSession::run`] but makes a single connection attempt.
    ///
    /// Used when probing candidate credentials, where a refusal is an answer
    /// rather than a transient failure.
    ///
    /// # Errors
    ///
    /// As for [`ShellSession::run`].
    pub fn run_once(
        &self,
        address: IpAddr,
        credential: Option<&Credential>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ShellOutput, ShellError> {
        let single = ReconnectPolicy::new(1, Duration::ZERO);
        self.run_with(single, address, credential, command, timeout)
    }

    fn run_with(
        &self,
        reconnect: ReconnectPolicy,
        address: IpAddr,
        credential: Option<&Credential>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ShellOutput, ShellError> {
        let host = address.to_string();
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let mut attempt = 0;
        let mut last_refusal: Option<String> = None;

        loop {
            let remaining = match deadline {
                Some((at, limit)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        if let Some(message) = last_refusal {
                            return Err(ShellError::Unreachable {
                                host,
                                attempts: attempt,
                                message,
                            });
                        }
                        return Err(ShellError::Timeout {
                            host,
                            timeout: limit,
                        });
                    }
                    Some(left)
                }
                None => None,
            };
            attempt += 1;

            let invocation = self.invocation(address, credential, command, remaining);
            debug!(
                host = %host,
                attempt,
                command = %invocation.command_string(),
                "running shell command"
            );
            let output = self.runner.run(&invocation)?;

            if output.timed_out {
                return Err(ShellError::Timeout {
                    host,
                    timeout: deadline.map_or(Duration::ZERO, |(_, total)| total),
                });
            }

            if is_connection_failure(&output) {
                let message = output.stderr.trim().to_owned();
                // A wait that would outlast the deadline cannot lead to a
                // connection, so the host is reported unreachable now.
                let next = reconnect.delay_after(attempt).filter(|delay| {
                    deadline.is_none_or(|(at, _)| Instant::now() + *delay < at)
                });
                match next {
                    Some(delay) => {
                        warn!(
                            host = %host,
                            attempt,
                            delay_secs = delay.as_secs(),
                            error = %message,
                            "ssh connection failed, retrying"
                        );
                        thread::sleep(delay);
                        last_refusal = Some(message);
                        continue;
                    }
                    None => {
                        return Err(ShellError::Unreachable {
                            host,
                            attempts: attempt,
                            message,
                        });
                    }
                }
            }

            let Some(exit_code) = output.code else {
                return Err(ShellError::MissingExitCode { host });
            };

            return Ok(ShellOutput {
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
    }

    fn invocation(
        &self,
        address: IpAddr,
        credential: Option<&Credential>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Invocation {
        let ssh_args = self.build_ssh_args(address, credential, command);
        match credential.and_then(|cred| cred.secret.as_ref()) {
            Some(Secret::Password(password)) => {
                let mut args = vec![
                    OsString::from("-e"),
                    OsString::from(self.config.ssh_bin.as_str()),
                ];
                args.extend(ssh_args);
                Invocation {
                    program: self.config.sshpass_bin.clone(),
                    args,
                    secret_env: vec![(SSHPASS_ENV.to_owned(), password.clone())],
                    timeout,
                }
            }
            _ => Invocation {
                program: self.config.ssh_bin.clone(),
                args: ssh_args,
                secret_env: Vec::new(),
                timeout,
            },
        }
    }

    fn build_ssh_args(
        &self,
        address: IpAddr,
        credential: Option<&Credential>,
        command: &str,
    ) -> Vec<OsString> {
        let mut args = self.common_ssh_options(credential);
        let user = credential.map_or(self.config.default_user.as_str(), |cred| {
            cred.username.as_str()
        });
        args.push(OsString::from(format!("{user}@{address}")));
        args.push(OsString::from(command));
        args
    }

    fn common_ssh_options(&self, credential: Option<&Credential>) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout_secs
            )),
            OsString::from("-o"),
            OsString::from("LogLevel=ERROR"),
        ];

        let uses_password = credential.is_some_and(Credential::uses_password);

        if let Some(Secret::IdentityFile(path)) = credential.and_then(|cred| cred.secret.as_ref()) {
            args.push(OsString::from("-i"));
            args.push(OsString::from(path.as_str()));
        }

        if uses_password {
            args.push(OsString::from("-o"));
            args.push(OsString::from(
                "PreferredAuthentications=password,keyboard-interactive",
            ));
        } else if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args
    }
}

#[cfg(test)]
mod tests;
