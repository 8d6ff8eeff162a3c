//! Failure-triggered liveness diagnostics.
//!
//! The execution façade calls a [`HealthMonitor`] once whenever an
//! execution fails. Monitors only observe: they run cheap read-only checks,
//! log what they find and return a [`HealthReport`]. Nothing they return
//! changes the outcome of the failed execution.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use shell_escape::unix::escape;
use thiserror::Error;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::target::{Target, TransportKind};

mod parse;
mod probe;

pub use parse::{parse_df_capacity, parse_ps_cpu};
pub use probe::{DiagnosticProbe, ProbeFuture, TransportProbe};

/// Future returned by health monitors.
pub type HealthFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HealthReport, HealthError>> + Send + 'a>>;

/// What kind of failure triggered the check.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FailureHint {
    /// No connection could be established.
    Unreachable,
    /// The command or job outlived its deadline.
    Timeout,
    /// The command ran and exited non-zero.
    RemoteFailure,
    /// The daemon answered outside the protocol.
    Protocol,
    /// The execution was cancelled locally.
    Cancelled,
    /// Requested explicitly rather than by a failure.
    Manual,
}

impl FailureHint {
    /// Returns `true` when the failure suggests the target is not reachable
    /// at all.
    #[must_use]
    pub const fn is_connectivity(self) -> bool {
        matches!(self, Self::Unreachable)
    }

    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::RemoteFailure => "remote_failure",
            Self::Protocol => "protocol",
            Self::Cancelled => "cancelled",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for FailureHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation made by a monitor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Finding {
    /// Capacity of the watched filesystem.
    DiskUsage {
        /// Filesystem path.
        filesystem: String,
        /// Used capacity in percent.
        used_percent: u8,
        /// Percentage at or above which the filesystem counts as full.
        threshold_percent: u8,
    },
    /// CPU usage of the watched process.
    ProcessCpu {
        /// Process name.
        process: String,
        /// Highest CPU usage among matching processes, in whole percent.
        cpu_percent: u32,
        /// Percentage at or above which the process counts as pinning a core.
        threshold_percent: u32,
    },
    /// The watched process is not running.
    ProcessNotRunning {
        /// Process name.
        process: String,
    },
    /// The daemon answered a version request.
    DaemonAlive {
        /// Reported daemon version.
        version: String,
    },
    /// The daemon did not answer a version request.
    DaemonUnresponsive {
        /// Failure description.
        message: String,
    },
    /// A diagnostic could not be run or its output not understood.
    ProbeFailed {
        /// Name of the check.
        check: String,
        /// Failure description.
        message: String,
    },
    /// Diagnostics were not attempted.
    Skipped {
        /// Why nothing was checked.
        reason: String,
    },
}

impl Finding {
    /// Returns `true` when the finding indicates an unhealthy target.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        match self {
            Self::DiskUsage {
                used_percent,
                threshold_percent,
                ..
            } => used_percent >= threshold_percent,
            Self::ProcessCpu {
                cpu_percent,
                threshold_percent,
                ..
            } => cpu_percent >= threshold_percent,
            Self::DaemonUnresponsive { .. } => true,
            Self::ProcessNotRunning { .. }
            | Self::DaemonAlive { .. }
            | Self::ProbeFailed { .. }
            | Self::Skipped { .. } => false,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiskUsage {
                filesystem,
                used_percent,
                threshold_percent,
            } => write!(
                f,
                "filesystem {filesystem} is {used_percent}% full (threshold {threshold_percent}%)"
            ),
            Self::ProcessCpu {
                process,
                cpu_percent,
                threshold_percent,
            } => write!(
                f,
                "process {process} uses {cpu_percent}% CPU (threshold {threshold_percent}%)"
            ),
            Self::ProcessNotRunning { process } => write!(f, "process {process} is not running"),
            Self::DaemonAlive { version } => write!(f, "daemon alive, version {version}"),
            Self::DaemonUnresponsive { message } => write!(f, "daemon unresponsive: {message}"),
            Self::ProbeFailed { check, message } => write!(f, "{check} check failed: {message}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Findings collected for one target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HealthReport {
    /// Name of the inspected target.
    pub target: String,
    /// Failure that triggered the check.
    pub hint: FailureHint,
    /// Observations in the order they were made.
    pub findings: Vec<Finding>,
}

impl HealthReport {
    /// Returns `true` when any finding is a warning.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.findings.iter().any(Finding::is_warning)
    }
}

/// Errors raised while running diagnostics.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HealthError {
    /// The target has no address to probe.
    #[error("target {target} has no known address")]
    NoAddress {
        /// Target name.
        target: String,
    },
    /// A diagnostic command or request failed.
    #[error("probe `{probe}` failed: {message}")]
    Probe {
        /// Command or request that failed.
        probe: String,
        /// Failure description.
        message: String,
    },
}

/// Hook the façade consults after a failed execution.
///
/// Implementations must not retry the failed command. Errors they return and
/// panics they raise are logged by the caller and otherwise ignored.
pub trait HealthMonitor: Send + Sync {
    /// Inspects `target` after a failure described by `hint`.
    fn check<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        target: &'a Target,
        hint: FailureHint,
    ) -> HealthFuture<'a>;
}

/// Thresholds for the [`DefaultHealthMonitor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HealthSettings {
    /// Filesystem whose capacity is checked.
    pub filesystem: String,
    /// Capacity at or above which a warning is logged.
    pub disk_threshold_percent: u8,
    /// Background process whose CPU usage is checked.
    pub process: String,
    /// CPU usage at or above which a warning is logged.
    pub cpu_threshold_percent: u32,
}

/// Checks filesystem capacity and background-process CPU on shell targets,
/// and daemon liveness on daemon-only targets.
#[derive(Debug)]
pub struct DefaultHealthMonitor<P: DiagnosticProbe> {
    probe: P,
    settings: HealthSettings,
}

impl<P: DiagnosticProbe> DefaultHealthMonitor<P> {
    /// Creates a monitor that runs its diagnostics through `probe`.
    #[must_use]
    pub const fn new(probe: P, settings: HealthSettings) -> Self {
        Self { probe, settings }
    }

    /// Thresholds in effect.
    #[must_use]
    pub const fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    async fn inspect(&self, target: &Target, hint: FailureHint) -> Vec<Finding> {
        if hint.is_connectivity() {
            return vec![Finding::Skipped {
                reason: String::from("target is unreachable"),
            }];
        }
        if target.address().is_none() {
            return vec![Finding::Skipped {
                reason: String::from("target has no known address"),
            }];
        }
        match target.kind() {
            TransportKind::ShellCapable => {
                vec![self.disk_usage(target).await, self.process_cpu(target).await]
            }
            TransportKind::DaemonOnly => vec![self.daemon_liveness(target).await],
        }
    }

    async fn disk_usage(&self, target: &Target) -> Finding {
        let command = format!("df -P {}", escape(self.settings.filesystem.as_str().into()));
        match self.probe.shell(target, &command).await {
            Ok(stdout) => match parse_df_capacity(&stdout) {
                Some(used_percent) => Finding::DiskUsage {
                    filesystem: self.settings.filesystem.clone(),
                    used_percent,
                    threshold_percent: self.settings.disk_threshold_percent,
                },
                None => Finding::ProbeFailed {
                    check: String::from("disk"),
                    message: format!("unrecognised df output: {}", stdout.trim()),
                },
            },
            Err(err) => Finding::ProbeFailed {
                check: String::from("disk"),
                message: err.to_string(),
            },
        }
    }

    async fn process_cpu(&self, target: &Target) -> Finding {
        // `ps -C` exits 1 when nothing matches; an empty listing is the signal.
        let command = format!(
            "ps -C {} -o %cpu= || true",
            escape(self.settings.process.as_str().into())
        );
        match self.probe.shell(target, &command).await {
            Ok(stdout) => match parse_ps_cpu(&stdout) {
                Some(cpu_percent) => Finding::ProcessCpu {
                    process: self.settings.process.clone(),
                    cpu_percent,
                    threshold_percent: self.settings.cpu_threshold_percent,
                },
                None => Finding::ProcessNotRunning {
                    process: self.settings.process.clone(),
                },
            },
            Err(err) => Finding::ProbeFailed {
                check: String::from("cpu"),
                message: err.to_string(),
            },
        }
    }

    async fn daemon_liveness(&self, target: &Target) -> Finding {
        match self.probe.daemon_version(target).await {
            Ok(version) => Finding::DaemonAlive { version },
            Err(err) => Finding::DaemonUnresponsive {
                message: err.to_string(),
            },
        }
    }
}

impl<P: DiagnosticProbe> HealthMonitor for DefaultHealthMonitor<P> {
    fn check<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        target: &'a Target,
        hint: FailureHint,
    ) -> HealthFuture<'a> {
        Box::pin(async move {
            let findings = self.inspect(target, hint).await;
            for finding in &findings {
                if finding.is_warning() {
                    warn!(
                        run_id = %ctx.run_id(),
                        target = target.name(),
                        hint = %hint,
                        "{finding}"
                    );
                } else {
                    info!(
                        run_id = %ctx.run_id(),
                        target = target.name(),
                        hint = %hint,
                        "{finding}"
                    );
                }
            }
            Ok(HealthReport {
                target: target.name().to_owned(),
                hint,
                findings,
            })
        })
    }
}
