//! The execution façade.
//!
//! [`Executor::execute`] is the one call a caller makes to run a command on
//! a [`Target`], whichever transport the target needs:
//!
//! 1. A target without an address fails at once with
//!    [`ExecutionError::Unreachable`]; the health monitor is not consulted.
//! 2. The target's [`TransportKind`] selects the shell or daemon transport.
//! 3. With [`ExecuteOptions::require_success`], a non-zero exit becomes
//!    [`ExecutionError::RemoteFailure`].
//! 4. With [`ExecuteOptions::idempotent_retry`], a first attempt that failed
//!    with a connection error is repeated once.
//! 5. If the call still fails, the health monitor runs exactly once before
//!    the error is returned. Its errors and panics are logged and dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{Instrument, debug, info_span, warn};

use crate::config::{ConfigError, ExecConfig};
use crate::context::ExecutionContext;
use crate::health::{DefaultHealthMonitor, FailureHint, HealthMonitor, TransportProbe};
use crate::job::JobClient;
use crate::rpc::{HttpRpcClient, RpcTransport};
use crate::shell::{CommandRunner, ProcessCommandRunner, ShellConfig, ShellSession};
use crate::target::{Target, TransportKind};

/// Longest a health check may hold up the failure it is diagnosing.
const MONITOR_BUDGET: Duration = Duration::from_secs(25);

mod discovery;
mod error;
mod transport;

pub use discovery::DiscoveryError;
pub use error::{ExecutionError, ExecutionResult, UnreachableReason};
pub use transport::{DaemonTransport, ShellTransport, Transport, TransportFuture};

/// Per-call options for [`Executor::execute`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExecuteOptions {
    /// Deadline for the command; falls back to the configured default.
    pub timeout: Option<Duration>,
    /// Treat a non-zero exit as [`ExecutionError::RemoteFailure`].
    pub require_success: bool,
    /// Allow one repeat of the whole attempt after a connection failure.
    pub idempotent_retry: bool,
}

impl ExecuteOptions {
    /// Sets the deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requires a zero exit status.
    #[must_use]
    pub const fn requiring_success(mut self) -> Self {
        self.require_success = true;
        self
    }

    /// Marks the command as safe to repeat after a connection failure.
    #[must_use]
    pub const fn with_idempotent_retry(mut self) -> Self {
        self.idempotent_retry = true;
        self
    }
}

/// Runs commands on targets of either transport kind.
pub struct Executor<R: CommandRunner, T: RpcTransport> {
    shell: ShellTransport<R>,
    daemon: DaemonTransport<T>,
    monitor: Arc<dyn HealthMonitor>,
    default_timeout: Option<Duration>,
}

impl Executor<ProcessCommandRunner, HttpRpcClient> {
    /// Builds an executor over the system `ssh` client and HTTP JSON-RPC.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when either configuration fails
    /// validation.
    pub fn from_config(exec: &ExecConfig, shell: ShellConfig) -> Result<Self, ConfigError> {
        exec.validate()?;
        let session = ShellSession::with_process_runner(shell, exec.timing())?;
        let jobs = JobClient::new(HttpRpcClient::new(exec.rpc_timeout()), exec.poll_policy());
        Ok(Self::new(session, jobs, exec))
    }
}

impl<R, T> Executor<R, T>
where
    R: CommandRunner + Send + Sync + 'static,
    T: RpcTransport + 'static,
{
    /// Creates an executor with the default health monitor.
    #[must_use]
    pub fn new(session: ShellSession<R>, jobs: JobClient<T>, config: &ExecConfig) -> Self {
        let shared = Arc::new(session);
        let probe = TransportProbe::new(Arc::clone(&shared), jobs.clone(), config.daemon_port);
        let monitor = DefaultHealthMonitor::new(probe, config.health_settings());
        Self {
            shell: ShellTransport::new(shared),
            daemon: DaemonTransport::new(jobs, config.daemon_port),
            monitor: Arc::new(monitor),
            default_timeout: config.default_timeout(),
        }
    }

    /// Replaces the health monitor.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<dyn HealthMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Overrides the deadline used when callers pass none.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Health monitor in use.
    #[must_use]
    pub fn monitor(&self) -> &Arc<dyn HealthMonitor> {
        &self.monitor
    }

    /// Runs `command` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] describing why the command did not run to
    /// an acceptable completion.
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        target: &Target,
        command: &str,
        opts: ExecuteOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let span = info_span!(
            "execute",
            run_id = %ctx.run_id(),
            label = ctx.label(),
            target = target.name(),
            kind = %target.kind(),
        );
        self.execute_in_span(ctx, target, command, opts)
            .instrument(span)
            .await
    }

    async fn execute_in_span(
        &self,
        ctx: &ExecutionContext,
        target: &Target,
        command: &str,
        opts: ExecuteOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let timeout = opts.timeout.or(self.default_timeout);
        let first = self.attempt(target, command, timeout, opts).await;

        let outcome = match first {
            Err(err) if opts.idempotent_retry && err.is_retryable() => {
                warn!(error = %err, "connection failed, retrying idempotent command once");
                self.attempt(target, command, timeout, opts).await
            }
            other => other,
        };

        match &outcome {
            Ok(result) => {
                debug!(
                    exit_code = result.exit_code(),
                    elapsed_ms = result.elapsed().as_millis(),
                    "command finished"
                );
            }
            Err(err) if err.is_missing_address() => {
                debug!(error = %err, "target has no address");
            }
            Err(err) => {
                debug!(error = %err, "command failed");
                self.consult_monitor(ctx, target, err.hint()).await;
            }
        }
        outcome
    }

    async fn attempt(
        &self,
        target: &Target,
        command: &str,
        timeout: Option<Duration>,
        opts: ExecuteOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let Some(address) = target.address() else {
            return Err(ExecutionError::Unreachable {
                target: target.name().to_owned(),
                reason: UnreachableReason::NoAddress,
            });
        };

        let result = self
            .transport(target.kind())
            .run(target, address, command, timeout)
            .await?;

        if opts.require_success && !result.is_success() {
            return Err(ExecutionError::RemoteFailure {
                target: target.name().to_owned(),
                code: result.exit_code(),
                output: result.into_output(),
            });
        }
        Ok(result)
    }

    fn transport(&self, kind: TransportKind) -> &dyn Transport {
        match kind {
            TransportKind::ShellCapable => &self.shell,
            TransportKind::DaemonOnly => &self.daemon,
        }
    }

    async fn consult_monitor(&self, ctx: &ExecutionContext, target: &Target, hint: FailureHint) {
        let started = panic::catch_unwind(AssertUnwindSafe(|| {
            self.monitor.check(ctx, target, hint)
        }));
        let outcome = match started {
            Ok(check) => {
                match tokio::time::timeout(MONITOR_BUDGET, AssertUnwindSafe(check).catch_unwind())
                    .await
                {
                    Ok(finished) => finished,
                    Err(_) => {
                        warn!(
                            hint = %hint,
                            budget_secs = MONITOR_BUDGET.as_secs(),
                            "health monitor abandoned"
                        );
                        return;
                    }
                }
            }
            Err(payload) => Err(payload),
        };
        match outcome {
            Ok(Ok(report)) => {
                debug!(
                    hint = %hint,
                    findings = report.findings.len(),
                    warnings = report.has_warnings(),
                    "health check complete"
                );
            }
            Ok(Err(err)) => warn!(hint = %hint, error = %err, "health monitor failed"),
            Err(_) => warn!(hint = %hint, "health monitor panicked"),
        }
    }
}

#[cfg(test)]
mod tests;
