//! The two transports the façade dispatches to.

use std::future::Future;
use std::net::IpAddr;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::Instant;

use crate::job::{JobClient, JobError};
use crate::rpc::{DaemonEndpoint, RpcTransport};
use crate::shell::{CommandRunner, ShellError, ShellSession};
use crate::target::{Target, TransportKind};

use super::{ExecutionError, ExecutionResult, UnreachableReason};

/// Future returned by [`Transport::run`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ExecutionResult, ExecutionError>> + Send + 'a>>;

/// Runs one command on one target and reports the raw outcome.
///
/// Implementations do not consult the health monitor or apply
/// `require_success`; the façade does both.
pub trait Transport: Send + Sync {
    /// Transport kind this implementation serves.
    fn kind(&self) -> TransportKind;

    /// Runs `command` on `target` at `address`.
    fn run<'a>(
        &'a self,
        target: &'a Target,
        address: IpAddr,
        command: &'a str,
        timeout: Option<Duration>,
    ) -> TransportFuture<'a>;
}

/// Shell transport running the blocking session on tokio's blocking pool.
#[derive(Debug)]
pub struct ShellTransport<R: CommandRunner> {
    session: Arc<ShellSession<R>>,
}

impl<R: CommandRunner> ShellTransport<R> {
    /// Wraps a shared session.
    #[must_use]
    pub const fn new(session: Arc<ShellSession<R>>) -> Self {
        Self { session }
    }

    /// Shared session.
    #[must_use]
    pub const fn session(&self) -> &Arc<ShellSession<R>> {
        &self.session
    }
}

impl<R: CommandRunner + Send + Sync + 'static> Transport for ShellTransport<R> {
    fn kind(&self) -> TransportKind {
        TransportKind::ShellCapable
    }

    fn run<'a>(
        &'a self,
        target: &'a Target,
        address: IpAddr,
        command: &'a str,
        timeout: Option<Duration>,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let session = Arc::clone(&self.session);
            let credential = target.credential();
            let owned_command = command.to_owned();
            let started = Instant::now();
            let joined = tokio::task::spawn_blocking(move || {
                session.run(address, credential.as_ref(), &owned_command, timeout)
            })
            .await;

            let output = joined
                .map_err(|err| join_error(target, err))?
                .map_err(|err| shell_error(target, &err))?;
            Ok(ExecutionResult::new(
                output.exit_code,
                output.combined(),
                started.elapsed(),
            ))
        })
    }
}

/// Daemon transport driving the job protocol.
#[derive(Debug)]
pub struct DaemonTransport<T: RpcTransport> {
    jobs: JobClient<T>,
    port: u16,
}

impl<T: RpcTransport> DaemonTransport<T> {
    /// Creates a transport talking to daemons on `port`.
    #[must_use]
    pub const fn new(jobs: JobClient<T>, port: u16) -> Self {
        Self { jobs, port }
    }

    /// Job client in use.
    #[must_use]
    pub const fn jobs(&self) -> &JobClient<T> {
        &self.jobs
    }

    /// Daemon port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl<T: RpcTransport> Transport for DaemonTransport<T> {
    fn kind(&self) -> TransportKind {
        TransportKind::DaemonOnly
    }

    fn run<'a>(
        &'a self,
        target: &'a Target,
        address: IpAddr,
        command: &'a str,
        timeout: Option<Duration>,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let endpoint = DaemonEndpoint::new(address, self.port);
            let output = self
                .jobs
                .run(endpoint, command, timeout)
                .await
                .map_err(|err| job_error(target, &err))?;
            Ok(ExecutionResult::new(
                output.exit_code,
                output.output,
                output.elapsed,
            ))
        })
    }
}

fn join_error(target: &Target, err: JoinError) -> ExecutionError {
    match err.try_into_panic() {
        Ok(payload) => panic::resume_unwind(payload),
        Err(_) => ExecutionError::Cancelled {
            target: target.name().to_owned(),
        },
    }
}

fn shell_error(target: &Target, err: &ShellError) -> ExecutionError {
    let name = target.name().to_owned();
    match err {
        ShellError::Unreachable { .. } | ShellError::Spawn { .. } => ExecutionError::Unreachable {
            target: name,
            reason: UnreachableReason::Connection(err.to_string()),
        },
        ShellError::Timeout { timeout, .. } => ExecutionError::Timeout {
            target: name,
            timeout: *timeout,
        },
        ShellError::Io { .. } | ShellError::MissingExitCode { .. } => {
            ExecutionError::ProtocolError {
                target: name,
                message: err.to_string(),
            }
        }
    }
}

fn job_error(target: &Target, err: &JobError) -> ExecutionError {
    let name = target.name().to_owned();
    match err {
        JobError::Unreachable { .. } | JobError::PollFailures { .. } => {
            ExecutionError::Unreachable {
                target: name,
                reason: UnreachableReason::Connection(err.to_string()),
            }
        }
        JobError::Timeout { timeout, .. } => ExecutionError::Timeout {
            target: name,
            timeout: *timeout,
        },
        JobError::Protocol { message } => ExecutionError::ProtocolError {
            target: name,
            message: message.clone(),
        },
    }
}
