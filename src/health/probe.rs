//! Transport access used by the default monitor's diagnostics.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::job::JobClient;
use crate::rpc::{DaemonEndpoint, RpcTransport};
use crate::shell::{CommandRunner, ShellSession};
use crate::target::Target;

use super::HealthError;

/// Upper bound on a single diagnostic command.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Future returned by diagnostic probes.
pub type ProbeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, HealthError>> + Send + 'a>>;

/// Read-only access to a target for diagnostics.
pub trait DiagnosticProbe: Send + Sync {
    /// Runs `command` on a shell-capable target and returns its stdout.
    ///
    /// A non-zero exit is reported as [`HealthError::Probe`]. Diagnostics run
    /// on a failure path, so implementations should make one short attempt
    /// rather than reconnect.
    fn shell<'a>(&'a self, target: &'a Target, command: &'a str) -> ProbeFuture<'a, String>;

    /// Asks a daemon-only target's daemon for its version.
    fn daemon_version<'a>(&'a self, target: &'a Target) -> ProbeFuture<'a, String>;
}

/// Probe that reuses the executor's shell session and job client.
#[derive(Debug)]
pub struct TransportProbe<R: CommandRunner, T: RpcTransport> {
    session: Arc<ShellSession<R>>,
    jobs: JobClient<T>,
    daemon_port: u16,
}

impl<R: CommandRunner, T: RpcTransport> TransportProbe<R, T> {
    /// Creates a probe over shared transports.
    #[must_use]
    pub const fn new(session: Arc<ShellSession<R>>, jobs: JobClient<T>, daemon_port: u16) -> Self {
        Self {
            session,
            jobs,
            daemon_port,
        }
    }
}

impl<R, T> DiagnosticProbe for TransportProbe<R, T>
where
    R: CommandRunner + Send + Sync + 'static,
    T: RpcTransport + 'static,
{
    fn shell<'a>(&'a self, target: &'a Target, command: &'a str) -> ProbeFuture<'a, String> {
        Box::pin(async move {
            let snapshot = target.snapshot();
            let address = snapshot.address.ok_or_else(|| HealthError::NoAddress {
                target: target.name().to_owned(),
            })?;
            let session = Arc::clone(&self.session);
            let owned_command = command.to_owned();
            let output = tokio::task::spawn_blocking(move || {
                session.run_once(
                    address,
                    snapshot.credential.as_ref(),
                    &owned_command,
                    Some(PROBE_TIMEOUT),
                )
            })
            .await
            .map_err(|err| probe_error(command, &err))?
            .map_err(|err| probe_error(command, &err))?;

            if output.exit_code != 0 {
                return Err(HealthError::Probe {
                    probe: command.to_owned(),
                    message: format!(
                        "exited with {}: {}",
                        output.exit_code,
                        output.stderr.trim()
                    ),
                });
            }
            Ok(output.stdout)
        })
    }

    fn daemon_version<'a>(&'a self, target: &'a Target) -> ProbeFuture<'a, String> {
        Box::pin(async move {
            let address = target.address().ok_or_else(|| HealthError::NoAddress {
                target: target.name().to_owned(),
            })?;
            let endpoint = DaemonEndpoint::new(address, self.daemon_port);
            self.jobs
                .daemon_version(endpoint)
                .await
                .map_err(|err| probe_error(crate::rpc::protocol::METHOD_VERSION, &err))
        })
    }
}

fn probe_error(probe: &str, err: &impl ToString) -> HealthError {
    HealthError::Probe {
        probe: probe.to_owned(),
        message: err.to_string(),
    }
}
