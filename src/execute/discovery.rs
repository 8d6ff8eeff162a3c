//! Lazy discovery of a target's address and credential.
//!
//! Discovery is kept apart from [`Executor::execute`]: it is the only path
//! that writes to a [`Target`], and it only ever writes a value it has just
//! proven to work. Writing the same value twice is harmless.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::rpc::RpcTransport;
use crate::shell::CommandRunner;
use crate::target::{Credential, Target, TransportKind};

use super::Executor;

/// Connect timeout for each candidate address.
const ADDRESS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for the no-op command used to test a credential.
const CREDENTIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const PROBE_MARKER: &str = "vigil-probe";

/// Errors raised by discovery.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DiscoveryError {
    /// Credential discovery needs an address first.
    #[error("target {target} has no known address")]
    NoAddress {
        /// Target name.
        target: String,
    },
    /// No candidate address accepted a connection.
    #[error(
        "none of {tried} candidate address(es) for {target} accepted a connection on port {port}"
    )]
    NoReachableAddress {
        /// Target name.
        target: String,
        /// Port probed.
        port: u16,
        /// Candidates tried.
        tried: usize,
    },
    /// No candidate credential could run a command.
    #[error("none of {tried} candidate credential(s) for {target} authenticated")]
    NoWorkingCredential {
        /// Target name.
        target: String,
        /// Candidates tried.
        tried: usize,
    },
    /// The target's transport does not use credentials.
    #[error("target {target} uses the {kind} transport, which takes no credential")]
    Unsupported {
        /// Target name.
        target: String,
        /// Transport of the target.
        kind: TransportKind,
    },
}

impl<R, T> Executor<R, T>
where
    R: CommandRunner + Send + Sync + 'static,
    T: RpcTransport + 'static,
{
    /// Returns the target's address, probing `candidates` in order and
    /// storing the first that accepts a TCP connection on the transport's
    /// port when none is known yet.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoReachableAddress`] when every candidate
    /// fails.
    pub async fn discover_address(
        &self,
        ctx: &ExecutionContext,
        target: &Target,
        candidates: &[IpAddr],
    ) -> Result<IpAddr, DiscoveryError> {
        if let Some(known) = target.address() {
            return Ok(known);
        }

        let port = match target.kind() {
            TransportKind::ShellCapable => self.shell.session().config().ssh_port,
            TransportKind::DaemonOnly => self.daemon.port(),
        };
        for candidate in candidates {
            match timeout(ADDRESS_PROBE_TIMEOUT, TcpStream::connect((*candidate, port))).await {
                Ok(Ok(_stream)) => {
                    debug!(
                        run_id = %ctx.run_id(),
                        target = target.name(),
                        address = %candidate,
                        "discovered address"
                    );
                    target.set_address(*candidate);
                    return Ok(*candidate);
                }
                Ok(Err(err)) => {
                    debug!(address = %candidate, port, error = %err, "address probe refused");
                }
                Err(_) => debug!(address = %candidate, port, "address probe timed out"),
            }
        }

        Err(DiscoveryError::NoReachableAddress {
            target: target.name().to_owned(),
            port,
            tried: candidates.len(),
        })
    }

    /// Returns the target's credential, trying `candidates` in order and
    /// storing the first that runs a no-op command when none is known yet.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Unsupported`] for daemon-only targets,
    /// [`DiscoveryError::NoAddress`] when the target has no address, and
    /// [`DiscoveryError::NoWorkingCredential`] when every candidate fails.
    pub async fn discover_credential(
        &self,
        ctx: &ExecutionContext,
        target: &Target,
        candidates: &[Credential],
    ) -> Result<Credential, DiscoveryError> {
        if target.kind() == TransportKind::DaemonOnly {
            return Err(DiscoveryError::Unsupported {
                target: target.name().to_owned(),
                kind: target.kind(),
            });
        }
        if let Some(known) = target.credential() {
            return Ok(known);
        }
        let address = target.address().ok_or_else(|| DiscoveryError::NoAddress {
            target: target.name().to_owned(),
        })?;

        for candidate in candidates {
            let session = Arc::clone(self.shell.session());
            let credential = candidate.clone();
            let probe = tokio::task::spawn_blocking(move || {
                session.run_once(
                    address,
                    Some(&credential),
                    &format!("echo {PROBE_MARKER}"),
                    Some(CREDENTIAL_PROBE_TIMEOUT),
                )
            })
            .await;

            match probe {
                Ok(Ok(output)) if output.exit_code == 0 && output.stdout.contains(PROBE_MARKER) => {
                    debug!(
                        run_id = %ctx.run_id(),
                        target = target.name(),
                        user = %candidate.username,
                        "discovered credential"
                    );
                    target.set_credential(candidate.clone());
                    return Ok(candidate.clone());
                }
                Ok(Ok(output)) => {
                    debug!(
                        user = %candidate.username,
                        exit_code = output.exit_code,
                        "credential probe rejected"
                    );
                }
                Ok(Err(err)) => {
                    debug!(user = %candidate.username, error = %err, "credential probe failed");
                }
                Err(err) => {
                    debug!(user = %candidate.username, error = %err, "credential probe task failed");
                }
            }
        }

        Err(DiscoveryError::NoWorkingCredential {
            target: target.name().to_owned(),
            tried: candidates.len(),
        })
    }
}
