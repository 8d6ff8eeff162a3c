//! Asynchronous job protocol for daemon-only targets.
//!
//! The [`JobClient`] turns single RPC round trips into the submit, poll,
//! fetch and release lifecycle. Poll socket errors are swallowed up to the
//! policy's allowance; daemon faults are raised immediately. The handle is
//! released on every exit path of [`JobClient::run`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use crate::backoff::PollPolicy;
use crate::rpc::protocol::{
    self, OutputResult, PollResult, ReleaseResult, SubmitResult, VersionResult, decode,
};
use crate::rpc::{DaemonEndpoint, RpcError, RpcTransport};

mod types;

pub use types::{Job, JobHandle, JobOutput, JobState};

/// Errors surfaced by the job client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JobError {
    /// The daemon could not be reached.
    #[error("daemon at {endpoint} is unreachable: {message}")]
    Unreachable {
        /// Daemon address and port.
        endpoint: String,
        /// Underlying transport failure.
        message: String,
    },
    /// More consecutive poll socket errors than the allowance permits.
    #[error("job {handle}: {failures} consecutive poll failures: {message}")]
    PollFailures {
        /// Job being polled.
        handle: String,
        /// Consecutive failures observed.
        failures: u32,
        /// Last transport failure.
        message: String,
    },
    /// The job was still pending when its deadline passed.
    #[error("job {handle} still pending after {elapsed:?} (timeout {timeout:?})")]
    Timeout {
        /// Job that timed out.
        handle: String,
        /// Declared deadline.
        timeout: Duration,
        /// Time waited before giving up.
        elapsed: Duration,
    },
    /// The daemon rejected a call or answered outside the protocol.
    #[error("daemon protocol error: {message}")]
    Protocol {
        /// Fault or decoding failure description.
        message: String,
    },
}

impl JobError {
    fn from_rpc(endpoint: &DaemonEndpoint, err: &RpcError) -> Self {
        if err.is_transport() {
            Self::Unreachable {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Protocol {
                message: err.to_string(),
            }
        }
    }
}

/// Drives jobs on execution daemons through an [`RpcTransport`].
#[derive(Debug)]
pub struct JobClient<T: RpcTransport> {
    rpc: Arc<T>,
    policy: PollPolicy,
}

impl<T: RpcTransport> Clone for JobClient<T> {
    fn clone(&self) -> Self {
        Self {
            rpc: Arc::clone(&self.rpc),
            policy: self.policy,
        }
    }
}

impl<T: RpcTransport> JobClient<T> {
    /// Creates a client owning `rpc`.
    #[must_use]
    pub fn new(rpc: T, policy: PollPolicy) -> Self {
        Self::from_shared(Arc::new(rpc), policy)
    }

    /// Creates a client sharing an existing transport.
    #[must_use]
    pub const fn from_shared(rpc: Arc<T>, policy: PollPolicy) -> Self {
        Self { rpc, policy }
    }

    /// Poll cadence and error allowance in effect.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.rpc
    }

    /// Submits `command` and returns the pending job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Unreachable`] on a socket failure and
    /// [`JobError::Protocol`] when the daemon rejects the submission.
    pub async fn submit(
        &self,
        endpoint: DaemonEndpoint,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<Job, JobError> {
        let value = self
            .rpc
            .call(
                &endpoint,
                protocol::METHOD_SUBMIT,
                Some(protocol::submit_params(command)),
            )
            .await
            .map_err(|err| JobError::from_rpc(&endpoint, &err))?;
        let submitted: SubmitResult = decode(protocol::METHOD_SUBMIT, value)
            .map_err(|err| JobError::from_rpc(&endpoint, &err))?;

        let handle = JobHandle::new(submitted.handle);
        debug!(endpoint = %endpoint, handle = %handle, "job submitted");
        Ok(Job {
            handle,
            endpoint,
            command: command.to_owned(),
            submitted_at: Instant::now(),
            timeout,
            backoff: self.policy.backoff(),
            consecutive_errors: 0,
            polls: 0,
        })
    }

    /// Reads the job's state once.
    ///
    /// A socket failure is reported as [`JobState::Pending`] until more than
    /// the allowed number of consecutive failures have been seen.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::PollFailures`] once the allowance is exceeded and
    /// [`JobError::Protocol`] immediately on a daemon fault.
    pub async fn poll(&self, job: &mut Job) -> Result<JobState, JobError> {
        job.polls = job.polls.saturating_add(1);
        let params = protocol::handle_params(job.handle.as_str());
        match self
            .rpc
            .call(&job.endpoint, protocol::METHOD_POLL, Some(params))
            .await
        {
            Ok(value) => {
                job.consecutive_errors = 0;
                let reply: PollResult = decode(protocol::METHOD_POLL, value)
                    .map_err(|err| JobError::from_rpc(&job.endpoint, &err))?;
                let state = JobState::from(reply);
                debug!(handle = %job.handle, poll = job.polls, state = ?state, "job polled");
                Ok(state)
            }
            Err(err) if err.is_transport() => {
                job.consecutive_errors = job.consecutive_errors.saturating_add(1);
                if job.consecutive_errors > self.policy.error_allowance {
                    return Err(JobError::PollFailures {
                        handle: job.handle.to_string(),
                        failures: job.consecutive_errors,
                        message: err.to_string(),
                    });
                }
                warn!(
                    handle = %job.handle,
                    failures = job.consecutive_errors,
                    allowance = self.policy.error_allowance,
                    error = %err,
                    "swallowed poll failure"
                );
                Ok(JobState::Pending)
            }
            Err(err) => Err(JobError::Protocol {
                message: err.to_string(),
            }),
        }
    }

    /// Polls until the job finishes or its deadline passes, then fetches
    /// the output.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Timeout`] when the job is still pending at or
    /// after its deadline, or when a poll is still unanswered as the
    /// deadline passes. Any error raised by [`JobClient::poll`] or the
    /// output fetch is returned as is.
    pub async fn wait_for_completion(&self, job: &mut Job) -> Result<JobOutput, JobError> {
        loop {
            let state = match job.timeout {
                // A daemon that stops answering mid-poll must not hold the
                // caller past the job's deadline.
                Some(limit) => match timeout_at(job.submitted_at + limit, self.poll(job)).await {
                    Ok(state) => state?,
                    Err(_) => {
                        return Err(JobError::Timeout {
                            handle: job.handle.to_string(),
                            timeout: limit,
                            elapsed: job.elapsed(),
                        });
                    }
                },
                None => self.poll(job).await?,
            };
            match state {
                JobState::Done {
                    exit_code,
                    output_available,
                } => {
                    let output = if output_available {
                        self.fetch_output(job).await?
                    } else {
                        String::new()
                    };
                    return Ok(JobOutput {
                        exit_code,
                        output,
                        elapsed: job.elapsed(),
                    });
                }
                JobState::Pending => {
                    let elapsed = job.elapsed();
                    let interval = job.backoff.advance();
                    let pause = match job.timeout {
                        Some(limit) if elapsed >= limit => {
                            return Err(JobError::Timeout {
                                handle: job.handle.to_string(),
                                timeout: limit,
                                elapsed,
                            });
                        }
                        Some(limit) => interval.min(limit.saturating_sub(elapsed)),
                        None => interval,
                    };
                    debug!(handle = %job.handle, pause_ms = pause.as_millis(), "job pending");
                    sleep(pause).await;
                }
            }
        }
    }

    /// Releases the daemon's resources for `job`.
    ///
    /// Best effort: failures are logged and never returned.
    pub async fn cleanup(&self, job: Job) {
        let params = protocol::handle_params(job.handle.as_str());
        let released = self
            .rpc
            .call(&job.endpoint, protocol::METHOD_RELEASE, Some(params))
            .await
            .and_then(|value| decode::<ReleaseResult>(protocol::METHOD_RELEASE, value));
        match released {
            Ok(ReleaseResult { released: true }) => {
                debug!(handle = %job.handle, "job released");
            }
            Ok(ReleaseResult { released: false }) => {
                debug!(handle = %job.handle, "daemon no longer held job");
            }
            Err(err) => {
                warn!(handle = %job.handle, error = %err, "failed to release job");
            }
        }
    }

    /// Submits `command`, waits for it and releases the handle whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the submission error, or the error raised while waiting.
    pub async fn run(
        &self,
        endpoint: DaemonEndpoint,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<JobOutput, JobError> {
        let mut job = self.submit(endpoint, command, timeout).await?;
        let outcome = self.wait_for_completion(&mut job).await;
        self.cleanup(job).await;
        outcome
    }

    /// Asks the daemon for its version.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Unreachable`] or [`JobError::Protocol`] as for
    /// [`JobClient::submit`].
    pub async fn daemon_version(&self, endpoint: DaemonEndpoint) -> Result<String, JobError> {
        let value = self
            .rpc
            .call(&endpoint, protocol::METHOD_VERSION, None)
            .await
            .map_err(|err| JobError::from_rpc(&endpoint, &err))?;
        let reply: VersionResult = decode(protocol::METHOD_VERSION, value)
            .map_err(|err| JobError::from_rpc(&endpoint, &err))?;
        Ok(reply.version)
    }

    /// Returns `true` when the daemon answers a version request.
    pub async fn is_alive(&self, endpoint: DaemonEndpoint) -> bool {
        self.daemon_version(endpoint).await.is_ok()
    }

    async fn fetch_output(&self, job: &Job) -> Result<String, JobError> {
        let params = protocol::handle_params(job.handle.as_str());
        let value = self
            .rpc
            .call(&job.endpoint, protocol::METHOD_OUTPUT, Some(params))
            .await
            .map_err(|err| JobError::from_rpc(&job.endpoint, &err))?;
        let reply: OutputResult = decode(protocol::METHOD_OUTPUT, value)
            .map_err(|err| JobError::from_rpc(&job.endpoint, &err))?;
        Ok(reply.output)
    }
}
