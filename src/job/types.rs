//! Job records tracked by the poll loop.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::backoff::BackoffState;
use crate::rpc::DaemonEndpoint;
use crate::rpc::protocol::PollResult;

/// Opaque job identifier issued by the daemon.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wraps a daemon-issued handle.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Borrows the raw handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observed state of a job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    /// Still running, or a swallowed poll failure.
    Pending,
    /// Finished on the daemon.
    Done {
        /// Exit status of the command.
        exit_code: i32,
        /// Whether the daemon holds output for the job.
        output_available: bool,
    },
}

impl From<PollResult> for JobState {
    fn from(value: PollResult) -> Self {
        match value {
            PollResult::Pending => Self::Pending,
            PollResult::Done {
                exit_code,
                output_available,
            } => Self::Done {
                exit_code,
                output_available,
            },
        }
    }
}

/// One in-flight command on a daemon.
///
/// A `Job` is only mutated by the poll loop and is consumed by
/// [`JobClient::cleanup`](super::JobClient::cleanup), so a handle can be
/// released at most once.
#[derive(Debug)]
pub struct Job {
    pub(super) handle: JobHandle,
    pub(super) endpoint: DaemonEndpoint,
    pub(super) command: String,
    pub(super) submitted_at: Instant,
    pub(super) timeout: Option<Duration>,
    pub(super) backoff: BackoffState,
    pub(super) consecutive_errors: u32,
    pub(super) polls: u32,
}

impl Job {
    /// Daemon-issued handle.
    #[must_use]
    pub const fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Daemon the job runs on.
    #[must_use]
    pub const fn endpoint(&self) -> DaemonEndpoint {
        self.endpoint
    }

    /// Command text as submitted.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Time the daemon accepted the job.
    #[must_use]
    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Declared deadline, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Wall time since submission.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Interval the next pending poll will wait for.
    #[must_use]
    pub const fn current_interval(&self) -> Duration {
        self.backoff.current()
    }

    /// Poll requests issued so far.
    #[must_use]
    pub const fn polls(&self) -> u32 {
        self.polls
    }
}

/// Terminal result of a finished job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobOutput {
    /// Exit status of the command.
    pub exit_code: i32,
    /// Combined output fetched from the daemon.
    pub output: String,
    /// Wall time from submission to completion.
    pub elapsed: Duration,
}
