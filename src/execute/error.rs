//! Caller-visible execution results and errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::health::FailureHint;

/// Outcome of a command that ran to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionResult {
    exit_code: i32,
    output: String,
    elapsed: Duration,
}

impl ExecutionResult {
    pub(crate) const fn new(exit_code: i32, output: String, elapsed: Duration) -> Self {
        Self {
            exit_code,
            output,
            elapsed,
        }
    }

    /// Remote exit status.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Combined captured output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Wall time spent running the command.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns `true` when the command exited zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Consumes the result, returning its output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.output
    }
}

/// Why a target could not be reached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UnreachableReason {
    /// The target has no known address; nothing was attempted.
    NoAddress,
    /// Connecting failed.
    Connection(String),
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAddress => f.write_str("no known address"),
            Self::Connection(message) => f.write_str(message),
        }
    }
}

/// Typed failure of [`Executor::execute`](super::Executor::execute).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecutionError {
    /// No connection could be established.
    #[error("target {target} is unreachable: {reason}")]
    Unreachable {
        /// Target name.
        target: String,
        /// What went wrong.
        reason: UnreachableReason,
    },
    /// The deadline passed while the command was still running.
    #[error("command on {target} timed out after {timeout:?}")]
    Timeout {
        /// Target name.
        target: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The command exited non-zero and success was required.
    #[error("command on {target} exited with {code}")]
    RemoteFailure {
        /// Target name.
        target: String,
        /// Remote exit status.
        code: i32,
        /// Combined captured output.
        output: String,
    },
    /// The daemon or client answered outside the expected protocol.
    #[error("protocol error talking to {target}: {message}")]
    ProtocolError {
        /// Target name.
        target: String,
        /// Failure description.
        message: String,
    },
    /// The execution was cancelled before it finished.
    #[error("execution on {target} was cancelled")]
    Cancelled {
        /// Target name.
        target: String,
    },
}

impl ExecutionError {
    /// Hint passed to the health monitor for this failure.
    #[must_use]
    pub const fn hint(&self) -> FailureHint {
        match self {
            Self::Unreachable { .. } => FailureHint::Unreachable,
            Self::Timeout { .. } => FailureHint::Timeout,
            Self::RemoteFailure { .. } => FailureHint::RemoteFailure,
            Self::ProtocolError { .. } => FailureHint::Protocol,
            Self::Cancelled { .. } => FailureHint::Cancelled,
        }
    }

    /// Returns `true` for the pre-flight failure raised when the target has
    /// no address.
    #[must_use]
    pub const fn is_missing_address(&self) -> bool {
        matches!(
            self,
            Self::Unreachable {
                reason: UnreachableReason::NoAddress,
                ..
            }
        )
    }

    /// Returns `true` when an idempotent command may be attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable {
                reason: UnreachableReason::Connection(_),
                ..
            }
        )
    }

    /// Name of the target the failure concerns.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Unreachable { target, .. }
            | Self::Timeout { target, .. }
            | Self::RemoteFailure { target, .. }
            | Self::ProtocolError { target, .. }
            | Self::Cancelled { target } => target,
        }
    }
}
