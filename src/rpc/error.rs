//! Errors raised by RPC transports.

use thiserror::Error;

/// Failure of a single RPC call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RpcError {
    /// The request could not be sent or no answer arrived: connection
    /// refused, reset, or timed out.
    #[error("{method}: transport failure: {message}")]
    Transport {
        /// Method being called.
        method: String,
        /// Underlying error description.
        message: String,
    },
    /// The daemon answered with an error.
    #[error("{method}: daemon fault {code}: {message}")]
    Fault {
        /// Method being called.
        method: String,
        /// JSON-RPC error code, or the HTTP status when the daemon rejected
        /// the request outright.
        code: i64,
        /// Error message reported by the daemon.
        message: String,
    },
    /// The daemon answered with a payload that does not match the protocol.
    #[error("{method}: malformed response: {message}")]
    Malformed {
        /// Method being called.
        method: String,
        /// Decoding failure.
        message: String,
    },
}

impl RpcError {
    /// Returns `true` for socket-level failures that may be transient.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Method the failing call targeted.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Transport { method, .. }
            | Self::Fault { method, .. }
            | Self::Malformed { method, .. } => method,
        }
    }
}
