//! Wire types for the daemon's JSON-RPC 2.0 interface.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RpcError;

/// Submits a command as a job.
pub const METHOD_SUBMIT: &str = "job.submit";
/// Reads the state of a job.
pub const METHOD_POLL: &str = "job.poll";
/// Fetches a finished job's combined output.
pub const METHOD_OUTPUT: &str = "job.output";
/// Releases the daemon's resources for a job.
pub const METHOD_RELEASE: &str = "job.release";
/// Reports the daemon version; used as a liveness probe.
pub const METHOD_VERSION: &str = "daemon.version";

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier echoed in the response.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Named parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Creates a request envelope.
    #[must_use]
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            method: method.to_owned(),
            params,
        }
    }
}

/// A JSON-RPC response envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Identifier of the request being answered.
    #[serde(default)]
    pub id: Option<u64>,
    /// Result on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default)]
    pub error: Option<RpcFault>,
}

impl RpcResponse {
    /// Extracts the result, turning an error member into
    /// [`RpcError::Fault`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Fault`] when the daemon reported an error and
    /// [`RpcError::Malformed`] when neither member is present.
    pub fn into_result(self, method: &str) -> Result<Value, RpcError> {
        if let Some(fault) = self.error {
            return Err(RpcError::Fault {
                method: method.to_owned(),
                code: fault.code,
                message: fault.message,
            });
        }
        self.result.ok_or_else(|| RpcError::Malformed {
            method: method.to_owned(),
            message: String::from("response carries neither result nor error"),
        })
    }
}

/// A JSON-RPC error object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcFault {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// Result of `job.submit`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResult {
    /// Opaque handle identifying the job on the daemon.
    pub handle: String,
}

/// Result of `job.poll`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollResult {
    /// The job is still running.
    Pending,
    /// The job finished.
    Done {
        /// Exit status of the command.
        exit_code: i32,
        /// Whether `job.output` has output to return.
        #[serde(default)]
        output_available: bool,
    },
}

/// Result of `job.output`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputResult {
    /// Combined standard output and standard error of the job.
    pub output: String,
}

/// Result of `job.release`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseResult {
    /// Whether the daemon still held the job.
    pub released: bool,
}

/// Result of `daemon.version`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionResult {
    /// Daemon version string.
    pub version: String,
}

/// Decodes a `result` member into its typed form.
///
/// # Errors
///
/// Returns [`RpcError::Malformed`] when the value does not match `T`.
pub fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|err| RpcError::Malformed {
        method: method.to_owned(),
        message: err.to_string(),
    })
}

/// Parameters naming a job handle.
#[must_use]
pub fn handle_params(handle: &str) -> Value {
    serde_json::json!({ "handle": handle })
}

/// Parameters for `job.submit`.
#[must_use]
pub fn submit_params(command: &str) -> Value {
    serde_json::json!({ "command": command })
}
