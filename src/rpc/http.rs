//! HTTP implementation of [`RpcTransport`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::protocol::{RpcRequest, RpcResponse};
use super::{DaemonEndpoint, RpcError, RpcFuture, RpcTransport};

/// Posts JSON-RPC envelopes to `http://<address>:<port>/rpc`.
#[derive(Debug)]
pub struct HttpRpcClient {
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Creates a client whose requests give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(
        &self,
        endpoint: &DaemonEndpoint,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        let request = RpcRequest::new(self.next_request_id(), method, params);
        debug!(endpoint = %endpoint, method, id = request.id, "sending rpc request");

        let response = self
            .http
            .post(endpoint.url())
            .json(&request)
            .send()
            .await
            .map_err(|err| RpcError::Transport {
                method: method.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Fault {
                method: method.to_owned(),
                code: i64::from(status.as_u16()),
                message: format!("daemon returned HTTP status {status}"),
            });
        }

        let body = response.bytes().await.map_err(|err| RpcError::Transport {
            method: method.to_owned(),
            message: err.to_string(),
        })?;
        let envelope: RpcResponse =
            serde_json::from_slice(&body).map_err(|err| RpcError::Malformed {
                method: method.to_owned(),
                message: err.to_string(),
            })?;
        envelope.into_result(method)
    }
}

impl RpcTransport for HttpRpcClient {
    fn call<'a>(
        &'a self,
        endpoint: &'a DaemonEndpoint,
        method: &'a str,
        params: Option<Value>,
    ) -> RpcFuture<'a, Value> {
        Box::pin(self.send(endpoint, method, params))
    }
}
