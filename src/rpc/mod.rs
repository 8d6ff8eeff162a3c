//! JSON-RPC plumbing for talking to the remote execution daemon.
//!
//! [`RpcTransport`] is the seam the job client is written against; the
//! production implementation is [`HttpRpcClient`], tests substitute a
//! scripted transport.

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;

use serde_json::Value;

mod error;
mod http;
pub mod protocol;

pub use error::RpcError;
pub use http::HttpRpcClient;

/// Future returned by RPC transports.
pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RpcError>> + Send + 'a>>;

/// Network location of an execution daemon.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DaemonEndpoint {
    /// Address the daemon listens on.
    pub address: IpAddr,
    /// TCP port the daemon listens on.
    pub port: u16,
}

impl DaemonEndpoint {
    /// Creates an endpoint.
    #[must_use]
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Socket address of the daemon.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// URL the JSON-RPC requests are posted to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}/rpc", self.socket_addr())
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Sends a single JSON-RPC call and returns its `result` member.
pub trait RpcTransport: Send + Sync {
    /// Invokes `method` on the daemon at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] when the request could not be
    /// delivered or answered, and [`RpcError::Fault`] or
    /// [`RpcError::Malformed`] when the daemon answered with something other
    /// than a result.
    fn call<'a>(
        &'a self,
        endpoint: &'a DaemonEndpoint,
        method: &'a str,
        params: Option<Value>,
    ) -> RpcFuture<'a, Value>;
}
