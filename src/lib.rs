//! Remote command execution and liveness core for test harnesses.
//!
//! The crate runs commands on hosts and guests under test through one of two
//! transports: an authenticated `ssh` session for Unix-like systems, or a
//! JSON-RPC job daemon for systems without a shell. [`Executor::execute`]
//! hides the difference, returning a typed [`ExecutionError`] and consulting a
//! [`HealthMonitor`] whenever a call fails.

pub mod backoff;
pub mod config;
pub mod context;
pub mod execute;
pub mod health;
pub mod job;
pub mod rpc;
pub mod shell;
pub mod target;
pub mod test_support;

pub use backoff::{BackoffState, PollPolicy, ReconnectPolicy, TimingProfile};
pub use config::{ConfigError, DEFAULT_DAEMON_PORT, ExecConfig};
pub use context::ExecutionContext;
pub use execute::{
    DaemonTransport, DiscoveryError, ExecuteOptions, ExecutionError, ExecutionResult, Executor,
    ShellTransport, Transport, UnreachableReason,
};
pub use health::{
    DefaultHealthMonitor, FailureHint, Finding, HealthError, HealthMonitor, HealthReport,
    HealthSettings,
};
pub use job::{Job, JobClient, JobError, JobHandle, JobOutput, JobState};
pub use rpc::{DaemonEndpoint, HttpRpcClient, RpcError, RpcTransport};
pub use shell::{ProcessCommandRunner, ShellConfig, ShellError, ShellOutput, ShellSession};
pub use target::{Credential, Secret, Target, TargetSnapshot, TransportKind};
