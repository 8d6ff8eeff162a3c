//! Shared fixtures and helpers for execution BDD scenarios.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use rstest::fixture;
use vigil::test_support::{RecordingMonitor, ScriptedRpc, ScriptedRunner};
use vigil::{
    ExecConfig, ExecuteOptions, ExecutionError, ExecutionResult, Executor, JobClient, PollPolicy,
    ShellConfig, ShellSession, Target, TimingProfile, TransportKind,
};

pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 30));

#[derive(Clone, Debug)]
pub struct TargetSpec {
    pub kind: TransportKind,
    pub address: Option<IpAddr>,
}

impl TargetSpec {
    pub fn build(&self) -> Target {
        let target = Target::new("scenario-target", self.kind);
        match self.address {
            Some(address) => target.with_address(address),
            None => target,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExecuteContext {
    pub runner: ScriptedRunner,
    pub rpc: ScriptedRpc,
    pub monitor: RecordingMonitor,
    pub target: Option<TargetSpec>,
    pub outcome: Option<Result<ExecutionResult, ExecutionError>>,
}

#[fixture]
pub fn execute_context() -> ExecuteContext {
    ExecuteContext {
        runner: ScriptedRunner::new(),
        rpc: ScriptedRpc::new(),
        monitor: RecordingMonitor::new(),
        target: None,
        outcome: None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteTestError {
    #[error("scenario has no target")]
    MissingTarget,
    #[error("shell configuration rejected: {0}")]
    Config(String),
    #[error("runtime: {0}")]
    Runtime(String),
}

impl ExecuteContext {
    pub fn executor(&self) -> Result<Executor<ScriptedRunner, ScriptedRpc>, ExecuteTestError> {
        let shell = ShellConfig {
            reconnect_attempts: 1,
            reconnect_delay_secs: 0,
            ..ShellConfig::standard()
        };
        let session = ShellSession::new(shell, self.runner.clone(), TimingProfile::STANDARD)
            .map_err(|err| ExecuteTestError::Config(err.to_string()))?;
        let jobs = JobClient::new(self.rpc.clone(), PollPolicy::default());
        Ok(Executor::new(session, jobs, &ExecConfig::standard())
            .with_monitor(Arc::new(self.monitor.clone())))
    }

    pub fn run(
        mut self,
        command: &str,
        opts: ExecuteOptions,
    ) -> Result<Self, ExecuteTestError> {
        let target_spec = self.target.clone().ok_or(ExecuteTestError::MissingTarget)?;
        let executor = self.executor()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .map_err(|err| ExecuteTestError::Runtime(err.to_string()))?;

        let target = target_spec.build();
        let ctx = vigil::ExecutionContext::new("execute.feature");
        let outcome =
            runtime.block_on(async { executor.execute(&ctx, &target, command, opts).await });
        self.outcome = Some(outcome);
        Ok(self)
    }
}
