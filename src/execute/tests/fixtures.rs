//! Executor wired to scripted transports and a recording monitor.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use rstest::fixture;

use super::super::*;
use crate::backoff::{PollPolicy, TimingProfile};
use crate::test_support::{RecordingMonitor, ScriptedRpc, ScriptedRunner};

pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

pub struct Harness {
    pub runner: ScriptedRunner,
    pub rpc: ScriptedRpc,
    pub monitor: RecordingMonitor,
    pub executor: Executor<ScriptedRunner, ScriptedRpc>,
}

#[fixture]
pub fn harness() -> Harness {
    harness_with(RecordingMonitor::new(), ExecConfig::standard())
}

pub fn harness_with(monitor: RecordingMonitor, config: ExecConfig) -> Harness {
    let shell = ShellConfig {
        reconnect_attempts: 1,
        reconnect_delay_secs: 0,
        ..ShellConfig::standard()
    };
    let runner = ScriptedRunner::new();
    let rpc = ScriptedRpc::new();
    let session = ShellSession::new(shell, runner.clone(), TimingProfile::STANDARD)
        .expect("shell config should validate");
    let jobs = JobClient::new(rpc.clone(), PollPolicy::default());
    let executor =
        Executor::new(session, jobs, &config).with_monitor(Arc::new(monitor.clone()));
    Harness {
        runner,
        rpc,
        monitor,
        executor,
    }
}

pub fn shell_target() -> Target {
    Target::shell("host-a").with_address(HOST)
}

pub fn daemon_target() -> Target {
    Target::daemon("guest-b").with_address(HOST)
}

pub fn ctx() -> ExecutionContext {
    ExecutionContext::new("suite").child("step")
}
