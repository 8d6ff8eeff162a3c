//! Shared fixtures for shell transport tests.

use std::net::{IpAddr, Ipv4Addr};

use rstest::fixture;

use super::super::*;
use crate::test_support::ScriptedRunner;

pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10));

#[fixture]
pub fn base_config() -> ShellConfig {
    ShellConfig {
        reconnect_delay_secs: 0,
        ..ShellConfig::standard()
    }
}

pub fn session_with(config: ShellConfig, runner: &ScriptedRunner) -> ShellSession<ScriptedRunner> {
    ShellSession::new(config, runner.clone(), TimingProfile::STANDARD)
        .expect("config should validate")
}

pub fn arg_strings(invocation: &Invocation) -> Vec<String> {
    invocation
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}
