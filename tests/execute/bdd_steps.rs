//! BDD step definitions for execution behaviour.

use std::time::Duration;

use rstest_bdd_macros::{given, then, when};
use vigil::rpc::protocol::{METHOD_POLL, METHOD_RELEASE};
use vigil::{ExecuteOptions, ExecutionError, FailureHint, TransportKind};

use super::test_helpers::{ExecuteContext, HOST, TargetSpec};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn run(
    execute_context: ExecuteContext,
    command: &str,
    opts: ExecuteOptions,
) -> Result<ExecuteContext, StepError> {
    execute_context
        .run(command.trim(), opts)
        .map_err(|err| StepError::Assertion(err.to_string()))
}

fn failure(execute_context: &ExecuteContext) -> Result<&ExecutionError, StepError> {
    match execute_context.outcome.as_ref() {
        Some(Err(err)) => Ok(err),
        Some(Ok(result)) => Err(StepError::Assertion(format!(
            "expected a failure, got {result:?}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[given("a shell target with an address")]
fn shell_target(mut execute_context: ExecuteContext) -> ExecuteContext {
    execute_context.target = Some(TargetSpec {
        kind: TransportKind::ShellCapable,
        address: Some(HOST),
    });
    execute_context
}

#[given("a shell target without an address")]
fn shell_target_without_address(mut execute_context: ExecuteContext) -> ExecuteContext {
    execute_context.target = Some(TargetSpec {
        kind: TransportKind::ShellCapable,
        address: None,
    });
    execute_context
}

#[given("a daemon target with an address")]
fn daemon_target(mut execute_context: ExecuteContext) -> ExecuteContext {
    execute_context.target = Some(TargetSpec {
        kind: TransportKind::DaemonOnly,
        address: Some(HOST),
    });
    execute_context
}

#[given("the shell answers \"{output}\"")]
fn shell_answers(execute_context: ExecuteContext, output: String) -> ExecuteContext {
    execute_context.runner.push_stdout(output);
    execute_context
}

#[given("the shell exits with {code}")]
fn shell_exits_with(execute_context: ExecuteContext, code: i32) -> ExecuteContext {
    execute_context.runner.push_exit_code(code);
    execute_context
}

#[given("the first connection is refused")]
fn first_connection_refused(execute_context: ExecuteContext) -> ExecuteContext {
    execute_context.runner.push_connection_refused();
    execute_context
}

#[given("the daemon never finishes the job")]
fn daemon_never_finishes(execute_context: ExecuteContext) -> ExecuteContext {
    execute_context.rpc.push_submitted("job-stuck");
    execute_context.rpc.always_pending();
    execute_context.rpc.always_release();
    execute_context
}

#[given("the daemon drops {drops:u32} polls before finishing with \"{output}\"")]
fn daemon_drops_polls(execute_context: ExecuteContext, drops: u32, output: String) -> ExecuteContext {
    execute_context.rpc.push_submitted("job-flaky");
    for _ in 0..drops {
        execute_context.rpc.push_transport_error(METHOD_POLL);
    }
    execute_context.rpc.push_done(0, true);
    execute_context.rpc.push_output(&output);
    execute_context.rpc.always_release();
    execute_context
}

#[when("I execute \"{command}\"")]
fn execute(execute_context: ExecuteContext, command: String) -> Result<ExecuteContext, StepError> {
    run(execute_context, &command, ExecuteOptions::default())
}

#[when("I execute \"{command}\" idempotently")]
fn execute_idempotently(
    execute_context: ExecuteContext,
    command: String,
) -> Result<ExecuteContext, StepError> {
    run(
        execute_context,
        &command,
        ExecuteOptions::default().with_idempotent_retry(),
    )
}

#[when("I execute \"{command}\" requiring success")]
fn execute_requiring_success(
    execute_context: ExecuteContext,
    command: String,
) -> Result<ExecuteContext, StepError> {
    run(
        execute_context,
        &command,
        ExecuteOptions::default().requiring_success(),
    )
}

#[when("I execute \"{command}\" with a timeout of {secs} seconds")]
fn execute_with_timeout(
    execute_context: ExecuteContext,
    command: String,
    secs: u64,
) -> Result<ExecuteContext, StepError> {
    run(
        execute_context,
        &command,
        ExecuteOptions::default().with_timeout(Duration::from_secs(secs)),
    )
}

#[then("the command exits {code} with output \"{output}\"")]
fn command_exits_with_output(
    execute_context: &ExecuteContext,
    code: i32,
    output: String,
) -> Result<(), StepError> {
    let Some(Ok(result)) = execute_context.outcome.as_ref() else {
        return Err(StepError::Assertion(format!(
            "expected success, got {:?}",
            execute_context.outcome
        )));
    };
    if result.exit_code() == code && result.output() == output {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exit {code} with {output:?}, got {result:?}"
        )))
    }
}

#[then("the execution fails as unreachable")]
fn fails_unreachable(execute_context: &ExecuteContext) -> Result<(), StepError> {
    let err = failure(execute_context)?;
    if matches!(err, ExecutionError::Unreachable { .. }) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected unreachable, got {err:?}")))
    }
}

#[then("the execution fails with a timeout")]
fn fails_with_timeout(execute_context: &ExecuteContext) -> Result<(), StepError> {
    let err = failure(execute_context)?;
    if matches!(err, ExecutionError::Timeout { .. }) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected timeout, got {err:?}")))
    }
}

#[then("the execution fails with remote failure code {code}")]
fn fails_with_remote_failure(execute_context: &ExecuteContext, code: i32) -> Result<(), StepError> {
    let err = failure(execute_context)?;
    match err {
        ExecutionError::RemoteFailure { code: actual, .. } if *actual == code => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected remote failure {code}, got {other:?}"
        ))),
    }
}

#[then("the shell was invoked {count} times")]
fn shell_invoked(execute_context: &ExecuteContext, count: usize) -> Result<(), StepError> {
    let actual = execute_context.runner.invocations().len();
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} shell invocations, got {actual}"
        )))
    }
}

#[then("the daemon job was released")]
fn job_released(execute_context: &ExecuteContext) -> Result<(), StepError> {
    let releases = execute_context.rpc.calls_to(METHOD_RELEASE);
    if releases == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one release, got {releases}"
        )))
    }
}

#[then("the health monitor was not consulted")]
fn monitor_not_consulted(execute_context: &ExecuteContext) -> Result<(), StepError> {
    let checks = execute_context.monitor.checks();
    if checks.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no health checks, got {checks:?}"
        )))
    }
}

#[then("the health monitor was consulted once with hint \"{hint}\"")]
fn monitor_consulted_once(execute_context: &ExecuteContext, hint: String) -> Result<(), StepError> {
    let hints: Vec<FailureHint> = execute_context.monitor.hints();
    match hints.as_slice() {
        [only] if only.as_str() == hint.trim() => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected a single {hint} check, got {hints:?}"
        ))),
    }
}
