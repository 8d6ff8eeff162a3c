//! Dispatch, retry and monitor behaviour of `Executor::execute`.

use std::time::Duration;

use rstest::rstest;

use super::super::*;
use super::fixtures::{Harness, HOST, ctx, daemon_target, harness, harness_with, shell_target};
use crate::rpc::protocol;
use crate::test_support::RecordingMonitor;

#[rstest]
#[tokio::test]
async fn target_without_address_fails_without_monitor(harness: Harness) {
    let target = Target::shell("unaddressed");

    let err = harness
        .executor
        .execute(&ctx(), &target, "true", ExecuteOptions::default())
        .await
        .expect_err("no address");

    assert!(err.is_missing_address(), "{err:?}");
    assert_eq!(err.target(), "unaddressed");
    assert!(harness.runner.invocations().is_empty());
    assert!(harness.monitor.checks().is_empty());
}

#[rstest]
#[tokio::test]
async fn missing_address_is_not_retried(harness: Harness) {
    let target = Target::daemon("unaddressed");
    let opts = ExecuteOptions::default().with_idempotent_retry();

    harness
        .executor
        .execute(&ctx(), &target, "true", opts)
        .await
        .expect_err("no address");

    assert!(harness.rpc.calls().is_empty());
    assert!(harness.monitor.checks().is_empty());
}

#[rstest]
#[tokio::test]
async fn shell_command_returns_combined_output(harness: Harness) {
    harness.runner.push_output(Some(0), "Linux\n", "note\n");

    let result = harness
        .executor
        .execute(&ctx(), &shell_target(), "uname", ExecuteOptions::default())
        .await
        .expect("command runs");

    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.output(), "Linux\nnote\n");
    assert!(harness.rpc.calls().is_empty());
    assert!(harness.monitor.checks().is_empty());
}

#[rstest]
#[tokio::test]
async fn non_zero_exit_is_a_result_unless_success_is_required(harness: Harness) {
    harness.runner.push_exit_code(3);

    let result = harness
        .executor
        .execute(&ctx(), &shell_target(), "false", ExecuteOptions::default())
        .await
        .expect("non-zero exit is still a completed command");

    assert_eq!(result.exit_code(), 3);
    assert!(!result.is_success());
    assert!(harness.monitor.checks().is_empty());
}

#[rstest]
#[tokio::test]
async fn required_success_turns_exit_into_remote_failure(harness: Harness) {
    harness.runner.push_output(Some(1), "", "no such file\n");
    let opts = ExecuteOptions::default().requiring_success();

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "cat /missing", opts)
        .await
        .expect_err("exit 1 must fail");

    assert_eq!(
        err,
        ExecutionError::RemoteFailure {
            target: String::from("host-a"),
            code: 1,
            output: String::from("no such file\n"),
        }
    );
    assert_eq!(harness.monitor.hints(), vec![FailureHint::RemoteFailure]);
}

#[rstest]
#[tokio::test]
async fn idempotent_command_is_retried_after_connection_failure(harness: Harness) {
    harness.runner.push_connection_refused();
    harness.runner.push_stdout("ok\n");
    let opts = ExecuteOptions::default().with_idempotent_retry();

    let result = harness
        .executor
        .execute(&ctx(), &shell_target(), "uptime", opts)
        .await
        .expect("second attempt succeeds");

    assert_eq!(result.output(), "ok\n");
    assert_eq!(harness.runner.invocations().len(), 2);
    assert!(
        harness.monitor.checks().is_empty(),
        "recovered call must not consult the monitor"
    );
}

#[rstest]
#[tokio::test]
async fn idempotent_retry_happens_at_most_once(harness: Harness) {
    harness.runner.push_connection_refused();
    harness.runner.push_connection_refused();
    harness.runner.push_stdout("never reached\n");
    let opts = ExecuteOptions::default().with_idempotent_retry();

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "uptime", opts)
        .await
        .expect_err("both attempts fail");

    assert!(err.is_retryable(), "{err:?}");
    assert_eq!(harness.runner.invocations().len(), 2);
    assert_eq!(harness.monitor.hints(), vec![FailureHint::Unreachable]);
}

#[rstest]
#[tokio::test]
async fn connection_failure_without_retry_flag_is_returned(harness: Harness) {
    harness.runner.push_connection_refused();
    harness.runner.push_stdout("never reached\n");

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "reboot", ExecuteOptions::default())
        .await
        .expect_err("non-idempotent command fails");

    assert!(matches!(err, ExecutionError::Unreachable { .. }), "{err:?}");
    assert_eq!(harness.runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test]
async fn timeout_is_not_retried(harness: Harness) {
    harness.runner.push_timeout();
    harness.runner.push_stdout("never reached\n");
    let opts = ExecuteOptions::default()
        .with_idempotent_retry()
        .with_timeout(Duration::from_secs(5));

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "sleep 60", opts)
        .await
        .expect_err("deadline passes");

    assert_eq!(
        err,
        ExecutionError::Timeout {
            target: String::from("host-a"),
            timeout: Duration::from_secs(5),
        }
    );
    assert_eq!(harness.runner.invocations().len(), 1);
    assert_eq!(harness.monitor.hints(), vec![FailureHint::Timeout]);
}

#[rstest]
#[tokio::test]
async fn spawn_failure_is_reported_as_unreachable(harness: Harness) {
    harness.runner.push_spawn_error("ssh: not found");

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "true", ExecuteOptions::default())
        .await
        .expect_err("client missing");

    assert!(err.is_retryable(), "{err:?}");
}

#[rstest]
#[tokio::test]
async fn missing_exit_code_is_a_protocol_error(harness: Harness) {
    harness.runner.push_missing_exit_code();

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "true", ExecuteOptions::default())
        .await
        .expect_err("killed client");

    assert!(matches!(err, ExecutionError::ProtocolError { .. }), "{err:?}");
    assert_eq!(harness.monitor.hints(), vec![FailureHint::Protocol]);
}

#[rstest]
#[case::failing(RecordingMonitor::failing())]
#[case::panicking(RecordingMonitor::panicking())]
#[tokio::test]
async fn misbehaving_monitor_never_replaces_the_error(#[case] monitor: RecordingMonitor) {
    let harness = harness_with(monitor, ExecConfig::standard());
    harness.runner.push_exit_code(2);
    let opts = ExecuteOptions::default().requiring_success();

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "false", opts)
        .await
        .expect_err("exit 2 must fail");

    assert!(
        matches!(err, ExecutionError::RemoteFailure { code: 2, .. }),
        "{err:?}"
    );
    assert_eq!(harness.monitor.checks().len(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_monitor_is_abandoned_after_its_budget() {
    let harness = harness_with(RecordingMonitor::hanging(), ExecConfig::standard());
    harness.runner.push_exit_code(2);
    let opts = ExecuteOptions::default().requiring_success();
    let started = tokio::time::Instant::now();

    let err = harness
        .executor
        .execute(&ctx(), &shell_target(), "false", opts)
        .await
        .expect_err("exit 2 must fail");

    assert!(
        matches!(err, ExecutionError::RemoteFailure { code: 2, .. }),
        "{err:?}"
    );
    let waited = started.elapsed();
    assert!(
        waited >= MONITOR_BUDGET && waited < MONITOR_BUDGET + Duration::from_secs(1),
        "waited {waited:?}"
    );
    assert_eq!(harness.monitor.checks().len(), 1);
}

#[rstest]
#[tokio::test]
async fn monitor_receives_the_callers_context(harness: Harness) {
    harness.runner.push_connection_refused();

    harness
        .executor
        .execute(&ctx(), &shell_target(), "true", ExecuteOptions::default())
        .await
        .expect_err("refused");

    let checks = harness.monitor.checks();
    assert_eq!(checks.len(), 1);
    let check = checks.first().expect("one check");
    assert_eq!(check.label, "suite/step");
    assert_eq!(check.target, "host-a");
}

#[rstest]
#[tokio::test]
async fn default_timeout_applies_when_caller_gives_none(harness: Harness) {
    harness.runner.push_stdout("");
    let executor = harness
        .executor
        .with_default_timeout(Some(Duration::from_secs(7)));

    executor
        .execute(&ctx(), &shell_target(), "true", ExecuteOptions::default())
        .await
        .expect("command runs");

    let invocations = harness.runner.invocations();
    let limit = invocations
        .first()
        .and_then(|invocation| invocation.timeout)
        .expect("deadline forwarded");
    assert!(limit <= Duration::from_secs(7), "{limit:?}");
    assert!(limit > Duration::from_secs(6), "{limit:?}");
}

#[rstest]
#[tokio::test]
async fn daemon_target_runs_through_the_job_protocol(harness: Harness) {
    harness.rpc.push_submitted("job-7");
    harness.rpc.push_done(0, true);
    harness.rpc.push_output("C:\\> done\r\n");
    harness.rpc.always_release();

    let result = harness
        .executor
        .execute(&ctx(), &daemon_target(), "ver", ExecuteOptions::default())
        .await
        .expect("job completes");

    assert_eq!(result.output(), "C:\\> done\r\n");
    assert!(harness.runner.invocations().is_empty());
    let calls = harness.rpc.calls();
    assert!(
        calls
            .iter()
            .all(|call| call.endpoint.port == ExecConfig::standard().daemon_port
                && call.endpoint.address == HOST)
    );
    assert_eq!(harness.rpc.calls_to(protocol::METHOD_RELEASE), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn daemon_job_past_its_deadline_times_out(harness: Harness) {
    harness.rpc.push_submitted("job-8");
    harness.rpc.always_pending();
    harness.rpc.always_release();
    let opts = ExecuteOptions::default().with_timeout(Duration::from_secs(3));

    let err = harness
        .executor
        .execute(&ctx(), &daemon_target(), "ping -t host", opts)
        .await
        .expect_err("job never finishes");

    assert!(matches!(err, ExecutionError::Timeout { .. }), "{err:?}");
    assert_eq!(harness.rpc.calls_to(protocol::METHOD_RELEASE), 1);
    assert_eq!(harness.monitor.hints(), vec![FailureHint::Timeout]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn daemon_poll_failures_are_retryable(harness: Harness) {
    harness.rpc.push_submitted("job-1");
    for _ in 0..3 {
        harness.rpc.push_transport_error(protocol::METHOD_POLL);
    }
    harness.rpc.push_submitted("job-2");
    harness.rpc.push_done(0, false);
    harness.rpc.always_release();
    let opts = ExecuteOptions::default().with_idempotent_retry();

    let result = harness
        .executor
        .execute(&ctx(), &daemon_target(), "dir", opts)
        .await
        .expect("second job completes");

    assert_eq!(result.exit_code(), 0);
    assert_eq!(harness.rpc.calls_to(protocol::METHOD_SUBMIT), 2);
    assert!(harness.monitor.checks().is_empty());
}
