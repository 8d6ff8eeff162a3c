//! BDD scenarios for the execution façade.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ExecuteContext, execute_context};

#[scenario(path = "tests/features/execute.feature", name = "Shell command succeeds")]
fn scenario_shell_command_succeeds(execute_context: ExecuteContext) {
    let _ = execute_context;
}

#[scenario(
    path = "tests/features/execute.feature",
    name = "Target without an address fails before any attempt"
)]
fn scenario_missing_address(execute_context: ExecuteContext) {
    let _ = execute_context;
}

#[scenario(
    path = "tests/features/execute.feature",
    name = "Idempotent command recovers from a refused connection"
)]
fn scenario_idempotent_retry(execute_context: ExecuteContext) {
    let _ = execute_context;
}

#[scenario(
    path = "tests/features/execute.feature",
    name = "Required success turns a non-zero exit into a failure"
)]
fn scenario_required_success(execute_context: ExecuteContext) {
    let _ = execute_context;
}

#[scenario(
    path = "tests/features/execute.feature",
    name = "Daemon job that never finishes times out and is released"
)]
fn scenario_daemon_timeout(execute_context: ExecuteContext) {
    let _ = execute_context;
}

#[scenario(
    path = "tests/features/execute.feature",
    name = "Daemon poll errors within the allowance are tolerated"
)]
fn scenario_daemon_tolerates_poll_errors(execute_context: ExecuteContext) {
    let _ = execute_context;
}
