//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here are thread-safe because the shell transport runs on the
//! blocking pool and the façade may be driven from several tasks at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use crate::context::ExecutionContext;
use crate::health::{FailureHint, HealthError, HealthFuture, HealthMonitor, HealthReport};
use crate::rpc::protocol::{
    METHOD_OUTPUT, METHOD_POLL, METHOD_RELEASE, METHOD_SUBMIT, METHOD_VERSION,
};
use crate::rpc::{DaemonEndpoint, RpcError, RpcFuture, RpcTransport};
use crate::shell::{CommandOutput, CommandRunner, Invocation, ShellError};
use crate::target::Target;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic shell outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, ShellError>>>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }));
    }

    /// Pushes a successful exit with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a specific exit code with no output.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes the response of an `ssh` client whose connection was refused.
    pub fn push_connection_refused(&self) {
        self.push_output(
            Some(255),
            "",
            "ssh: connect to host 192.0.2.10 port 22: Connection refused\n",
        );
    }

    /// Pushes a process that was killed because its timeout elapsed.
    pub fn push_timeout(&self) {
        lock(&self.responses).push_back(Ok(CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }));
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes a failure to start the client program.
    pub fn push_spawn_error(&self, message: impl Into<String>) {
        lock(&self.responses).push_back(Err(ShellError::Spawn {
            program: String::from("ssh"),
            message: message.into(),
        }));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError> {
        lock(&self.invocations).push(invocation.clone());
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            Err(ShellError::Spawn {
                program: invocation.program.clone(),
                message: String::from("no scripted response available"),
            })
        })
    }
}

/// A call recorded by [`ScriptedRpc`].
#[derive(Clone, Debug, PartialEq)]
pub struct RpcCall {
    /// Daemon the call was addressed to.
    pub endpoint: DaemonEndpoint,
    /// Method name.
    pub method: String,
    /// Parameters sent.
    pub params: Option<Value>,
}

#[derive(Debug, Default)]
struct RpcScript {
    queued: HashMap<String, VecDeque<Result<Value, RpcError>>>,
    repeated: HashMap<String, Result<Value, RpcError>>,
    unanswered: HashSet<String>,
    calls: Vec<RpcCall>,
}

/// Scripted daemon transport answering per-method FIFO queues.
///
/// When a method's queue is empty the response set with
/// [`ScriptedRpc::always`] is returned; with neither, the call fails as a
/// transport error. Methods passed to [`ScriptedRpc::never_answer`] are
/// recorded and then never resolve.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRpc {
    script: Arc<Mutex<RpcScript>>,
}

impl ScriptedRpc {
    /// Creates a transport with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `method`.
    pub fn push(&self, method: &str, response: Result<Value, RpcError>) {
        lock(&self.script)
            .queued
            .entry(method.to_owned())
            .or_default()
            .push_back(response);
    }

    /// Answers `method` with `response` whenever its queue is empty.
    pub fn always(&self, method: &str, response: Result<Value, RpcError>) {
        lock(&self.script)
            .repeated
            .insert(method.to_owned(), response);
    }

    /// Queues a socket-level failure for `method`.
    pub fn push_transport_error(&self, method: &str) {
        self.push(method, Err(transport_error(method)));
    }

    /// Queues a daemon fault for `method`.
    pub fn push_fault(&self, method: &str, code: i64, message: &str) {
        self.push(
            method,
            Err(RpcError::Fault {
                method: method.to_owned(),
                code,
                message: message.to_owned(),
            }),
        );
    }

    /// Queues a successful submission returning `handle`.
    pub fn push_submitted(&self, handle: &str) {
        self.push(METHOD_SUBMIT, Ok(json!({ "handle": handle })));
    }

    /// Queues a pending poll.
    pub fn push_pending(&self) {
        self.push(METHOD_POLL, Ok(json!({ "state": "pending" })));
    }

    /// Queues a finished poll.
    pub fn push_done(&self, exit_code: i32, output_available: bool) {
        self.push(
            METHOD_POLL,
            Ok(json!({
                "state": "done",
                "exit_code": exit_code,
                "output_available": output_available,
            })),
        );
    }

    /// Queues the output of a finished job.
    pub fn push_output(&self, output: &str) {
        self.push(METHOD_OUTPUT, Ok(json!({ "output": output })));
    }

    /// Makes every poll report the job as pending.
    pub fn always_pending(&self) {
        self.always(METHOD_POLL, Ok(json!({ "state": "pending" })));
    }

    /// Makes every release succeed.
    pub fn always_release(&self) {
        self.always(METHOD_RELEASE, Ok(json!({ "released": true })));
    }

    /// Makes every version request answer `version`.
    pub fn always_version(&self, version: &str) {
        self.always(METHOD_VERSION, Ok(json!({ "version": version })));
    }

    /// Makes every call to `method` hang, as a daemon that stopped
    /// responding without closing its socket would.
    pub fn never_answer(&self, method: &str) {
        lock(&self.script).unanswered.insert(method.to_owned());
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RpcCall> {
        lock(&self.script).calls.clone()
    }

    /// Number of calls made to `method`.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> usize {
        lock(&self.script)
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    fn respond(
        &self,
        endpoint: &DaemonEndpoint,
        method: &str,
        params: Option<Value>,
    ) -> Option<Result<Value, RpcError>> {
        let mut script = lock(&self.script);
        script.calls.push(RpcCall {
            endpoint: *endpoint,
            method: method.to_owned(),
            params,
        });
        if script.unanswered.contains(method) {
            return None;
        }
        if let Some(response) = script
            .queued
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return Some(response);
        }
        Some(
            script
                .repeated
                .get(method)
                .cloned()
                .unwrap_or_else(|| Err(transport_error(method))),
        )
    }
}

impl RpcTransport for ScriptedRpc {
    fn call<'a>(
        &'a self,
        endpoint: &'a DaemonEndpoint,
        method: &'a str,
        params: Option<Value>,
    ) -> RpcFuture<'a, Value> {
        match self.respond(endpoint, method, params) {
            Some(response) => Box::pin(async move { response }),
            None => Box::pin(future::pending::<Result<Value, RpcError>>()),
        }
    }
}

fn transport_error(method: &str) -> RpcError {
    RpcError::Transport {
        method: method.to_owned(),
        message: String::from("connection refused"),
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum MonitorBehaviour {
    #[default]
    Report,
    Fail,
    Panic,
    Hang,
}

/// A health check observed by [`RecordingMonitor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedCheck {
    /// Label of the execution context passed in.
    pub label: String,
    /// Name of the inspected target.
    pub target: String,
    /// Failure hint passed in.
    pub hint: FailureHint,
}

/// Health monitor double that records each check.
///
/// It can be told to return an error or to panic so callers can prove the
/// original failure survives a misbehaving monitor.
#[derive(Clone, Debug, Default)]
pub struct RecordingMonitor {
    checks: Arc<Mutex<Vec<RecordedCheck>>>,
    behaviour: MonitorBehaviour,
}

impl RecordingMonitor {
    /// Monitor that records and reports an empty, healthy finding list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor that records and then returns an error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            behaviour: MonitorBehaviour::Fail,
            ..Self::default()
        }
    }

    /// Monitor that records and then panics.
    #[must_use]
    pub fn panicking() -> Self {
        Self {
            behaviour: MonitorBehaviour::Panic,
            ..Self::default()
        }
    }

    /// Monitor that records and then never completes.
    #[must_use]
    pub fn hanging() -> Self {
        Self {
            behaviour: MonitorBehaviour::Hang,
            ..Self::default()
        }
    }

    /// Checks recorded so far.
    #[must_use]
    pub fn checks(&self) -> Vec<RecordedCheck> {
        lock(&self.checks).clone()
    }

    /// Hints of the checks recorded so far.
    #[must_use]
    pub fn hints(&self) -> Vec<FailureHint> {
        lock(&self.checks).iter().map(|check| check.hint).collect()
    }
}

impl HealthMonitor for RecordingMonitor {
    fn check<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        target: &'a Target,
        hint: FailureHint,
    ) -> HealthFuture<'a> {
        lock(&self.checks).push(RecordedCheck {
            label: ctx.label().to_owned(),
            target: target.name().to_owned(),
            hint,
        });
        let behaviour = self.behaviour;
        let name = target.name().to_owned();
        Box::pin(async move {
            match behaviour {
                MonitorBehaviour::Report => Ok(HealthReport {
                    target: name,
                    hint,
                    findings: Vec::new(),
                }),
                MonitorBehaviour::Fail => Err(HealthError::Probe {
                    probe: String::from("recording monitor"),
                    message: String::from("simulated monitor failure"),
                }),
                MonitorBehaviour::Panic => panic!("simulated monitor panic"),
                MonitorBehaviour::Hang => future::pending().await,
            }
        })
    }
}
