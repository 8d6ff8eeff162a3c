//! Core shell types and the command runner abstraction.

use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::ShellError;

/// A fully rendered process invocation.
#[derive(Clone, Debug)]
pub struct Invocation {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Environment variables carrying secrets; never rendered in logs.
    pub secret_env: Vec<(String, SecretString)>,
    /// Wall-clock limit after which the process is killed.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Returns a shell-like rendering of program and arguments for logs and
    /// assertions. Secret environment values are not included.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process was killed because its timeout elapsed.
    pub timed_out: bool,
}

/// Output of a command that ran to completion on the remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShellOutput {
    /// Remote exit status.
    pub exit_code: i32,
    /// Remote standard output.
    pub stdout: String,
    /// Remote standard error.
    pub stderr: String,
}

impl ShellOutput {
    /// Standard output followed by standard error.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs the invocation, capturing stdout and stderr and enforcing its
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Spawn`] if the command cannot be started and
    /// [`ShellError::Io`] if its output cannot be collected.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

/// How long pipe readers are given to finish once a timed-out child is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ShellError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &invocation.secret_env {
            command.env(key, value.expose_secret());
        }
        // `sshpass` forks the real client; both must die with the deadline.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let mut child = command.spawn().map_err(|err| ShellError::Spawn {
            program: invocation.program.clone(),
            message: err.to_string(),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error(invocation, "stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error(invocation, "stderr was not piped"))?;

        // Pipes are drained concurrently so a chatty child cannot block on a
        // full pipe while we wait for it.
        let stdout_reader = spawn_reader(stdout);
        let stderr_reader = spawn_reader(stderr);

        let (status, timed_out) = match invocation.timeout {
            Some(limit) => match child
                .wait_timeout(limit)
                .map_err(|err| io_error(invocation, &err.to_string()))?
            {
                Some(status) => (status, false),
                None => {
                    warn!(
                        program = %invocation.program,
                        timeout_ms = limit.as_millis(),
                        "command timed out, killing process group"
                    );
                    kill_process_group(&mut child)
                        .map_err(|err| io_error(invocation, &err.to_string()))?;
                    let status = child
                        .wait()
                        .map_err(|err| io_error(invocation, &err.to_string()))?;
                    (status, true)
                }
            },
            None => (
                child
                    .wait()
                    .map_err(|err| io_error(invocation, &err.to_string()))?,
                false,
            ),
        };

        let stdout_bytes = collect(&stdout_reader, timed_out);
        let stderr_bytes = collect(&stderr_reader, timed_out);

        debug!(program = %invocation.program, code = ?status.code(), timed_out, "command finished");
        Ok(CommandOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            timed_out,
        })
    }
}

fn kill_process_group(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let group = i32::try_from(child.id()).ok().map(Pid::from_raw);
        if let Some(Err(err)) = group.map(|pgid| killpg(pgid, Signal::SIGKILL)) {
            debug!(error = %err, "killpg failed, killing the child only");
        }
    }
    child.kill()
}

fn spawn_reader(stream: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || tx.send(read_stream(stream)).ok());
    rx
}

// A descendant that escaped the kill can hold a pipe open indefinitely, so a
// timed-out run only waits briefly for its readers.
fn collect(reader: &Receiver<Vec<u8>>, timed_out: bool) -> Vec<u8> {
    let received = if timed_out {
        reader.recv_timeout(DRAIN_GRACE).ok()
    } else {
        reader.recv().ok()
    };
    received.unwrap_or_default()
}

fn read_stream(mut stream: impl Read) -> Vec<u8> {
    let mut buffer = Vec::new();
    // A read error mid-stream leaves whatever was captured so far.
    stream.read_to_end(&mut buffer).ok();
    buffer
}

fn io_error(invocation: &Invocation, message: &str) -> ShellError {
    ShellError::Io {
        program: invocation.program.clone(),
        message: message.to_owned(),
    }
}
