//! Binary entry point for the `vigil` CLI.

use std::env;
use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;

use vigil::{
    ConfigError, Credential, ExecConfig, ExecuteOptions, ExecutionContext, ExecutionError,
    Executor, FailureHint, HealthError, HttpRpcClient, ProcessCommandRunner, ShellConfig, Target,
    TransportKind,
};

mod cli;
mod logging;

use cli::{Cli, Command, ExecCommand, HealthCommand, KindArg, TargetArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Execution(#[from] ExecutionError),
    #[error("health check failed: {0}")]
    Health(#[from] HealthError),
    #[error("password variable {0} is not set")]
    MissingPassword(String),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let exit_code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(command: Command) -> Result<i32, CliError> {
    match command {
        Command::Exec(args) => exec_command(args).await,
        Command::Health(args) => health_command(args).await,
    }
}

async fn exec_command(args: ExecCommand) -> Result<i32, CliError> {
    validate_command_args(&args.command)?;
    let target = target_from_args(&args.target)?;
    let executor = executor_from_env()?;
    let remote_command = render_remote_command(target.kind(), &args.command);

    let mut opts = ExecuteOptions::default();
    if let Some(secs) = args.timeout {
        opts = opts.with_timeout(Duration::from_secs(secs));
    }
    if args.require_success {
        opts = opts.requiring_success();
    }
    if args.retry {
        opts = opts.with_idempotent_retry();
    }

    let ctx = ExecutionContext::new("vigil exec");
    match executor.execute(&ctx, &target, &remote_command, opts).await {
        Ok(result) => {
            write!(io::stdout(), "{}", result.output()).ok();
            Ok(result.exit_code())
        }
        Err(ExecutionError::RemoteFailure { target, code, output }) => {
            write!(io::stdout(), "{output}").ok();
            writeln!(io::stderr(), "command on {target} exited with {code}").ok();
            Ok(code)
        }
        Err(err) => Err(err.into()),
    }
}

async fn health_command(args: HealthCommand) -> Result<i32, CliError> {
    let target = target_from_args(&args.target)?;
    let executor = executor_from_env()?;

    let ctx = ExecutionContext::new("vigil health");
    let report = executor
        .monitor()
        .check(&ctx, &target, FailureHint::Manual)
        .await?;

    let mut stdout = io::stdout();
    writeln!(stdout, "{} ({})", report.target, report.hint).ok();
    for finding in &report.findings {
        let marker = if finding.is_warning() { "WARN" } else { "ok" };
        writeln!(stdout, "  [{marker}] {finding}").ok();
    }
    Ok(i32::from(report.has_warnings()))
}

fn executor_from_env() -> Result<Executor<ProcessCommandRunner, HttpRpcClient>, CliError> {
    let exec = ExecConfig::load_without_cli_args()?;
    let shell = ShellConfig::load_without_cli_args()?;
    Ok(Executor::from_config(&exec, shell)?)
}

const fn transport_kind(kind: KindArg) -> TransportKind {
    match kind {
        KindArg::Shell => TransportKind::ShellCapable,
        KindArg::Daemon => TransportKind::DaemonOnly,
    }
}

fn target_from_args(args: &TargetArgs) -> Result<Target, CliError> {
    let target =
        Target::new(args.name.clone(), transport_kind(args.kind)).with_address(args.address);
    match credential_from_args(args)? {
        Some(credential) => Ok(target.with_credential(credential)),
        None => Ok(target),
    }
}

fn credential_from_args(args: &TargetArgs) -> Result<Option<Credential>, CliError> {
    let username = args.user.clone().unwrap_or_else(|| String::from("root"));
    if let Some(var) = &args.password_env {
        let password = env::var(var).map_err(|_| CliError::MissingPassword(var.clone()))?;
        return Ok(Some(Credential::password(username, password)));
    }
    if let Some(path) = &args.identity_file {
        return Ok(Some(Credential::identity_file(username, path.as_str())));
    }
    Ok(args.user.clone().map(Credential::agent))
}

// Shell targets get POSIX quoting; the daemon runs the line as given.
fn render_remote_command(kind: TransportKind, args: &[String]) -> String {
    match kind {
        TransportKind::ShellCapable => args
            .iter()
            .map(|arg| escape(arg.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        TransportKind::DaemonOnly => args.join(" "),
    }
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
