//! Command-line interface definitions for the `vigil` binary.
//!
//! The parser structures live here so the build script can reuse them when
//! generating the manual page.

use std::net::IpAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `vigil` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    about = "Run commands on hosts and guests under test and check their health",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log debug diagnostics to stderr.
    #[arg(long, short, global = true)]
    pub(crate) verbose: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `vigil`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run a command on a target and exit with its status.
    #[command(name = "exec", about = "Run a command on a target")]
    Exec(ExecCommand),
    /// Inspect a target and print the findings.
    #[command(name = "health", about = "Run the health monitor against a target")]
    Health(HealthCommand),
}

/// Transport used to reach the target.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum KindArg {
    /// Authenticated `ssh` session.
    #[default]
    Shell,
    /// JSON-RPC job daemon.
    Daemon,
}

/// Options identifying the target and how to authenticate.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Name used in logs and error messages.
    #[arg(long, value_name = "NAME", default_value = "target")]
    pub(crate) name: String,
    /// Transport used to reach the target.
    #[arg(long, value_enum, default_value_t = KindArg::Shell)]
    pub(crate) kind: KindArg,
    /// Network address of the target.
    #[arg(long, value_name = "IP")]
    pub(crate) address: IpAddr,
    /// Remote account for shell targets.
    #[arg(long, value_name = "USER")]
    pub(crate) user: Option<String>,
    /// Environment variable holding the account password.
    #[arg(long, value_name = "VAR", conflicts_with = "identity_file")]
    pub(crate) password_env: Option<String>,
    /// Private key used for public key authentication.
    #[arg(long, value_name = "PATH")]
    pub(crate) identity_file: Option<String>,
}

/// Arguments for the `vigil exec` subcommand.
#[derive(Debug, Args)]
pub(crate) struct ExecCommand {
    /// Target to run on.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Deadline for the command in seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    /// Fail when the command exits non-zero.
    #[arg(long)]
    pub(crate) require_success: bool,
    /// Repeat the command once if the connection fails. Only use this for
    /// commands that are safe to run twice.
    #[arg(long)]
    pub(crate) retry: bool,
    /// Command to execute on the target (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for the `vigil health` subcommand.
#[derive(Debug, Args)]
pub(crate) struct HealthCommand {
    /// Target to inspect.
    #[command(flatten)]
    pub(crate) target: TargetArgs,
}
