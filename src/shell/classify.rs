//! Tells SSH client failures apart from remote command failures.
//!
//! The OpenSSH client exits with 255 when it cannot establish or keep a
//! session, but a remote command may legitimately exit 255 too. The client's
//! own diagnostics on stderr disambiguate the two.

use super::CommandOutput;

const SSH_CLIENT_FAILURE: i32 = 255;

const CONNECTION_DIAGNOSTICS: &[&str] = &[
    "ssh: connect to host",
    "ssh: Could not resolve hostname",
    "Connection refused",
    "Connection timed out",
    "Connection reset by",
    "Connection closed by",
    "No route to host",
    "Network is unreachable",
    "Permission denied",
    "Host key verification failed",
    "kex_exchange_identification",
];

/// Returns `true` when the output describes a failure to establish the SSH
/// session rather than a remote command exiting with 255.
#[must_use]
pub fn is_connection_failure(output: &CommandOutput) -> bool {
    output.code == Some(SSH_CLIENT_FAILURE)
        && CONNECTION_DIAGNOSTICS
            .iter()
            .any(|marker| output.stderr.contains(marker))
}
