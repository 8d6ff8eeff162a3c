//! Addressable hosts and guests that commands are executed against.
//!
//! A [`Target`] is created by the surrounding framework when it instantiates a
//! host or guest object. The transport kind is fixed at construction; the
//! address and credential are filled in progressively (usually by discovery)
//! and may be read concurrently by executions. Each target carries its own
//! lock so unrelated targets never contend.

use std::fmt;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use camino::Utf8PathBuf;
use secrecy::SecretString;

/// How commands reach a target.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransportKind {
    /// Unix-like systems reached through an authenticated shell session.
    ShellCapable,
    /// Systems without a native shell, driven through the execution daemon.
    DaemonOnly,
}

impl TransportKind {
    /// Returns a stable lowercase name for logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShellCapable => "shell",
            Self::DaemonOnly => "daemon",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret half of a [`Credential`].
#[derive(Clone, Debug)]
pub enum Secret {
    /// Interactive password, supplied to the shell client out of band.
    Password(SecretString),
    /// Private key file used for public key authentication.
    IdentityFile(Utf8PathBuf),
}

/// Username and secret used to authenticate shell sessions.
#[derive(Clone, Debug)]
pub struct Credential {
    /// Remote account name.
    pub username: String,
    /// Secret to authenticate with; `None` defers to the client's defaults
    /// (agent or default key locations).
    pub secret: Option<Secret>,
}

impl Credential {
    /// Password credential.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Some(Secret::Password(SecretString::from(password.into()))),
        }
    }

    /// Identity file credential.
    #[must_use]
    pub fn identity_file(username: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            username: username.into(),
            secret: Some(Secret::IdentityFile(path.into())),
        }
    }

    /// Credential relying on the client's default keys or agent.
    #[must_use]
    pub fn agent(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: None,
        }
    }

    /// Returns `true` when the credential authenticates with a password.
    #[must_use]
    pub const fn uses_password(&self) -> bool {
        matches!(self.secret, Some(Secret::Password(_)))
    }
}

/// Point-in-time copy of the mutable fields of a [`Target`].
#[derive(Clone, Debug, Default)]
pub struct TargetSnapshot {
    /// Network address, when known.
    pub address: Option<IpAddr>,
    /// Credential, when known.
    pub credential: Option<Credential>,
}

/// A host or guest the core can execute commands against.
#[derive(Debug)]
pub struct Target {
    name: String,
    kind: TransportKind,
    state: RwLock<TargetSnapshot>,
}

impl Target {
    /// Creates a target with no address or credential yet.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: RwLock::new(TargetSnapshot::default()),
        }
    }

    /// Convenience constructor for shell-capable targets.
    #[must_use]
    pub fn shell(name: impl Into<String>) -> Self {
        Self::new(name, TransportKind::ShellCapable)
    }

    /// Convenience constructor for daemon-only targets.
    #[must_use]
    pub fn daemon(name: impl Into<String>) -> Self {
        Self::new(name, TransportKind::DaemonOnly)
    }

    /// Sets the address while building the target.
    #[must_use]
    pub fn with_address(self, address: IpAddr) -> Self {
        self.set_address(address);
        self
    }

    /// Sets the credential while building the target.
    #[must_use]
    pub fn with_credential(self, credential: Credential) -> Self {
        self.set_credential(credential);
        self
    }

    /// Returns the target name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the transport kind fixed at construction.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Returns the current address, if discovered.
    #[must_use]
    pub fn address(&self) -> Option<IpAddr> {
        self.read().address
    }

    /// Returns the current credential, if discovered.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    /// Copies the address and credential under a single read lock.
    #[must_use]
    pub fn snapshot(&self) -> TargetSnapshot {
        self.read().clone()
    }

    /// Records a resolved address. Writing the same value twice is harmless.
    pub fn set_address(&self, address: IpAddr) {
        self.write().address = Some(address);
    }

    /// Records a resolved credential. Writing the same value twice is
    /// harmless.
    pub fn set_credential(&self, credential: Credential) {
        self.write().credential = Some(credential);
    }

    // The guarded data is plain values, so a writer that panicked cannot
    // leave it half-updated.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, TargetSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TargetSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
