//! Error types for remote provisioning.

use thiserror::Error;

use crate::provision::preflight::PreflightCheck;

/// Failure of a single remote command or of the session underneath it.
#[derive(Debug, Error)]
pub enum SshError {
    /// The remote command ran and exited nonzero.
    #[error("`{command}` exited with status {status}: {output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    /// The server refused an authentication method.
    #[error("{method} was rejected by the server")]
    AuthRejected { method: String },

    #[error("SSH error: {0}")]
    Session(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// libssh2 codes meaning the connection itself broke, as opposed to a
/// credential being refused or unusable.
const TRANSPORT_ERROR_CODES: [i32; 6] = [
    -2,  // LIBSSH2_ERROR_BANNER_RECV
    -7,  // LIBSSH2_ERROR_SOCKET_SEND
    -9,  // LIBSSH2_ERROR_TIMEOUT
    -13, // LIBSSH2_ERROR_SOCKET_DISCONNECT
    -30, // LIBSSH2_ERROR_SOCKET_TIMEOUT
    -43, // LIBSSH2_ERROR_SOCKET_RECV
];

impl SshError {
    /// Whether the session is no longer usable, so retrying with other
    /// credentials is pointless.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Session(e) => matches!(
                e.code(),
                ssh2::ErrorCode::Session(code) if TRANSPORT_ERROR_CODES.contains(&code)
            ),
            Self::CommandFailed { .. } | Self::AuthRejected { .. } => false,
        }
    }
}

/// Why a provisioning run stopped.
///
/// Variants up to and including `PreflightCheckFailed` guarantee the remote
/// host was not modified.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no server host given")]
    MissingHost,

    /// No authentication method produced a session.
    #[error("SSH authentication failed: {attempts}")]
    AuthExhausted { attempts: String },

    /// Transport, handshake or host identity failure.
    #[error("SSH connection to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("preflight check failed ({check}): {detail}")]
    PreflightCheckFailed {
        check: PreflightCheck,
        detail: String,
    },

    /// The install script exited nonzero. The remote host may be partially
    /// modified; nothing is rolled back.
    #[error("remote install failed with exit status {status}")]
    RemoteInstallFailed { status: i32 },

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local configuration could not be loaded or saved.
    #[error("local configuration: {0}")]
    Config(#[from] tunnelctl_core::Error),
}
