//! SSH session wrapper: connect, run captured commands, stream scripts.

pub mod auth;
pub mod script;

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::{CheckResult, ExtendedData, KnownHostFileKind, Session};

use tunnelctl_core::fallback::{self, Exhausted};

use crate::error::{ProvisionError, SshError};

pub use self::auth::{AuthMethod, Credentials};
pub use self::script::ScriptPayload;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_USER: &str = "root";

/// Transport connect and handshake timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Seconds between keepalive messages once connected.
const KEEPALIVE_INTERVAL_SECS: u32 = 30;

/// The machine a provisioning run talks to. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: Credentials,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: DEFAULT_SSH_USER.to_string(),
            credentials: Credentials::default(),
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// The remote execution capability the provisioning pipeline needs.
pub trait RemoteShell {
    /// Run one command and return its combined stdout/stderr, trimmed.
    /// A nonzero exit is [`SshError::CommandFailed`] carrying that output.
    fn run_capture(&mut self, command: &str) -> Result<String, SshError>;

    /// Stream `script` into a remote shell, copy its output to `out` as it
    /// arrives, and return the shell's exit status.
    fn run_script(&mut self, script: &ScriptPayload, out: &mut dyn Write) -> Result<i32, SshError>;
}

/// An authenticated `ssh2` session.
pub struct SshSession {
    session: Session,
    addr: String,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession").field("addr", &self.addr).finish()
    }
}

/// Connect and authenticate to `target`.
pub fn connect(target: &RemoteTarget) -> Result<SshSession, ProvisionError> {
    let addr = target.addr();
    let connect_failed = |reason: String| ProvisionError::ConnectFailed {
        addr: addr.clone(),
        reason,
    };

    let host = target.host.trim_start_matches('[').trim_end_matches(']');
    let socket = (host, target.port)
        .to_socket_addrs()
        .map_err(|e| connect_failed(format!("cannot resolve host: {e}")))?
        .next()
        .ok_or_else(|| connect_failed("host resolved to no addresses".into()))?;
    tracing::debug!("connecting to {socket}");
    let tcp = TcpStream::connect_timeout(&socket, CONNECT_TIMEOUT)
        .map_err(|e| connect_failed(e.to_string()))?;

    let mut session = Session::new().map_err(|e| connect_failed(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_millis(CONNECT_TIMEOUT));
    session
        .handshake()
        .map_err(|e| connect_failed(format!("handshake: {e}")))?;

    let ssh_dir = default_ssh_dir();
    verify_host_key(
        &session,
        host,
        target.port,
        ssh_dir.as_deref().map(|d| d.join("known_hosts")).as_deref(),
    )
    .map_err(connect_failed)?;

    authenticate(&session, target, &addr, ssh_dir.as_deref())?;

    // The install script may run for minutes; only keepalives bound it.
    session.set_timeout(0);
    session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
    tracing::info!("connected to {addr} as {}", target.user);
    Ok(SshSession { session, addr })
}

fn timeout_millis(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

fn authenticate(
    session: &Session,
    target: &RemoteTarget,
    addr: &str,
    ssh_dir: Option<&Path>,
) -> Result<(), ProvisionError> {
    let methods = auth::candidates(&target.credentials, ssh_dir, auth::agent_available());
    if methods.is_empty() {
        return Err(ProvisionError::AuthExhausted {
            attempts: "no usable credentials; pass --key or --password, or start ssh-agent".into(),
        });
    }

    let (label, ()) = fallback::first_success(methods, |method| {
        method.authenticate(session, &target.user)
    })
    .map_err(|exhausted| auth_failure(addr, exhausted))?;
    tracing::debug!("authenticated with {label}");
    Ok(())
}

/// A dropped connection during any attempt is reported as a connection
/// failure; otherwise every method was refused.
fn auth_failure(addr: &str, exhausted: Exhausted<SshError>) -> ProvisionError {
    if let Some((label, err)) = exhausted.attempts.iter().find(|(_, e)| e.is_transport()) {
        return ProvisionError::ConnectFailed {
            addr: addr.to_string(),
            reason: format!("connection lost during {label} authentication: {err}"),
        };
    }
    ProvisionError::AuthExhausted {
        attempts: exhausted.to_string(),
    }
}

/// Check the server's host key against `known_hosts`.
///
/// A key that contradicts a recorded entry is an error. A host with no entry,
/// or no readable store, proceeds with a warning.
fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
    known_hosts: Option<&Path>,
) -> Result<(), String> {
    let Some(path) = known_hosts.filter(|p| p.is_file()) else {
        tracing::warn!("no known_hosts file found; host key of {host} is not verified");
        return Ok(());
    };
    let mut store = session.known_hosts().map_err(|e| e.to_string())?;
    if let Err(e) = store.read_file(path, KnownHostFileKind::OpenSSH) {
        tracing::warn!("cannot read {}: {e}; host key of {host} is not verified", path.display());
        return Ok(());
    }
    let (key, _) = session
        .host_key()
        .ok_or_else(|| "server presented no host key".to_string())?;

    match store.check_port(host, port, key) {
        CheckResult::Match => {
            tracing::debug!("host key of {host} matches {}", path.display());
            Ok(())
        }
        CheckResult::Mismatch => Err(format!(
            "host key does not match the entry in {}; remove the stale entry if the server was reinstalled",
            path.display()
        )),
        CheckResult::NotFound => {
            tracing::warn!("{host} is not in {}; host key is not verified", path.display());
            Ok(())
        }
        CheckResult::Failure => {
            tracing::warn!("host key check for {host} failed; continuing unverified");
            Ok(())
        }
    }
}

impl SshSession {
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl RemoteShell for SshSession {
    fn run_capture(&mut self, command: &str) -> Result<String, SshError> {
        tracing::debug!("exec (capture): {command}");
        let mut channel = self.session.channel_session()?;
        channel.handle_extended_data(ExtendedData::Merge)?;
        channel.exec(command)?;

        let mut raw = Vec::new();
        channel.read_to_end(&mut raw)?;
        channel.wait_close()?;
        let status = channel.exit_status()?;
        let output = String::from_utf8_lossy(&raw).trim().to_string();

        if status == 0 {
            Ok(output)
        } else {
            Err(SshError::CommandFailed {
                command: command.to_string(),
                status,
                output,
            })
        }
    }

    fn run_script(&mut self, script: &ScriptPayload, out: &mut dyn Write) -> Result<i32, SshError> {
        tracing::debug!("streaming {} byte script to remote shell", script.as_bytes().len());
        let mut channel = self.session.channel_session()?;
        channel.handle_extended_data(ExtendedData::Merge)?;
        channel.shell()?;
        channel.write_all(script.as_bytes())?;
        channel.send_eof()?;

        let mut buf = [0u8; 8192];
        loop {
            let n = channel.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            out.flush()?;
        }
        channel.wait_close()?;
        Ok(channel.exit_status()?)
    }
}

/// Where `connect` looks for keys and `known_hosts`.
pub fn default_ssh_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ssh"))
}
