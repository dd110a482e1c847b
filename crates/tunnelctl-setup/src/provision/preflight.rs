//! Read-only checks run before anything on the remote host is modified.

use std::collections::HashMap;
use std::fmt;

use crate::error::{ProvisionError, SshError};
use crate::ssh::RemoteShell;

use super::RELAY_SERVICE;

/// Operating system the installer supports.
const EXPECTED_OS: &str = "Linux";

/// Helper the install script cannot do without.
const REQUIRED_TOOL: &str = "curl";

/// Each gate, in the order it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightCheck {
    OperatingSystem,
    RootUser,
    Architecture,
    ServiceConflict,
    RequiredTool,
}

impl fmt::Display for PreflightCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OperatingSystem => "operating system",
            Self::RootUser => "root user",
            Self::Architecture => "cpu architecture",
            Self::ServiceConflict => "existing relay service",
            Self::RequiredTool => "required tool",
        })
    }
}

/// Supported CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Armv7,
}

impl Arch {
    /// Parse `uname -m` output.
    pub fn from_uname(machine: &str) -> Option<Self> {
        match machine.trim() {
            "x86_64" => Some(Self::X86_64),
            "aarch64" => Some(Self::Aarch64),
            "armv7l" => Some(Self::Armv7),
            _ => None,
        }
    }

    /// Architecture suffix used in release artifact names.
    pub const fn artifact(self) -> &'static str {
        match self {
            Self::X86_64 => "amd64",
            Self::Aarch64 => "arm64",
            Self::Armv7 => "arm",
        }
    }
}

/// What preflight learned about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnv {
    pub arch: Arch,
    /// `PRETTY_NAME` from `/etc/os-release`, when readable.
    pub distro: Option<String>,
}

fn failed(check: PreflightCheck, detail: impl Into<String>) -> ProvisionError {
    ProvisionError::PreflightCheckFailed {
        check,
        detail: detail.into(),
    }
}

/// Run every check in order, stopping at the first failure.
pub fn run(shell: &mut dyn RemoteShell) -> Result<RemoteEnv, ProvisionError> {
    use PreflightCheck::{Architecture, OperatingSystem, RequiredTool, RootUser, ServiceConflict};

    let os = shell
        .run_capture("uname -s")
        .map_err(|e| failed(OperatingSystem, e.to_string()))?;
    if os != EXPECTED_OS {
        return Err(failed(
            OperatingSystem,
            format!("expected {EXPECTED_OS}, found {os:?}"),
        ));
    }
    let distro = read_distro(shell);

    let uid = shell
        .run_capture("id -u")
        .map_err(|e| failed(RootUser, e.to_string()))?;
    if uid != "0" {
        return Err(failed(
            RootUser,
            format!("installation needs root, connected as uid {uid}"),
        ));
    }

    let machine = shell
        .run_capture("uname -m")
        .map_err(|e| failed(Architecture, e.to_string()))?;
    let arch = Arch::from_uname(&machine).ok_or_else(|| {
        failed(
            Architecture,
            format!("unsupported architecture {machine:?} (supported: x86_64, aarch64, armv7l)"),
        )
    })?;

    // `systemctl is-active` exits nonzero for anything but "active".
    let state = match shell.run_capture(&format!("systemctl is-active {RELAY_SERVICE}")) {
        Ok(out) | Err(SshError::CommandFailed { output: out, .. }) => out,
        Err(e) => return Err(failed(ServiceConflict, e.to_string())),
    };
    if state == "active" {
        return Err(failed(
            ServiceConflict,
            format!(
                "{RELAY_SERVICE} is already running; to reinstall, first run `systemctl disable --now {RELAY_SERVICE}` on the server"
            ),
        ));
    }

    shell
        .run_capture(&format!("command -v {REQUIRED_TOOL}"))
        .map_err(|_| {
            failed(
                RequiredTool,
                format!("{REQUIRED_TOOL} is not installed (apt install {REQUIRED_TOOL} or yum install {REQUIRED_TOOL})"),
            )
        })?;

    tracing::info!(
        "remote environment: {} {machine}, root",
        distro.as_deref().unwrap_or(EXPECTED_OS)
    );
    Ok(RemoteEnv { arch, distro })
}

/// Best-effort distribution name; never fails the run.
fn read_distro(shell: &mut dyn RemoteShell) -> Option<String> {
    match shell.run_capture("cat /etc/os-release") {
        Ok(content) => {
            let release = parse_os_release(&content);
            let name = release
                .get("PRETTY_NAME")
                .or_else(|| release.get("ID"))
                .cloned();
            tracing::debug!(
                id = release.get("ID").map_or("unknown", String::as_str),
                version = release.get("VERSION_ID").map_or("unknown", String::as_str),
                "remote os-release"
            );
            name
        }
        Err(e) => {
            tracing::debug!("could not read remote os-release: {e}");
            None
        }
    }
}

/// Parse `os-release` content into key-value pairs.
fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.trim_matches('"').to_string()))
        .collect()
}
