//! Remote relay server provisioning.
//!
//! One run is a strict sequence of stages: validate the target, connect,
//! preflight, install, read the token back, persist locally. Each stage
//! aborts the run on failure and nothing is rolled back. Only the final stage
//! touches local state, and only the server address and token fields.

pub mod harvest;
pub mod preflight;
pub mod templates;

use std::io::Write;
use std::path::PathBuf;

use tunnelctl_core::Config;

use crate::error::ProvisionError;
use crate::ssh::{self, RemoteShell, RemoteTarget, SshSession};

pub use self::preflight::{Arch, PreflightCheck, RemoteEnv};

/// systemd service name of the relay server.
pub const RELAY_SERVICE: &str = "frps";

/// Relay server config file on the remote host.
pub const RELAY_CONFIG_PATH: &str = "/etc/frps/frps.toml";

/// Port the relay server listens on unless told otherwise.
pub const DEFAULT_RELAY_PORT: u16 = 7000;

/// Opens a [`RemoteShell`] to a target.
pub trait Connector {
    type Shell: RemoteShell;

    fn connect(&self, target: &RemoteTarget) -> Result<Self::Shell, ProvisionError>;
}

/// Connects over real SSH.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Shell = SshSession;

    fn connect(&self, target: &RemoteTarget) -> Result<SshSession, ProvisionError> {
        ssh::connect(target)
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Installed, and the local config now points at the new server.
    Configured { server: String, token: String },
    /// Installed, but the token could not be read back. The local config is
    /// untouched and the operator has to finish by hand.
    ManualCompletion { server: String, reason: String },
}

impl ProvisionOutcome {
    pub fn server(&self) -> &str {
        match self {
            Self::Configured { server, .. } | Self::ManualCompletion { server, .. } => server,
        }
    }
}

/// Drives one provisioning run.
#[derive(Debug)]
pub struct Provisioner<C> {
    connector: C,
    config_path: PathBuf,
    relay_port: u16,
}

impl<C: Connector> Provisioner<C> {
    /// `config_path` is the local persisted config updated on success.
    pub fn new(connector: C, config_path: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            config_path: config_path.into(),
            relay_port: DEFAULT_RELAY_PORT,
        }
    }

    #[must_use]
    pub const fn relay_port(mut self, port: u16) -> Self {
        self.relay_port = port;
        self
    }

    /// Run every stage. Remote script output is copied to `out`.
    pub fn run(
        &self,
        target: &RemoteTarget,
        out: &mut dyn Write,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        if target.host.trim().is_empty() {
            return Err(ProvisionError::MissingHost);
        }

        tracing::info!("connecting to {}@{}", target.user, target.addr());
        let mut shell = self.connector.connect(target)?;

        tracing::info!("running preflight checks");
        let env = preflight::run(&mut shell)?;

        tracing::info!("installing {RELAY_SERVICE} {}", templates::RELAY_VERSION);
        let script = templates::install_script(self.relay_port, env.arch);
        let status = shell.run_script(&script, out)?;
        if status != 0 {
            return Err(ProvisionError::RemoteInstallFailed { status });
        }

        let server = ssh::join_host_port(target.host.trim(), self.relay_port);
        let token = match harvest::read_token(&mut shell) {
            Ok(token) => token,
            Err(reason) => {
                tracing::warn!("installed, but the auth token could not be read back: {reason}");
                return Ok(ProvisionOutcome::ManualCompletion { server, reason });
            }
        };

        self.persist(&server, &token)?;
        Ok(ProvisionOutcome::Configured { server, token })
    }

    fn persist(&self, server: &str, token: &str) -> Result<(), ProvisionError> {
        let mut config = Config::load(&self.config_path)?;
        config.set_server(server, token);
        config.save(&self.config_path)?;
        tracing::info!(
            "relay server {server} saved to {}",
            self.config_path.display()
        );
        Ok(())
    }
}

/// Command the operator runs to finish a [`ProvisionOutcome::ManualCompletion`].
pub fn manual_init_command(server: &str) -> String {
    format!("tunnelctl relay init --server {server} --token <token>")
}
