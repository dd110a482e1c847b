//! The relay client service: persisted config in, supervised `frpc` out.

use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use serde::Serialize;

use crate::config::{Config, ConnectionRule, Protocol, RelayConfig};
use crate::error::{Error, Result};
use crate::materialize;
use crate::supervisor::{ManagedProcess, ProcessSupervisor};
use crate::workspace::{RELAY_CLIENT_NAME, Workspace};

/// Name of the single rule written by [`RelayClient::quick`].
pub const QUICK_RULE_NAME: &str = "quick";

/// Snapshot reported by `relay status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    pub server: Option<String>,
    pub running: bool,
    pub pid: Option<u32>,
    pub rules: usize,
    pub log_file: PathBuf,
}

/// Wires the persisted rule-set through materialization into the supervisor.
#[derive(Debug)]
pub struct RelayClient {
    workspace: Workspace,
    supervisor: ProcessSupervisor,
}

impl RelayClient {
    pub fn new(workspace: Workspace) -> Self {
        let supervisor = ProcessSupervisor::new(workspace.run_dir());
        Self::with_supervisor(workspace, supervisor)
    }

    pub const fn with_supervisor(workspace: Workspace, supervisor: ProcessSupervisor) -> Self {
        Self {
            workspace,
            supervisor,
        }
    }

    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.workspace.config_path())
    }

    /// Regenerate `frpc.toml` from the current persisted config.
    pub fn materialize(&self) -> Result<RelayConfig> {
        let relay = self.load_config()?.relay;
        materialize::generate(&self.workspace.client_config_path(), &relay)?;
        Ok(relay)
    }

    /// Materialize, then launch the client in the background. Returns its PID.
    pub fn up(&self) -> Result<u32> {
        let binary = self.workspace.client_binary();
        if !binary.is_file() {
            return Err(Error::MissingBinary { path: binary });
        }
        if let Some(pid) = self.supervisor.running_pid(RELAY_CLIENT_NAME) {
            return Err(Error::AlreadyRunning {
                name: RELAY_CLIENT_NAME.into(),
                pid,
            });
        }
        let relay = self.materialize()?;
        if relay.rules.is_empty() {
            tracing::warn!("no rules configured; the client will connect but forward nothing");
        }

        let process = ManagedProcess::new(
            RELAY_CLIENT_NAME,
            binary,
            self.workspace.log_path(RELAY_CLIENT_NAME),
        )
        .args([
            PathBuf::from("-c").into_os_string(),
            self.workspace.client_config_path().into_os_string(),
        ]);
        self.supervisor.start(&process)
    }

    /// Stop the background client. Returns the PID that was recorded.
    pub fn down(&self) -> Result<u32> {
        self.supervisor.stop(RELAY_CLIENT_NAME)
    }

    pub fn status(&self) -> Result<RelayStatus> {
        let config = self.load_config()?;
        let pid = self.supervisor.running_pid(RELAY_CLIENT_NAME);
        Ok(RelayStatus {
            server: Some(config.relay.server).filter(|s| !s.is_empty()),
            running: pid.is_some(),
            pid,
            rules: config.relay.rules.len(),
            log_file: self.workspace.log_path(RELAY_CLIENT_NAME),
        })
    }

    /// Write the one-rule config used by [`Self::quick`] and return its rule.
    ///
    /// Uses the persisted server credentials but never the persisted rule-set,
    /// and writes to its own file so `frpc.toml` is left alone.
    pub fn prepare_quick(&self, port: u16, protocol: Protocol) -> Result<ConnectionRule> {
        let relay = self.load_config()?.relay;
        let rule = ConnectionRule {
            remote_port: Some(port),
            ..ConnectionRule::new(QUICK_RULE_NAME, protocol, port)
        };
        let quick = RelayConfig {
            rules: vec![rule.clone()],
            ..relay
        };
        materialize::generate(&self.workspace.quick_config_path(), &quick)?;
        Ok(rule)
    }

    /// Run a single-rule client in the foreground until it exits.
    pub fn quick(&self, port: u16, protocol: Protocol) -> Result<ExitStatus> {
        let binary = self.workspace.client_binary();
        if !binary.is_file() {
            return Err(Error::MissingBinary { path: binary });
        }
        self.prepare_quick(port, protocol)?;
        let config_path = self.workspace.quick_config_path();
        tracing::debug!("exec: {} -c {}", binary.display(), config_path.display());
        Ok(Command::new(&binary).arg("-c").arg(&config_path).status()?)
    }
}
