//! Filesystem layout of one tunnelctl installation.
//!
//! Every operation receives a [`Workspace`] explicitly instead of consulting
//! process-global state, so argument parsing stays out of business logic.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the workspace root.
pub const HOME_ENV: &str = "TUNNELCTL_HOME";

/// Name under which the relay client process is supervised.
pub const RELAY_CLIENT_NAME: &str = "frpc";

const CONFIG_FILENAME: &str = "config.toml";
const CLIENT_CONFIG_FILENAME: &str = "frpc.toml";
const QUICK_CONFIG_FILENAME: &str = "frpc-quick.toml";

/// Resolved paths for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    client_binary: Option<PathBuf>,
}

impl Workspace {
    /// Workspace rooted at an explicit directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client_binary: None,
        }
    }

    /// Resolve the root: explicit flag, then `TUNNELCTL_HOME`, then the
    /// platform config directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        let base = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine config directory".into()))?;
        Ok(Self::new(base.join("tunnelctl")))
    }

    /// Override the relay client binary location.
    #[must_use]
    pub fn with_client_binary(mut self, path: Option<PathBuf>) -> Self {
        self.client_binary = path;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persisted configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }

    /// Materialized relay client config.
    pub fn client_config_path(&self) -> PathBuf {
        self.root.join(CLIENT_CONFIG_FILENAME)
    }

    /// Materialized config for a foreground quick session.
    pub fn quick_config_path(&self) -> PathBuf {
        self.root.join(QUICK_CONFIG_FILENAME)
    }

    /// Directory holding PID files.
    pub fn run_dir(&self) -> PathBuf {
        self.root.join("run")
    }

    /// Log file for a supervised process.
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.root.join("logs").join(format!("{name}.log"))
    }

    /// Exact path of the relay client binary. No `PATH` lookup is done.
    pub fn client_binary(&self) -> PathBuf {
        self.client_binary.clone().unwrap_or_else(|| {
            self.root
                .join("bin")
                .join(format!("{RELAY_CLIENT_NAME}{}", std::env::consts::EXE_SUFFIX))
        })
    }
}
