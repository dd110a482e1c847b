//! Persisted configuration.
//!
//! `config.toml` is the single source of truth for the relay server
//! credentials and the rule-set. Tables this crate does not know about are
//! carried through load/save untouched.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CURRENT_VERSION: u32 = 1;

/// Default local address for a rule without an explicit one.
pub const DEFAULT_LOCAL_IP: &str = "127.0.0.1";

/// Complete persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "RelayConfig::is_empty")]
    pub relay: RelayConfig,
    #[serde(flatten)]
    pub extra: toml::Table,
}

const fn default_version() -> u32 {
    CURRENT_VERSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            relay: RelayConfig::default(),
            extra: toml::Table::new(),
        }
    }
}

/// Relay client section: server credentials plus the rule-set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// `host:port` of the relay server.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ConnectionRule>,
}

impl RelayConfig {
    fn is_empty(&self) -> bool {
        self.server.is_empty() && self.token.is_empty() && self.rules.is_empty()
    }
}

/// Transport protocol of a rule, as understood by the relay client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Stcp,
    Xtcp,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Http => "http",
            Self::Https => "https",
            Self::Stcp => "stcp",
            Self::Xtcp => "xtcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "stcp" => Ok(Self::Stcp),
            "xtcp" => Ok(Self::Xtcp),
            other => Err(Error::InvalidRule(format!(
                "unknown protocol {other:?} (expected tcp, udp, http, https, stcp or xtcp)"
            ))),
        }
    }
}

/// One forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRule {
    pub name: String,
    #[serde(rename = "proto")]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    pub local_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ConnectionRule {
    /// Rule forwarding `local_port` on loopback, with nothing else set.
    pub fn new(name: impl Into<String>, protocol: Protocol, local_port: u16) -> Self {
        Self {
            name: name.into(),
            protocol,
            local_ip: None,
            local_port,
            remote_port: None,
            domain: None,
        }
    }

    /// Local address, falling back to loopback.
    pub fn local_ip_or_default(&self) -> &str {
        self.local_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .unwrap_or(DEFAULT_LOCAL_IP)
    }

    /// Remote port, only when it is meaningful (> 0).
    pub fn effective_remote_port(&self) -> Option<u16> {
        self.remote_port.filter(|p| *p > 0)
    }

    /// Custom domain, only when non-empty.
    pub fn effective_domain(&self) -> Option<&str> {
        self.domain.as_deref().filter(|d| !d.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRule("rule name must not be empty".into()));
        }
        if self.local_port == 0 {
            return Err(Error::InvalidRule(format!(
                "rule {:?}: local port must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load config from disk. A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save config to disk, replacing the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        write_atomic(path, &content)?;
        tracing::debug!("saved config to {}", path.display());
        Ok(())
    }

    /// Record the relay server credentials. Leaves the rule-set alone.
    pub fn set_server(&mut self, server: impl Into<String>, token: impl Into<String>) {
        self.relay.server = server.into();
        self.relay.token = token.into();
    }

    pub fn find_rule(&self, name: &str) -> Option<&ConnectionRule> {
        self.relay.rules.iter().find(|r| r.name == name)
    }

    /// Append a rule. Names are unique within the rule-set.
    pub fn add_rule(&mut self, rule: ConnectionRule) -> Result<()> {
        rule.validate()?;
        if self.find_rule(&rule.name).is_some() {
            return Err(Error::RuleExists { name: rule.name });
        }
        self.relay.rules.push(rule);
        Ok(())
    }

    /// Remove a rule by name, returning it.
    pub fn remove_rule(&mut self, name: &str) -> Result<ConnectionRule> {
        let idx = self
            .relay
            .rules
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| Error::RuleNotFound { name: name.into() })?;
        Ok(self.relay.rules.remove(idx))
    }
}

/// Write `contents` to `path` through a temp file in the same directory, so
/// readers never observe a half-written file. The temp file is created with
/// owner-only permissions on unix and keeps them after the rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
