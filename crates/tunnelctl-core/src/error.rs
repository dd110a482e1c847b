//! Error types for the tunnelctl core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tunnelctl operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The managed binary is not present at its resolved path.
    #[error("binary not found at {}; place the executable there or pass --frpc <path>", path.display())]
    MissingBinary { path: PathBuf },

    /// A live process is already tracked under this name.
    #[error("{name} is already running (PID {pid})")]
    AlreadyRunning { name: String, pid: u32 },

    /// No readable PID record exists for this name.
    #[error("{name} is not running")]
    NotRunning { name: String },

    /// The platform refused to terminate the recorded process.
    #[error("failed to stop PID {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    /// Materialization was requested without a relay server address.
    #[error("no relay server configured; run `tunnelctl relay init` first")]
    MissingServer,

    /// The relay server address is not a `host:port` pair.
    #[error("invalid server address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// A file that must exist was not found.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A rule with this name already exists in the rule-set.
    #[error("rule {name:?} already exists")]
    RuleExists { name: String },

    /// No rule with this name exists in the rule-set.
    #[error("rule {name:?} does not exist")]
    RuleNotFound { name: String },

    /// A rule failed validation before insertion.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML deserialization error
    #[error("failed to parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("failed to serialize TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
