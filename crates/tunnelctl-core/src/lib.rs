//! tunnelctl core library
//!
//! Shared functionality for the tunnelctl binaries:
//! - Persisted relay configuration and rule-set management
//! - Materialization of the relay client's own config file
//! - PID-file based supervision of one background process
//! - Log tail / follow
//! - Common error types

pub mod config;
pub mod error;
pub mod fallback;
pub mod logtail;
pub mod materialize;
pub mod relay;
pub mod supervisor;
pub mod tracing_init;
pub mod workspace;

pub use config::{Config, ConnectionRule, RelayConfig};
pub use error::{Error, Result};
pub use supervisor::{ManagedProcess, ProcessSupervisor};
pub use workspace::Workspace;
