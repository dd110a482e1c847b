pub mod error;
pub mod prompt;
pub mod provision;
pub mod relay;
pub mod ssh;

pub use error::{ProvisionError, SshError};
