//! SSH authentication methods and the order they are tried in.

use std::fmt;
use std::path::{Path, PathBuf};

use ssh2::Session;

use crate::error::SshError;

/// Private keys tried when nothing explicit works, relative to `~/.ssh`.
pub const DEFAULT_KEY_NAMES: [&str; 2] = ["id_ed25519", "id_rsa"];

/// Credentials supplied by the operator. Both are optional.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub key_file: Option<PathBuf>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_file", &self.key_file)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One way of authenticating.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    KeyFile(PathBuf),
    Password(String),
    Agent,
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::Agent => f.write_str("Agent"),
        }
    }
}

impl AuthMethod {
    pub fn describe(&self) -> String {
        match self {
            Self::KeyFile(path) => format!("key {}", path.display()),
            Self::Password(_) => "password".to_string(),
            Self::Agent => "ssh-agent".to_string(),
        }
    }

    /// Attempt this method on a handshaken session.
    pub fn authenticate(&self, session: &Session, user: &str) -> Result<(), SshError> {
        match self {
            Self::KeyFile(path) => session.userauth_pubkey_file(user, None, path, None)?,
            Self::Password(password) => session.userauth_password(user, password)?,
            Self::Agent => session.userauth_agent(user)?,
        }
        if session.authenticated() {
            Ok(())
        } else {
            Err(SshError::AuthRejected {
                method: self.describe(),
            })
        }
    }
}

/// Ordered, labelled methods to try: explicit key, explicit password,
/// agent, then the conventional default keys that exist on disk.
///
/// Default keys are skipped when an explicit key was given.
pub fn candidates(
    credentials: &Credentials,
    ssh_dir: Option<&Path>,
    agent_available: bool,
) -> Vec<(String, AuthMethod)> {
    let mut methods = Vec::new();
    if let Some(key) = &credentials.key_file {
        methods.push(AuthMethod::KeyFile(key.clone()));
    }
    if let Some(password) = credentials.password.as_ref().filter(|p| !p.is_empty()) {
        methods.push(AuthMethod::Password(password.clone()));
    }
    if agent_available {
        methods.push(AuthMethod::Agent);
    }
    if let Some(dir) = ssh_dir.filter(|_| credentials.key_file.is_none()) {
        methods.extend(
            DEFAULT_KEY_NAMES
                .iter()
                .map(|name| dir.join(name))
                .filter(|p| p.is_file())
                .map(AuthMethod::KeyFile),
        );
    }
    methods.into_iter().map(|m| (m.describe(), m)).collect()
}

/// Whether an agent socket is advertised in the environment.
pub fn agent_available() -> bool {
    std::env::var_os("SSH_AUTH_SOCK").is_some_and(|s| !s.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ssh_dir_with(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), "key").unwrap();
        }
        dir
    }

    #[test]
    fn priority_is_key_password_agent_defaults() {
        let dir = ssh_dir_with(&["id_ed25519", "id_rsa"]);
        let creds = Credentials {
            key_file: None,
            password: Some("pw".into()),
        };
        let methods: Vec<AuthMethod> = candidates(&creds, Some(dir.path()), true)
            .into_iter()
            .map(|(_, m)| m)
            .collect();
        assert_eq!(
            methods,
            vec![
                AuthMethod::Password("pw".into()),
                AuthMethod::Agent,
                AuthMethod::KeyFile(dir.path().join("id_ed25519")),
                AuthMethod::KeyFile(dir.path().join("id_rsa")),
            ]
        );
    }

    #[test]
    fn explicit_key_suppresses_default_keys() {
        let dir = ssh_dir_with(&["id_rsa"]);
        let creds = Credentials {
            key_file: Some(PathBuf::from("/keys/deploy")),
            password: None,
        };
        let labels: Vec<String> = candidates(&creds, Some(dir.path()), false)
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["key /keys/deploy"]);
    }

    #[test]
    fn missing_default_keys_are_skipped() {
        let dir = ssh_dir_with(&["id_rsa"]);
        let found = candidates(&Credentials::default(), Some(dir.path()), false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, AuthMethod::KeyFile(dir.path().join("id_rsa")));
    }

    #[test]
    fn nothing_available_yields_no_candidates() {
        let dir = ssh_dir_with(&[]);
        assert!(candidates(&Credentials::default(), Some(dir.path()), false).is_empty());
        assert!(candidates(&Credentials::default(), None, false).is_empty());
    }

    #[test]
    fn password_is_never_printed() {
        let creds = Credentials {
            key_file: None,
            password: Some("hunter2".into()),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
        assert!(!format!("{:?}", AuthMethod::Password("hunter2".into())).contains("hunter2"));
    }
}
