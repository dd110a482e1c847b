use std::path::PathBuf;

use anyhow::Result;
use dialoguer::{Input, Password, Select};

/// Environment variable read for the SSH password in non-interactive mode.
pub const PASSWORD_ENV: &str = "TUNNELCTL_SSH_PASSWORD";

/// How the operator wants to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChoice {
    /// Agent and default keys only.
    AutoDetect,
    KeyFile,
    Password,
}

/// Prompt for the server host.
pub fn prompt_host(non_interactive: bool) -> Result<String> {
    if non_interactive {
        anyhow::bail!("--host is required in non-interactive mode");
    }
    let host: String = Input::new()
        .with_prompt("Server address (IP or domain)")
        .interact_text()?;
    Ok(host.trim().to_string())
}

/// Prompt for the SSH port.
pub fn prompt_port(non_interactive: bool, default: u16) -> Result<u16> {
    if non_interactive {
        return Ok(default);
    }
    let port: u16 = Input::new()
        .with_prompt("SSH port")
        .default(default)
        .interact_text()?;
    Ok(port)
}

/// Prompt for the SSH user.
pub fn prompt_user(non_interactive: bool, default: &str) -> Result<String> {
    if non_interactive {
        return Ok(default.to_string());
    }
    let user: String = Input::new()
        .with_prompt("SSH user")
        .default(default.to_string())
        .interact_text()?;
    Ok(user)
}

/// Prompt for the authentication method.
pub fn prompt_auth_choice(non_interactive: bool) -> Result<AuthChoice> {
    if non_interactive {
        return Ok(AuthChoice::AutoDetect);
    }
    let items = &[
        "SSH key (auto-detect agent and ~/.ssh keys)",
        "SSH key file",
        "Password",
    ];
    let selection = Select::new()
        .with_prompt("Authentication")
        .items(items)
        .default(0)
        .interact()?;
    Ok(match selection {
        1 => AuthChoice::KeyFile,
        2 => AuthChoice::Password,
        _ => AuthChoice::AutoDetect,
    })
}

/// Prompt for a private key path.
pub fn prompt_key_path() -> Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Private key path")
        .default("~/.ssh/id_rsa".to_string())
        .interact_text()?;
    Ok(expand_home(&path))
}

/// Prompt for the SSH password (hidden input).
pub fn prompt_password(non_interactive: bool) -> Result<String> {
    if non_interactive {
        std::env::var(PASSWORD_ENV).map_err(|_| {
            anyhow::anyhow!("{PASSWORD_ENV} env var is required for password auth in non-interactive mode")
        })
    } else {
        let password: String = Password::new().with_prompt("SSH password").interact()?;
        Ok(password)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
