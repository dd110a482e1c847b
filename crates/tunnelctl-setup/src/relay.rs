//! `tunnelctl-setup relay`: install a relay server over SSH and point the
//! local client at it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tunnelctl_core::Workspace;

use crate::prompt::{self, AuthChoice};
use crate::provision::{
    self, DEFAULT_RELAY_PORT, ProvisionOutcome, Provisioner, SshConnector,
};
use crate::ssh::{Credentials, DEFAULT_SSH_PORT, DEFAULT_SSH_USER, RemoteTarget};

/// Arguments for the `relay` subcommand.
#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Server IP or domain name (prompted if omitted)
    #[arg(long)]
    pub host: Option<String>,

    /// SSH port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// SSH user
    #[arg(long)]
    pub user: Option<String>,

    /// Private key file
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Authenticate with a password (prompted, or read from TUNNELCTL_SSH_PASSWORD)
    #[arg(long)]
    pub password: bool,

    /// Port the relay server listens on
    #[arg(long, default_value_t = DEFAULT_RELAY_PORT)]
    pub relay_port: u16,
}

/// Merge flags with interactively collected answers.
///
/// Prompts only run when `--host` is absent, so a fully flagged invocation
/// never blocks on input.
pub fn resolve_target(args: &RelayArgs, non_interactive: bool) -> Result<RemoteTarget> {
    let mut key_file = args.key.clone();
    let mut wants_password = args.password;

    let (host, port, user) = if let Some(host) = &args.host {
        (
            host.trim().to_string(),
            args.port.unwrap_or(DEFAULT_SSH_PORT),
            args.user.clone().unwrap_or_else(|| DEFAULT_SSH_USER.into()),
        )
    } else {
        let host = prompt::prompt_host(non_interactive)?;
        let port = match args.port {
            Some(p) => p,
            None => prompt::prompt_port(non_interactive, DEFAULT_SSH_PORT)?,
        };
        let user = match &args.user {
            Some(u) => u.clone(),
            None => prompt::prompt_user(non_interactive, DEFAULT_SSH_USER)?,
        };
        if key_file.is_none() && !wants_password {
            match prompt::prompt_auth_choice(non_interactive)? {
                AuthChoice::KeyFile => key_file = Some(prompt::prompt_key_path()?),
                AuthChoice::Password => wants_password = true,
                AuthChoice::AutoDetect => {}
            }
        }
        (host, port, user)
    };

    let password = if wants_password {
        Some(prompt::prompt_password(non_interactive)?)
    } else {
        None
    };

    Ok(RemoteTarget {
        host,
        port,
        user,
        credentials: Credentials { key_file, password },
    })
}

/// Run the relay provisioning flow.
pub fn run(args: &RelayArgs, non_interactive: bool, workspace: &Workspace) -> Result<()> {
    let target = resolve_target(args, non_interactive)?;
    let provisioner =
        Provisioner::new(SshConnector, workspace.config_path()).relay_port(args.relay_port);

    let mut stdout = std::io::stdout();
    let outcome = provisioner
        .run(&target, &mut stdout)
        .with_context(|| format!("relay setup on {} failed", target.host))?;
    print_summary(&outcome);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_summary(outcome: &ProvisionOutcome) {
    println!();
    match outcome {
        ProvisionOutcome::Configured { server, token } => {
            println!("Relay server installed and configured.");
            println!("  Server: {server}");
            println!("  Token:  {token}");
            println!();
            println!("Next steps:");
            println!("  tunnelctl relay add <name> --local-port <port>");
            println!("  tunnelctl relay up");
        }
        ProvisionOutcome::ManualCompletion { server, reason } => {
            println!("Relay server installed, but the local client was not configured: {reason}");
            println!(
                "Read auth.token from {} on the server, then run:",
                provision::RELAY_CONFIG_PATH
            );
            println!("  {}", provision::manual_init_command(server));
        }
    }
}
