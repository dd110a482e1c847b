//! tunnelctl CLI
//!
//! Local control of the relay client: server credentials, forwarding rules,
//! and the background `frpc` process.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tunnelctl_core::Workspace;

mod relay_cmd;

use relay_cmd::RelayAction;

#[derive(Parser, Debug)]
#[command(name = "tunnelctl")]
#[command(version, about = "Local control plane for a self-hosted relay tunnel", long_about = None)]
struct Cli {
    /// State directory (default: $TUNNELCTL_HOME, then the platform config dir)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Path to the frpc executable (default: <home>/bin/frpc)
    #[arg(long, global = true)]
    frpc: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage the self-hosted relay client
    #[command(subcommand)]
    Relay(RelayAction),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tunnelctl_core::tracing_init::init_tracing("tunnelctl=info,tunnelctl_core=info", cli.log_json);

    let workspace = Workspace::resolve(cli.home.as_deref())?.with_client_binary(cli.frpc);
    tracing::debug!(home = %workspace.root().display(), "resolved workspace");

    match cli.command {
        Commands::Relay(action) => relay_cmd::run(action, &workspace),
    }
}
