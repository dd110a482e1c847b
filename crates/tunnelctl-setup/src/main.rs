use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tunnelctl_core::Workspace;
use tunnelctl_setup::relay::RelayArgs;

/// tunnelctl provisioning tool.
#[derive(Debug, Parser)]
#[command(name = "tunnelctl-setup", version, about)]
struct Cli {
    /// Run without interactive prompts (use defaults or CLI flags)
    #[arg(long, global = true)]
    non_interactive: bool,

    /// State directory updated with the new server (default: $TUNNELCTL_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install a relay server on a remote Linux host over SSH
    Relay(RelayArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tunnelctl_core::tracing_init::init_tracing("info", cli.log_json);

    let workspace = Workspace::resolve(cli.home.as_deref())?;

    match cli.command {
        Commands::Relay(ref args) => {
            tunnelctl_setup::relay::run(args, cli.non_interactive, &workspace)?;
        }
    }

    Ok(())
}
