//! `tunnelctl relay ...` subcommands.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};

use tunnelctl_core::config::{Config, ConnectionRule, Protocol};
use tunnelctl_core::logtail;
use tunnelctl_core::materialize::split_host_port;
use tunnelctl_core::relay::{RelayClient, RelayStatus};
use tunnelctl_core::workspace::RELAY_CLIENT_NAME;
use tunnelctl_core::{Error, Workspace};

/// Relay client subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum RelayAction {
    /// Record the relay server address and auth token
    Init {
        /// Relay server as host:port
        #[arg(long)]
        server: String,
        /// Auth token configured on the server
        #[arg(long, default_value = "")]
        token: String,
    },
    /// Add a forwarding rule
    Add {
        /// Unique rule name
        name: String,
        /// tcp, udp, http, https, stcp or xtcp
        #[arg(long, default_value = "tcp")]
        proto: Protocol,
        #[arg(long)]
        local_port: u16,
        /// Local address (default: 127.0.0.1)
        #[arg(long)]
        local_ip: Option<String>,
        #[arg(long)]
        remote_port: Option<u16>,
        /// Custom domain for http/https rules
        #[arg(long)]
        domain: Option<String>,
    },
    /// Remove a forwarding rule
    Remove { name: String },
    /// List forwarding rules
    List {
        #[arg(long)]
        json: bool,
    },
    /// Start the relay client in the background
    Up,
    /// Stop the background relay client
    Down,
    /// Show server, process state and rule count
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show the relay client log
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = logtail::DEFAULT_TAIL_LINES)]
        lines: usize,
        /// Keep printing new lines as they are written
        #[arg(short, long)]
        follow: bool,
    },
    /// Expose one local port in the foreground, without touching saved rules
    Quick {
        port: u16,
        #[arg(long, default_value = "tcp")]
        proto: Protocol,
    },
}

/// Execute a `relay` subcommand.
pub fn run(action: RelayAction, workspace: &Workspace) -> Result<()> {
    let client = RelayClient::new(workspace.clone());
    match action {
        RelayAction::Init { server, token } => init(workspace, &server, &token),
        RelayAction::Add {
            name,
            proto,
            local_port,
            local_ip,
            remote_port,
            domain,
        } => add(
            &client,
            ConnectionRule {
                local_ip,
                remote_port,
                domain,
                ..ConnectionRule::new(name, proto, local_port)
            },
        ),
        RelayAction::Remove { name } => remove(&client, &name),
        RelayAction::List { json } => list(&client, json),
        RelayAction::Up => up(&client),
        RelayAction::Down => down(&client),
        RelayAction::Status { json } => status(&client, json),
        RelayAction::Logs { lines, follow } => logs(workspace, lines, follow),
        RelayAction::Quick { port, proto } => quick(&client, port, proto),
    }
}

#[allow(clippy::print_stdout)]
fn init(workspace: &Workspace, server: &str, token: &str) -> Result<()> {
    split_host_port(server)?;
    let path = workspace.config_path();
    let mut config = Config::load(&path)?;
    config.set_server(server, token);
    config
        .save(&path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    println!("Relay server set to {server}");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn add(client: &RelayClient, rule: ConnectionRule) -> Result<()> {
    let path = client.workspace().config_path();
    let mut config = client.load_config()?;
    let name = rule.name.clone();
    config.add_rule(rule)?;
    config.save(&path)?;
    println!("Added rule {name}");
    restart_hint(client);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn remove(client: &RelayClient, name: &str) -> Result<()> {
    let path = client.workspace().config_path();
    let mut config = client.load_config()?;
    config.remove_rule(name)?;
    config.save(&path)?;
    println!("Removed rule {name}");
    restart_hint(client);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn restart_hint(client: &RelayClient) {
    if client.status().is_ok_and(|s| s.running) {
        println!("The relay client is running; run `tunnelctl relay down && tunnelctl relay up` to apply.");
    }
}

#[allow(clippy::print_stdout)]
fn list(client: &RelayClient, json: bool) -> Result<()> {
    let rules = client.load_config()?.relay.rules;
    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
    } else if rules.is_empty() {
        println!("No rules configured. Add one with `tunnelctl relay add <name> --local-port <port>`.");
    } else {
        print!("{}", render_rules_table(&rules));
    }
    Ok(())
}

fn render_rules_table(rules: &[ConnectionRule]) -> String {
    let rows: Vec<[String; 5]> = rules
        .iter()
        .map(|r| {
            [
                r.name.clone(),
                r.protocol.to_string(),
                format!("{}:{}", r.local_ip_or_default(), r.local_port),
                r.effective_remote_port()
                    .map_or_else(|| "-".to_string(), |p| p.to_string()),
                r.effective_domain().unwrap_or("-").to_string(),
            ]
        })
        .collect();
    let header = ["NAME", "PROTO", "LOCAL", "REMOTE", "DOMAIN"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[&str]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    };
    push_row(&header);
    for row in &rows {
        push_row(&row.each_ref().map(String::as_str));
    }
    out
}

#[allow(clippy::print_stdout)]
fn up(client: &RelayClient) -> Result<()> {
    match client.up() {
        Ok(pid) => {
            println!("Relay client started (PID {pid})");
            println!(
                "Logs: {}",
                client.workspace().log_path(RELAY_CLIENT_NAME).display()
            );
            Ok(())
        }
        Err(Error::AlreadyRunning { pid, .. }) => {
            println!("Relay client is already running (PID {pid})");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to start relay client"),
    }
}

#[allow(clippy::print_stdout)]
fn down(client: &RelayClient) -> Result<()> {
    match client.down() {
        Ok(pid) => {
            println!("Relay client stopped (PID {pid})");
            Ok(())
        }
        Err(Error::NotRunning { .. }) => {
            println!("Relay client is not running");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to stop relay client"),
    }
}

#[allow(clippy::print_stdout)]
fn status(client: &RelayClient, json: bool) -> Result<()> {
    let status = client.status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render_status(&status));
    }
    Ok(())
}

fn render_status(status: &RelayStatus) -> String {
    let state = match status.pid {
        Some(pid) if status.running => format!("running (PID {pid})"),
        _ => "stopped".to_string(),
    };
    format!(
        "Server:  {}\nClient:  {state}\nRules:   {}\nLog:     {}\n",
        status.server.as_deref().unwrap_or("(not configured)"),
        status.rules,
        status.log_file.display()
    )
}

#[allow(clippy::print_stdout)]
fn logs(workspace: &Workspace, lines: usize, follow: bool) -> Result<()> {
    let path = workspace.log_path(RELAY_CLIENT_NAME);
    for line in logtail::read_tail(&path, lines)? {
        println!("{line}");
    }
    if follow {
        let offset = logtail::current_len(&path)?;
        logtail::follow(&path, offset, |line| println!("{line}"));
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn quick(client: &RelayClient, port: u16, proto: Protocol) -> Result<()> {
    if port == 0 {
        bail!("port must be greater than 0");
    }
    println!("Exposing local port {port} ({proto}) through the relay; Ctrl-C to stop");
    let status = client.quick(port, proto)?;
    if !status.success() {
        bail!("relay client exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn table_uses_dash_for_absent_fields() {
        let rules = vec![
            ConnectionRule {
                remote_port: Some(9000),
                ..ConnectionRule::new("web", Protocol::Tcp, 8080)
            },
            ConnectionRule {
                domain: Some("app.example.com".into()),
                ..ConnectionRule::new("site", Protocol::Http, 3000)
            },
        ];
        let table = render_rules_table(&rules);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].contains("127.0.0.1:8080"));
        assert!(lines[1].contains("9000"));
        assert!(lines[1].ends_with('-'));
        assert!(lines[2].contains("app.example.com"));
    }

    #[test]
    fn status_text_for_stopped_client() {
        let text = render_status(&RelayStatus {
            server: None,
            running: false,
            pid: None,
            rules: 2,
            log_file: PathBuf::from("/tmp/frpc.log"),
        });
        assert!(text.contains("(not configured)"));
        assert!(text.contains("stopped"));
        assert!(text.contains("Rules:   2"));
    }

    #[test]
    fn init_rejects_address_without_port() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(init(&ws, "relay.example.com", "tok").is_err());
        assert!(!ws.config_path().exists());
    }

    #[test]
    fn init_then_add_persists_both() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        init(&ws, "1.2.3.4:7000", "abc").unwrap();
        let client = RelayClient::new(ws.clone());
        add(&client, ConnectionRule::new("ssh", Protocol::Tcp, 22)).unwrap();
        assert!(add(&client, ConnectionRule::new("ssh", Protocol::Tcp, 2222)).is_err());

        let cfg = Config::load(&ws.config_path()).unwrap();
        assert_eq!(cfg.relay.server, "1.2.3.4:7000");
        assert_eq!(cfg.relay.rules.len(), 1);
        assert_eq!(cfg.relay.rules[0].local_port, 22);
    }
}
