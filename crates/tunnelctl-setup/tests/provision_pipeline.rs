//! End-to-end provisioning runs against a scripted in-memory shell.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use tunnelctl_core::Config;
use tunnelctl_setup::provision::harvest::token_command;
use tunnelctl_setup::provision::{
    Connector, PreflightCheck, ProvisionOutcome, Provisioner, RELAY_CONFIG_PATH,
};
use tunnelctl_setup::ssh::{RemoteShell, RemoteTarget, ScriptPayload};
use tunnelctl_setup::{ProvisionError, SshError};

/// What the fake host answers, plus a record of what it was asked.
#[derive(Debug, Default)]
struct Host {
    replies: HashMap<String, Result<String, i32>>,
    script_status: i32,
    script_output: String,
    commands: Vec<String>,
    scripts: Vec<String>,
}

impl Host {
    /// A fresh Ubuntu box that passes every preflight check.
    fn healthy() -> Self {
        let mut host = Self::default();
        host.reply("uname -s", Ok("Linux"));
        host.reply("cat /etc/os-release", Ok("ID=ubuntu\nPRETTY_NAME=\"Ubuntu 24.04 LTS\""));
        host.reply("id -u", Ok("0"));
        host.reply("uname -m", Ok("x86_64"));
        host.reply("systemctl is-active frps", Err((3, "inactive")));
        host.reply("command -v curl", Ok("/usr/bin/curl"));
        host.reply(&token_command(), Ok("0123456789abcdef0123456789abcdef"));
        host.script_output = "[INFO] frps started on port 7000\n".into();
        host
    }

    fn reply(&mut self, command: &str, reply: Result<&str, (i32, &str)>) {
        let stored = match reply {
            Ok(out) => Ok(out.to_string()),
            Err((status, out)) => {
                self.replies
                    .insert(format!("{command}#output"), Ok(out.to_string()));
                Err(status)
            }
        };
        self.replies.insert(command.to_string(), stored);
    }
}

#[derive(Debug, Clone)]
struct ScriptedShell(Rc<RefCell<Host>>);

impl RemoteShell for ScriptedShell {
    fn run_capture(&mut self, command: &str) -> Result<String, SshError> {
        let mut host = self.0.borrow_mut();
        host.commands.push(command.to_string());
        match host.replies.get(command).cloned() {
            Some(Ok(out)) => Ok(out),
            Some(Err(status)) => Err(SshError::CommandFailed {
                command: command.to_string(),
                status,
                output: host
                    .replies
                    .get(&format!("{command}#output"))
                    .and_then(|r| r.clone().ok())
                    .unwrap_or_default(),
            }),
            None => Err(SshError::CommandFailed {
                command: command.to_string(),
                status: 127,
                output: "command not found".into(),
            }),
        }
    }

    fn run_script(&mut self, script: &ScriptPayload, out: &mut dyn Write) -> Result<i32, SshError> {
        let mut host = self.0.borrow_mut();
        host.scripts.push(script.as_str().to_string());
        out.write_all(host.script_output.as_bytes())?;
        Ok(host.script_status)
    }
}

struct FakeConnector {
    host: Rc<RefCell<Host>>,
    refuse: Option<ProvisionError>,
}

impl FakeConnector {
    fn new(host: Host) -> (Self, Rc<RefCell<Host>>) {
        let host = Rc::new(RefCell::new(host));
        (
            Self {
                host: Rc::clone(&host),
                refuse: None,
            },
            host,
        )
    }
}

impl Connector for FakeConnector {
    type Shell = ScriptedShell;

    fn connect(&self, _target: &RemoteTarget) -> Result<ScriptedShell, ProvisionError> {
        match &self.refuse {
            Some(ProvisionError::AuthExhausted { attempts }) => Err(ProvisionError::AuthExhausted {
                attempts: attempts.clone(),
            }),
            Some(_) => Err(ProvisionError::ConnectFailed {
                addr: "test".into(),
                reason: "refused".into(),
            }),
            None => Ok(ScriptedShell(Rc::clone(&self.host))),
        }
    }
}

fn seeded_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let mut config = Config::default();
    config.set_server("old.example.com:7000", "old-token");
    config
        .add_rule(tunnelctl_core::ConnectionRule::new(
            "web",
            tunnelctl_core::config::Protocol::Tcp,
            8080,
        ))
        .unwrap();
    config.save(&path).unwrap();
    path
}

#[test]
fn successful_run_persists_server_and_token() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = seeded_config(dir.path());
    let (connector, host) = FakeConnector::new(Host::healthy());

    let mut out = Vec::new();
    let outcome = Provisioner::new(connector, &config_path)
        .run(&RemoteTarget::new("1.2.3.4"), &mut out)
        .unwrap();

    assert_eq!(
        outcome,
        ProvisionOutcome::Configured {
            server: "1.2.3.4:7000".into(),
            token: "0123456789abcdef0123456789abcdef".into(),
        }
    );
    assert_eq!(String::from_utf8(out).unwrap(), "[INFO] frps started on port 7000\n");

    let saved = Config::load(&config_path).unwrap();
    assert_eq!(saved.relay.server, "1.2.3.4:7000");
    assert_eq!(saved.relay.token, "0123456789abcdef0123456789abcdef");
    assert_eq!(saved.relay.rules.len(), 1, "rule-set must not be touched");

    let host = host.borrow();
    assert_eq!(host.scripts.len(), 1);
    assert!(host.scripts[0].contains("frp_0.66.0_linux_amd64"));
    assert!(host.scripts[0].ends_with("exit $?\n"));
}

#[test]
fn darwin_host_aborts_in_preflight_without_installing() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = seeded_config(dir.path());
    let before = std::fs::read_to_string(&config_path).unwrap();

    let mut remote = Host::healthy();
    remote.reply("uname -s", Ok("Darwin"));
    let (connector, host) = FakeConnector::new(remote);

    let err = Provisioner::new(connector, &config_path)
        .run(&RemoteTarget::new("1.2.3.4"), &mut std::io::sink())
        .unwrap_err();

    match err {
        ProvisionError::PreflightCheckFailed { check, detail } => {
            assert_eq!(check, PreflightCheck::OperatingSystem);
            assert!(detail.contains("Darwin"), "{detail}");
        }
        other => panic!("expected preflight failure, got {other:?}"),
    }
    let host = host.borrow();
    assert!(host.scripts.is_empty(), "install must never run");
    assert_eq!(host.commands, vec!["uname -s"]);
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), before);
}

#[test]
fn each_preflight_gate_names_itself() {
    let cases: Vec<(&str, Result<&str, (i32, &str)>, PreflightCheck)> = vec![
        ("id -u", Ok("1000"), PreflightCheck::RootUser),
        ("uname -m", Ok("i686"), PreflightCheck::Architecture),
        ("systemctl is-active frps", Ok("active"), PreflightCheck::ServiceConflict),
        ("command -v curl", Err((1, "")), PreflightCheck::RequiredTool),
    ];
    for (command, reply, expected) in cases {
        let dir = tempfile::tempdir().unwrap();
        let mut remote = Host::healthy();
        remote.reply(command, reply);
        let (connector, host) = FakeConnector::new(remote);

        let err = Provisioner::new(connector, dir.path().join("config.toml"))
            .run(&RemoteTarget::new("1.2.3.4"), &mut std::io::sink())
            .unwrap_err();
        assert!(
            matches!(err, ProvisionError::PreflightCheckFailed { check, .. } if check == expected),
            "{command}: got {err:?}"
        );
        assert!(host.borrow().scripts.is_empty());
        assert!(!dir.path().join("config.toml").exists());
    }
}

#[test]
fn unreadable_os_release_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut remote = Host::healthy();
    remote.reply("cat /etc/os-release", Err((1, "No such file or directory")));
    let (connector, _host) = FakeConnector::new(remote);

    let outcome = Provisioner::new(connector, dir.path().join("config.toml"))
        .run(&RemoteTarget::new("1.2.3.4"), &mut std::io::sink())
        .unwrap();
    assert!(matches!(outcome, ProvisionOutcome::Configured { .. }));
}

#[test]
fn failed_install_reports_remote_status() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = seeded_config(dir.path());
    let before = std::fs::read_to_string(&config_path).unwrap();

    let mut remote = Host::healthy();
    remote.script_status = 1;
    let (connector, host) = FakeConnector::new(remote);

    let err = Provisioner::new(connector, &config_path)
        .run(&RemoteTarget::new("1.2.3.4"), &mut std::io::sink())
        .unwrap_err();
    assert!(matches!(err, ProvisionError::RemoteInstallFailed { status: 1 }));
    assert!(
        !host.borrow().commands.contains(&token_command()),
        "no harvest after a failed install"
    );
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), before);
}

#[test]
fn empty_token_degrades_to_manual_completion() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = seeded_config(dir.path());
    let before = std::fs::read_to_string(&config_path).unwrap();

    let mut remote = Host::healthy();
    remote.reply(&token_command(), Ok(""));
    let (connector, _host) = FakeConnector::new(remote);

    let outcome = Provisioner::new(connector, &config_path)
        .relay_port(7100)
        .run(&RemoteTarget::new("relay.example.com"), &mut std::io::sink())
        .unwrap();

    match &outcome {
        ProvisionOutcome::ManualCompletion { server, reason } => {
            assert_eq!(server, "relay.example.com:7100");
            assert!(reason.contains(RELAY_CONFIG_PATH), "{reason}");
        }
        other => panic!("expected manual completion, got {other:?}"),
    }
    assert_eq!(
        tunnelctl_setup::provision::manual_init_command(outcome.server()),
        "tunnelctl relay init --server relay.example.com:7100 --token <token>"
    );
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), before);
}

#[test]
fn unreadable_token_file_also_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let mut remote = Host::healthy();
    remote.reply(&token_command(), Err((2, "sed: can't read /etc/frps/frps.toml")));
    let (connector, _host) = FakeConnector::new(remote);

    let outcome = Provisioner::new(connector, dir.path().join("config.toml"))
        .run(&RemoteTarget::new("1.2.3.4"), &mut std::io::sink())
        .unwrap();
    assert!(matches!(outcome, ProvisionOutcome::ManualCompletion { .. }));
    assert!(!dir.path().join("config.toml").exists());
}

#[test]
fn blank_host_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let (connector, host) = FakeConnector::new(Host::healthy());

    let err = Provisioner::new(connector, dir.path().join("config.toml"))
        .run(&RemoteTarget::new("  "), &mut std::io::sink())
        .unwrap_err();
    assert!(matches!(err, ProvisionError::MissingHost));
    assert!(host.borrow().commands.is_empty());
}

#[test]
fn auth_failure_stops_before_any_remote_command() {
    let dir = tempfile::tempdir().unwrap();
    let (mut connector, host) = FakeConnector::new(Host::healthy());
    connector.refuse = Some(ProvisionError::AuthExhausted {
        attempts: "all candidates failed: password: rejected".into(),
    });

    let err = Provisioner::new(connector, dir.path().join("config.toml"))
        .run(&RemoteTarget::new("1.2.3.4"), &mut std::io::sink())
        .unwrap_err();
    assert!(matches!(err, ProvisionError::AuthExhausted { .. }));
    assert!(host.borrow().commands.is_empty());
    assert!(!dir.path().join("config.toml").exists());
}

#[test]
fn ipv6_host_is_bracketed_in_saved_server() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let (connector, _host) = FakeConnector::new(Host::healthy());

    let outcome = Provisioner::new(connector, &config_path)
        .run(&RemoteTarget::new("2001:db8::1"), &mut std::io::sink())
        .unwrap();
    assert_eq!(outcome.server(), "[2001:db8::1]:7000");
    let saved = Config::load(&config_path).unwrap();
    assert!(tunnelctl_core::materialize::split_host_port(&saved.relay.server).is_ok());
}
