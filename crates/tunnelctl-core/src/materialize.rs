//! Renders the persisted rule-set into the relay client's own config file.
//!
//! The output is regenerated from scratch on every call and replaces the
//! previous file, so the client always sees exactly the last rule-set.

use std::fmt::Write as _;
use std::path::Path;

use toml::Value;

use crate::config::{ConnectionRule, RelayConfig, write_atomic};
use crate::error::{Error, Result};

/// Split `host:port`. IPv6 hosts must be bracketed (`[::1]:7000`).
pub fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let invalid = |reason: &str| Error::InvalidAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port"))?;
        (host, port)
    } else {
        let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        if host.contains(':') {
            return Err(invalid("too many colons; bracket IPv6 hosts"));
        }
        (host, port)
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| invalid("port must be a number between 1 and 65535"))?;
    if port == 0 {
        return Err(invalid("port must be a number between 1 and 65535"));
    }
    Ok((host, port))
}

/// Render the client config text.
pub fn render(server: &str, token: &str, rules: &[ConnectionRule]) -> Result<String> {
    if server.trim().is_empty() {
        return Err(Error::MissingServer);
    }
    let (host, port) = split_host_port(server.trim())?;

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "serverAddr = {}", string(host));
    let _ = writeln!(out, "serverPort = {port}");
    if !token.is_empty() {
        let _ = writeln!(out, "auth.token = {}", string(token));
    }
    out.push('\n');

    for rule in rules {
        out.push_str("[[proxies]]\n");
        let _ = writeln!(out, "name = {}", string(&rule.name));
        let _ = writeln!(out, "type = {}", string(rule.protocol.as_str()));
        let _ = writeln!(out, "localIP = {}", string(rule.local_ip_or_default()));
        let _ = writeln!(out, "localPort = {}", rule.local_port);
        if let Some(remote) = rule.effective_remote_port() {
            let _ = writeln!(out, "remotePort = {remote}");
        }
        if let Some(domain) = rule.effective_domain() {
            let domains = Value::Array(vec![Value::String(domain.to_owned())]);
            let _ = writeln!(out, "customDomains = {domains}");
        }
        out.push('\n');
    }
    Ok(out)
}

/// TOML string value, escaped by the toml encoder.
fn string(s: &str) -> Value {
    Value::String(s.to_owned())
}

/// Regenerate the client config at `path` from the relay section.
pub fn generate(path: &Path, relay: &RelayConfig) -> Result<()> {
    let content = render(&relay.server, &relay.token, &relay.rules)?;
    write_atomic(path, &content)?;
    tracing::debug!(
        path = %path.display(),
        rules = relay.rules.len(),
        "materialized relay client config"
    );
    Ok(())
}
