//! Reading the generated auth token back from the remote config.

use crate::ssh::RemoteShell;

use super::RELAY_CONFIG_PATH;
use super::templates::TOKEN_SED;

/// Read-only command printing the token from the remote config.
pub fn token_command() -> String {
    format!("sed -n '{TOKEN_SED}' {RELAY_CONFIG_PATH}")
}

/// Fetch the token. The error is a reason for the operator, not a failure of
/// the run.
pub fn read_token(shell: &mut dyn RemoteShell) -> Result<String, String> {
    let output = shell
        .run_capture(&token_command())
        .map_err(|e| format!("could not read {RELAY_CONFIG_PATH}: {e}"))?;
    parse_token(&output)
}

fn parse_token(output: &str) -> Result<String, String> {
    let token = output.lines().map(str::trim).find(|l| !l.is_empty());
    match token {
        Some(t) if !t.contains(['"', ' ']) => Ok(t.to_string()),
        Some(t) => Err(format!("unexpected auth.token value {t:?}")),
        None => Err(format!("no auth.token found in {RELAY_CONFIG_PATH}")),
    }
}
