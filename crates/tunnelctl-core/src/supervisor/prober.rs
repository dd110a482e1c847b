//! OS process table access: liveness probing and forced termination.
//!
//! The implementation is picked at runtime from the detected OS rather than
//! by compile-time branching at every call site.

use std::fmt;
use std::process::Command;

use crate::error::{Error, Result};

/// Result of probing one PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Alive,
    Dead,
    /// The process exists but we may not signal it (different user).
    PermissionDenied,
}

impl Probe {
    /// A permission-denied probe still proves the process exists.
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::Dead)
    }
}

/// Outcome of a forced termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Signalled,
    /// Nothing to kill: the PID no longer exists.
    AlreadyGone,
}

/// Capability to query and terminate OS processes by PID.
pub trait ProcessProber: fmt::Debug + Send + Sync {
    fn probe(&self, pid: u32) -> Probe;

    fn kill(&self, pid: u32) -> Result<KillOutcome>;
}

/// Select the prober for the OS we are running on.
pub fn detect() -> Box<dyn ProcessProber> {
    match std::env::consts::OS {
        "windows" => Box::new(TaskListProber),
        _ => native(),
    }
}

#[cfg(unix)]
fn native() -> Box<dyn ProcessProber> {
    Box::new(SignalProber)
}

#[cfg(not(unix))]
fn native() -> Box<dyn ProcessProber> {
    Box::new(TaskListProber)
}

/// POSIX prober built on `kill(2)`.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProber;

#[cfg(unix)]
impl ProcessProber for SignalProber {
    fn probe(&self, pid: u32) -> Probe {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Some(target) = to_nix_pid(pid) else {
            return Probe::Dead;
        };
        match kill(target, None) {
            Ok(()) if is_zombie(pid) => Probe::Dead,
            Ok(()) => Probe::Alive,
            Err(Errno::EPERM) => Probe::PermissionDenied,
            Err(_) => Probe::Dead,
        }
    }

    fn kill(&self, pid: u32) -> Result<KillOutcome> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};

        let Some(target) = to_nix_pid(pid) else {
            return Ok(KillOutcome::AlreadyGone);
        };
        match kill(target, Signal::SIGKILL) {
            Ok(()) => Ok(KillOutcome::Signalled),
            Err(Errno::ESRCH) => Ok(KillOutcome::AlreadyGone),
            Err(e) => Err(Error::KillFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// PIDs outside `1..=i32::MAX` cannot name a single process; 0 and negative
/// values would address process groups.
#[cfg(unix)]
fn to_nix_pid(pid: u32) -> Option<nix::unistd::Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(nix::unistd::Pid::from_raw)
}

/// A zombie still answers `kill(pid, 0)` but is dead for our purposes.
/// Only Linux exposes this cheaply; elsewhere this returns `false`.
#[cfg(unix)]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .is_some_and(|stat| stat_state(&stat) == Some('Z'))
}

/// Process state letter from a `/proc/<pid>/stat` line. The command name is
/// parenthesised and may itself contain `)` or spaces.
#[cfg_attr(not(unix), allow(dead_code))]
fn stat_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// Windows prober driving `tasklist` / `taskkill`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskListProber;

impl ProcessProber for TaskListProber {
    fn probe(&self, pid: u32) -> Probe {
        let filter = format!("PID eq {pid}");
        let Ok(output) = Command::new("tasklist")
            .args(["/FI", filter.as_str(), "/FO", "CSV", "/NH"])
            .output()
        else {
            return Probe::Dead;
        };
        if tasklist_lists_pid(&String::from_utf8_lossy(&output.stdout), pid) {
            Probe::Alive
        } else {
            Probe::Dead
        }
    }

    fn kill(&self, pid: u32) -> Result<KillOutcome> {
        let output = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .output()?;
        if output.status.success() {
            return Ok(KillOutcome::Signalled);
        }
        if !self.probe(pid).is_alive() {
            return Ok(KillOutcome::AlreadyGone);
        }
        Err(Error::KillFailed {
            pid,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// `tasklist /FO CSV /NH` prints one quoted row per match
/// (`"image","pid","session",...`) or an informational line in the user's
/// locale when nothing matches, so look at the PID column instead of matching
/// message text. Image names may contain spaces and commas.
fn tasklist_lists_pid(stdout: &str, pid: u32) -> bool {
    let needle = pid.to_string();
    stdout
        .lines()
        .any(|line| csv_fields(line).get(1).is_some_and(|field| *field == needle))
}

/// Split one CSV row. Quoted fields may contain commas and `""` escapes.
fn csv_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }
    fields.push(field);
    fields
}
