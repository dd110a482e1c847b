//! PID-file based supervision of named background processes.
//!
//! There is no supervisor daemon and no in-memory state: a process is
//! "running" exactly when its PID file holds a number that the OS process
//! table still knows about. Every query re-derives that from disk.
//!
//! Known limitation: if the recorded process dies and the OS hands its PID
//! to an unrelated process before the next probe, that process is reported
//! (and on `stop`, killed) as ours.

pub mod pidfile;
pub mod prober;

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{Error, Result};

use self::prober::{KillOutcome, ProcessProber};

/// Interval between liveness probes after a kill request.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of probes before giving up on confirming termination.
const STOP_POLL_ATTEMPTS: u32 = 10;

/// A process to launch under a stable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcess {
    pub name: String,
    /// Exact path of the executable. Never looked up on `PATH`.
    pub binary: PathBuf,
    pub args: Vec<OsString>,
    /// Receives stdout and stderr, opened for append.
    pub log_file: PathBuf,
}

impl ManagedProcess {
    pub fn new(
        name: impl Into<String>,
        binary: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: Vec::new(),
            log_file: log_file.into(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Starts, stops, and queries processes recorded under `run_dir`.
#[derive(Debug)]
pub struct ProcessSupervisor {
    run_dir: PathBuf,
    prober: Box<dyn ProcessProber>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl ProcessSupervisor {
    /// Supervisor using the prober for the current OS.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self::with_prober(run_dir, prober::detect())
    }

    pub fn with_prober(run_dir: impl Into<PathBuf>, prober: Box<dyn ProcessProber>) -> Self {
        Self {
            run_dir: run_dir.into(),
            prober,
            poll_interval: STOP_POLL_INTERVAL,
            poll_attempts: STOP_POLL_ATTEMPTS,
        }
    }

    /// Override how long `stop` waits to confirm termination.
    #[must_use]
    pub const fn with_stop_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    pub fn pid_file(&self, name: &str) -> PathBuf {
        self.run_dir.join(format!("{name}.pid"))
    }

    /// Launch `process` detached, with its output appended to its log file.
    ///
    /// Returns once the child has been spawned and its PID recorded; it does
    /// not wait for the child to become healthy.
    pub fn start(&self, process: &ManagedProcess) -> Result<u32> {
        if !process.binary.is_file() {
            return Err(Error::MissingBinary {
                path: process.binary.clone(),
            });
        }
        if let Some(pid) = self.running_pid(&process.name) {
            return Err(Error::AlreadyRunning {
                name: process.name.clone(),
                pid,
            });
        }

        let log = open_log(&process.log_file)?;
        let mut cmd = Command::new(&process.binary);
        cmd.args(&process.args)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);
        detach(&mut cmd);

        tracing::debug!(
            "exec: {} {}",
            process.binary.display(),
            process
                .args
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let child = cmd.spawn()?;
        let pid = child.id();

        let pid_path = self.pid_file(&process.name);
        if let Err(e) = pidfile::write_pid(&pid_path, pid) {
            // An unrecorded child could never be stopped through us.
            if let Err(kill_err) = self.prober.kill(pid) {
                tracing::warn!("failed to reap untracked PID {pid}: {kill_err}");
            }
            return Err(e.into());
        }

        tracing::info!(
            name = %process.name,
            pid,
            log = %process.log_file.display(),
            "started"
        );
        Ok(pid)
    }

    /// Force-terminate the recorded process and drop its PID file.
    ///
    /// A PID file naming a process that is already gone is cleaned up
    /// silently. Returns the PID that was recorded.
    pub fn stop(&self, name: &str) -> Result<u32> {
        let pid_path = self.pid_file(name);
        let pid = pidfile::read_pid(&pid_path).ok_or_else(|| Error::NotRunning {
            name: name.to_string(),
        })?;

        match self.prober.kill(pid)? {
            KillOutcome::AlreadyGone => {
                tracing::info!(name, pid, "process already exited; removing stale PID file");
            }
            KillOutcome::Signalled => {
                if self.await_exit(pid) {
                    tracing::info!(name, pid, "stopped");
                } else {
                    tracing::warn!(
                        name,
                        pid,
                        "termination not confirmed after {} probes",
                        self.poll_attempts
                    );
                }
            }
        }

        pidfile::remove_pid(&pid_path);
        Ok(pid)
    }

    /// Whether a live process is recorded under `name`. Never fails.
    pub fn is_running(&self, name: &str) -> bool {
        self.running_pid(name).is_some()
    }

    /// PID recorded under `name`, alive or not.
    pub fn current_pid(&self, name: &str) -> Option<u32> {
        pidfile::read_pid(&self.pid_file(name))
    }

    /// Recorded PID, only if the OS still knows it.
    pub fn running_pid(&self, name: &str) -> Option<u32> {
        self.current_pid(name)
            .filter(|pid| self.prober.probe(*pid).is_alive())
    }

    fn await_exit(&self, pid: u32) -> bool {
        for _ in 0..self.poll_attempts {
            if !self.prober.probe(pid).is_alive() {
                return true;
            }
            std::thread::sleep(self.poll_interval);
        }
        !self.prober.probe(pid).is_alive()
    }
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Detach the child from our session so it outlives the controlling terminal.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    cmd.creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}
