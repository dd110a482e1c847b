//! On-disk PID record: one decimal integer, nothing else.

use std::fs;
use std::io;
use std::path::Path;

/// Read the recorded PID. Missing, empty, or unparsable content all mean
/// "no process".
pub fn read_pid(path: &Path) -> Option<u32> {
    let text = fs::read_to_string(path).ok()?;
    text.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// Record `pid`, replacing any previous value.
pub fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, pid.to_string())
}

/// Remove the record. Errors are logged and swallowed.
pub fn remove_pid(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("frpc.pid");
        write_pid(&path, 4242).unwrap();
        assert_eq!(read_pid(&path), Some(4242));
        write_pid(&path, 7).unwrap();
        assert_eq!(read_pid(&path), Some(7));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.pid");
        fs::write(&path, " 123\n").unwrap();
        assert_eq!(read_pid(&path), Some(123));
    }

    #[test]
    fn bad_content_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.pid");
        for content in ["", "   ", "abc", "-5", "0", "12 34"] {
            fs::write(&path, content).unwrap();
            assert_eq!(read_pid(&path), None, "content {content:?}");
        }
        assert_eq!(read_pid(&dir.path().join("missing.pid")), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.pid");
        write_pid(&path, 1).unwrap();
        remove_pid(&path);
        remove_pid(&path);
        assert!(!path.exists());
    }
}
