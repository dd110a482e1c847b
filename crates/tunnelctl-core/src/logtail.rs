//! Reading and following an append-only log file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Interval between polls while following.
pub const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of lines shown by a tail.
pub const DEFAULT_TAIL_LINES: usize = 100;

/// Last `n` lines of `path`, in file order.
pub fn read_tail(path: &Path, n: usize) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| not_found_or_io(path, e))?;
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut ring = VecDeque::with_capacity(n.min(4096));
    for line in BufReader::new(file).split(b'\n') {
        let line = line?;
        if ring.len() == n {
            ring.pop_front();
        }
        ring.push_back(decode_line(&line));
    }
    Ok(ring.into())
}

/// Size of the file right now. Used to start following at the current end.
pub fn current_len(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .map_err(|e| not_found_or_io(path, e))?
        .len())
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        e.into()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Incremental reader delivering each complete line exactly once.
///
/// The offset only moves forward. A partial last line is held back until its
/// newline arrives. If the file shrinks (truncation or rotation) nothing is
/// emitted until it grows past the remembered offset again.
#[derive(Debug)]
pub struct Follower {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl Follower {
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            pending: Vec::new(),
        }
    }

    /// Bytes consumed so far, including any held-back fragment.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// One tick: reopen the file and return the complete lines appended
    /// since the previous tick.
    pub fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len <= self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut chunk = Vec::new();
        file.take(len - self.offset).read_to_end(&mut chunk)?;
        self.offset += chunk.len() as u64;
        self.pending.extend_from_slice(&chunk);

        let Some(last_nl) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let rest = self.pending.split_off(last_nl + 1);
        let mut complete = std::mem::replace(&mut self.pending, rest);
        complete.pop();
        Ok(complete.split(|b| *b == b'\n').map(decode_line).collect())
    }
}

/// Follow `path` from `offset`, handing every new line to `emit`.
///
/// Runs until the process is interrupted. Failures to open or read the file
/// are logged and retried on the next tick.
pub fn follow(path: &Path, offset: u64, mut emit: impl FnMut(&str)) -> ! {
    let mut follower = Follower::new(path, offset);
    loop {
        match follower.poll() {
            Ok(lines) => lines.iter().for_each(|l| emit(l)),
            Err(e) => tracing::debug!("log follow: {}: {e}; retrying", path.display()),
        }
        std::thread::sleep(FOLLOW_INTERVAL);
    }
}
