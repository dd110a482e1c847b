//! Sequential first-success resolution over an ordered list of candidates.
//!
//! Used wherever several equivalent sources are tried in priority order:
//! SSH authentication methods, download mirrors.

use std::fmt;

/// Every candidate failed. Holds each candidate's label and error, in the
/// order they were tried.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: Vec<(String, E)>,
}

impl<E> Exhausted<E> {
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("no candidates to try");
        }
        f.write_str("all candidates failed: ")?;
        for (i, (label, err)) in self.attempts.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{label}: {err}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

/// Try each `(label, candidate)` in order and return the first success
/// together with its label. Candidates after the first success are never
/// evaluated.
pub fn first_success<C, T, E, I, F>(candidates: I, mut attempt: F) -> Result<(String, T), Exhausted<E>>
where
    I: IntoIterator<Item = (String, C)>,
    F: FnMut(&C) -> Result<T, E>,
    E: fmt::Display,
{
    let mut attempts = Vec::new();
    for (label, candidate) in candidates {
        match attempt(&candidate) {
            Ok(value) => return Ok((label, value)),
            Err(e) => {
                tracing::debug!("{label} failed: {e}");
                attempts.push((label, e));
            }
        }
    }
    Err(Exhausted { attempts })
}
