//! Multi-line scripts sent over a remote shell's stdin.

/// A shell script ready to stream to a remote shell.
///
/// The only constructor appends `exit $?`, so the script's own exit status
/// becomes the session's exit status even though the shell reads it from a
/// pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPayload {
    text: String,
}

impl ScriptPayload {
    pub fn new(body: impl Into<String>) -> Self {
        let mut text = body.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str("exit $?\n");
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}
