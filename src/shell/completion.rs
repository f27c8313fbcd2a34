//! Command completion detection.
//!
//! A raw shell never says "command finished". The default protocol installs
//! a sentinel as the shell prompt and treats its appearance in the output as
//! completion. The protocol sits behind a trait so a stricter scheme (for
//! example an exit-status-tagged sentinel) can replace it.

use memchr::memmem;

use super::sanitizer::sanitize;

/// Strategy for detecting the end of a command's output.
pub trait CompletionProtocol: Send + Sync {
    /// Command sent once after the shell opens to install the protocol.
    fn setup_command(&self) -> String;

    /// Whether the accumulated raw output shows the command has finished.
    ///
    /// `buffer[..searched]` was already checked by an earlier call and
    /// did not complete; only the bytes from `searched` on are new.
    fn is_complete(&self, buffer: &[u8], searched: usize) -> bool;

    /// Convert the raw output of `command` into presentable text.
    fn render(&self, raw: &[u8], command: &str) -> String;
}

/// Prompt-sentinel protocol: `PS1` is set to a unique marker.
#[derive(Debug, Clone)]
pub struct PromptSentinel {
    marker: String,
}

impl PromptSentinel {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl CompletionProtocol for PromptSentinel {
    fn setup_command(&self) -> String {
        format!("export PS1=\"{} \"\n", self.marker)
    }

    fn is_complete(&self, buffer: &[u8], searched: usize) -> bool {
        // A marker split across reads starts at most len - 1 bytes back
        let overlap = self.marker.len().saturating_sub(1);
        let start = searched.min(buffer.len()).saturating_sub(overlap);
        memmem::find(&buffer[start..], self.marker.as_bytes()).is_some()
    }

    fn render(&self, raw: &[u8], command: &str) -> String {
        sanitize(raw, &self.marker, command)
    }
}
