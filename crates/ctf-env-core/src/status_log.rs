//! Human-readable status text accumulated between control responses.

use std::collections::VecDeque;

/// History size limit (1 MB); oldest lines are dropped first.
const HISTORY_BYTES: usize = 1024 * 1024;

/// Ordered text lines flushed into the next response body.
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    lines: VecDeque<String>,
    total_bytes: usize,
}

impl StatusLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn push<S: Into<String>>(&mut self, line: S) {
        let line = line.into();
        tracing::debug!(target: "ctf_env::status", "{line}");

        let bytes = line.len() + 1;
        while self.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
        self.lines.push_back(line);
        self.total_bytes = self.total_bytes.saturating_add(bytes);
    }

    /// Append every line of a multi-line block.
    pub fn push_block(&mut self, block: &str) {
        for line in block.lines() {
            self.push(line);
        }
    }

    /// Move all lines of `other` to the end of this log.
    pub fn append(&mut self, other: &mut Self) {
        while let Some(line) = other.lines.pop_front() {
            self.push(line);
        }
        other.total_bytes = 0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Take the accumulated text, each line newline-terminated, leaving the log empty.
    pub fn drain(&mut self) -> String {
        let mut out = String::with_capacity(self.total_bytes);
        for line in self.lines.drain(..) {
            out.push_str(&line);
            out.push('\n');
        }
        self.total_bytes = 0;
        out
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total_bytes = 0;
    }
}
