//! Output byte caps.
//!
//! Captured child-process streams and execute-tool payloads are capped to a
//! configured byte budget. Truncation is always visible to the caller via a
//! literal sentinel suffix.

/// Sentinel appended to any capped buffer.
pub const TRUNCATION_SENTINEL: &str = "\n…[truncated]";

/// Caps `text` to at most `max_bytes` bytes of content, appending
/// [`TRUNCATION_SENTINEL`] when anything was dropped.
///
/// The cut lands on a `char` boundary so the result stays valid UTF-8.
///
/// # Examples
///
/// ```
/// use dato_mcp_core::truncate::{cap_output, TRUNCATION_SENTINEL};
///
/// let (kept, truncated) = cap_output("hello world", 5);
/// assert!(truncated);
/// assert_eq!(kept, format!("hello{TRUNCATION_SENTINEL}"));
///
/// let (kept, truncated) = cap_output("short", 100);
/// assert!(!truncated);
/// assert_eq!(kept, "short");
/// ```
#[must_use]
pub fn cap_output(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }

    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut kept = text[..cut].to_string();
    kept.push_str(TRUNCATION_SENTINEL);
    (kept, true)
}

/// Byte-budgeted accumulator for a single child-process stream.
///
/// Once the budget is exhausted further writes are dropped; the final
/// rendering carries the sentinel.
#[derive(Debug)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    budget: usize,
    truncated: bool,
}

impl CappedBuffer {
    /// Creates a buffer that keeps at most `budget` bytes.
    #[must_use]
    pub const fn new(budget: usize) -> Self {
        Self {
            bytes: Vec::new(),
            budget,
            truncated: false,
        }
    }

    /// Appends a chunk, keeping whatever still fits in the budget.
    pub fn push(&mut self, chunk: &[u8]) {
        let remaining = self.budget.saturating_sub(self.bytes.len());
        if remaining == 0 {
            if !chunk.is_empty() {
                self.truncated = true;
            }
            return;
        }
        if chunk.len() > remaining {
            self.bytes.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(chunk);
        }
    }

    /// Returns `true` when any byte was dropped.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Renders the captured bytes as a lossy UTF-8 string, with the
    /// sentinel appended when truncated.
    #[must_use]
    pub fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_SENTINEL);
        }
        text
    }
}
