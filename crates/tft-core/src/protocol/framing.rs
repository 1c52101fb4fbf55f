//! Line framing over the serial byte stream.
//!
//! Serial reads deliver arbitrary chunks: a read may end in the middle of a
//! command, or contain several commands at once.  [`LineBuffer`] accumulates
//! the chunks and yields one complete line at a time.
//!
//! Bytes are buffered undecoded, so a multi-byte character split across two
//! reads still decodes correctly once both halves have arrived.  Invalid byte
//! sequences are dropped rather than failing the line.

use tracing::warn;

/// Longest unterminated fragment kept between reads.  A fragment that grows
/// past this without a newline is discarded.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Accumulates partial reads and yields complete, trimmed lines.
///
/// # Example
///
/// ```rust
/// use tft_core::LineBuffer;
///
/// let mut buf = LineBuffer::new();
/// buf.extend(b"G28\nG1 X");
/// assert_eq!(buf.next_line().as_deref(), Some("G28"));
/// assert_eq!(buf.next_line(), None);
///
/// buf.extend(b"10\n");
/// assert_eq!(buf.next_line().as_deref(), Some("G1 X10"));
/// ```
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk read from the device.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            warn!(
                "discarding {} bytes of unterminated input from device",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Removes and returns the next complete non-empty line, trimmed.
    ///
    /// Blank lines are skipped.  Returns `None` when no terminated line is
    /// buffered; the trailing fragment stays for the next call.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = decode_lenient(&raw[..pos]);
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        None
    }

    /// `true` if a complete line is waiting.
    pub fn has_line(&self) -> bool {
        self.pending.contains(&b'\n')
    }

    /// Number of buffered bytes not yet returned.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops everything buffered.  Called when the link is reopened.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn decode_lenient(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}
