//! Delimiter-based stream framing.
//!
//! The control module writes `payload + "__MSG_END__"` for every message, so
//! reads may return several messages at once or stop in the middle of one.
//! [`Framer`] keeps whatever follows the last delimiter (the *residual
//! buffer*) and prepends it to the next chunk.
//!
//! The residual is kept as raw bytes: a multi-byte UTF-8 sequence split across
//! two reads is reassembled before anything tries to decode it.

/// Token written after every message on the wire.
pub const FRAME_DELIMITER: &[u8] = b"__MSG_END__";

/// Accumulates stream bytes and yields complete frames.
#[derive(Debug, Default, Clone)]
pub struct Framer {
    residual: Vec<u8>,
    // No delimiter starts before this index of `residual`.
    scanned: usize,
}

impl Framer {
    /// Create a framer with an empty residual buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` to the residual buffer and iterate over the complete
    /// frames it now contains, in stream order.
    ///
    /// Frames are produced lazily. When the returned [`Frames`] is dropped the
    /// consumed bytes are released; frames that were never pulled stay
    /// buffered and are yielded by the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.residual.extend_from_slice(chunk);
        Frames {
            framer: self,
            cursor: 0,
        }
    }

    /// Bytes received but not yet resolved into a complete frame.
    pub fn residual(&self) -> &[u8] {
        &self.residual
    }

    /// Discard the residual buffer (e.g. after reconnecting).
    pub fn clear(&mut self) {
        self.residual.clear();
        self.scanned = 0;
    }
}

/// Lazy iterator over the complete frames produced by [`Framer::feed`].
pub struct Frames<'a> {
    framer: &'a mut Framer,
    cursor: usize,
}

impl Iterator for Frames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.framer.scanned.max(self.cursor);
        let len = self.framer.residual.len();
        match find(&self.framer.residual[start..], FRAME_DELIMITER) {
            Some(offset) => {
                let end = start + offset;
                let frame = self.framer.residual[self.cursor..end].to_vec();
                self.cursor = end + FRAME_DELIMITER.len();
                self.framer.scanned = self.cursor;
                Some(frame)
            }
            None => {
                // A delimiter may still straddle the end of the buffer.
                let resume = len.saturating_sub(FRAME_DELIMITER.len() - 1);
                self.framer.scanned = resume.max(self.cursor);
                None
            }
        }
    }
}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        self.framer.residual.drain(..self.cursor);
        self.framer.scanned = self.framer.scanned.saturating_sub(self.cursor);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
