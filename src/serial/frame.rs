//! Separator-split frame accumulation.

use tracing::warn;

/// Accumulates raw bytes and yields complete frames as they close.
///
/// The accumulator is bounded: if it fills without a separator the whole
/// buffer is discarded, since a frame that long can only be garbage or a
/// desynchronized stream.
pub struct FrameReader {
    buf: Vec<u8>,
    separator: u8,
    max_len: usize,
}

impl FrameReader {
    pub fn new(separator: u8, max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len),
            separator,
            max_len,
        }
    }

    /// Feed received bytes, returning every frame completed by them. The
    /// trailing remainder is carried into the next call. Frames that are
    /// not valid UTF-8 are dropped.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if byte == self.separator {
                if !self.buf.is_empty() {
                    match String::from_utf8(std::mem::take(&mut self.buf)) {
                        Ok(frame) => frames.push(frame),
                        Err(_) => warn!("dropping non-utf8 frame"),
                    }
                }
                continue;
            }
            if self.buf.len() >= self.max_len {
                warn!(len = self.buf.len(), "discarding oversized partial frame");
                self.buf.clear();
            }
            self.buf.push(byte);
        }
        frames
    }

    /// Bytes currently buffered waiting for a separator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
