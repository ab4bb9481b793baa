//! Newline-delimited frame decoding
//!
//! Chunk boundaries from the transport do not line up with frame boundaries.
//! Line framing is done by `LinesCodec` over a byte buffer, so an incomplete
//! trailing line (even one ending inside a UTF-8 sequence) waits for the next
//! chunk. Lines longer than the cap are discarded without being buffered.
//! A line that does not parse as a frame is dropped and decoding carries on.

use bytes::BytesMut;
use serde::Deserialize;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::debug;

/// Longest line accepted as a frame
pub const MAX_FRAME_LINE_LENGTH: usize = 1024 * 1024;

/// One decoded unit of the streaming protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Frame {
    /// Next fragment of answer text (absent or null reads as empty)
    #[serde(default)]
    pub text: Option<String>,
}

impl Frame {
    /// The fragment carried by this frame
    pub fn fragment(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Incremental decoder for one response body
#[derive(Debug)]
pub struct FrameDecoder {
    codec: LinesCodec,
    buffer: BytesMut,
    skipped: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_FRAME_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_length: usize) -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(max_length),
            buffer: BytesMut::new(),
            skipped: 0,
        }
    }

    /// Feed a newly arrived chunk, returning every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(line)) => frames.extend(self.decode_line(&line)),
                Ok(None) => break,
                Err(e) => self.skip_line(e),
            }
        }
        frames
    }

    /// Flush the unterminated final line at end of stream
    pub fn finish(&mut self) -> Option<Frame> {
        match self.codec.decode_eof(&mut self.buffer) {
            Ok(Some(line)) => self.decode_line(&line),
            Ok(None) => None,
            Err(e) => {
                self.skip_line(e);
                None
            }
        }
    }

    /// Number of non-blank lines dropped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes held back waiting for the rest of their line
    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn skip_line(&mut self, error: LinesCodecError) {
        self.skipped += 1;
        match error {
            LinesCodecError::MaxLineLengthExceeded => {
                debug!("Skipping frame line longer than the length cap");
            }
            LinesCodecError::Io(e) => debug!(error = %e, "Skipping undecodable frame line"),
        }
    }

    fn decode_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Frame>(line) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, line_len = line.len(), "Skipping malformed frame");
                None
            }
        }
    }
}
