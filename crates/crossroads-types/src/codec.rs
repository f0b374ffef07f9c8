//! Newline-delimited JSON framing for the device stream.
//!
//! The controller writes one JSON object per line with no other framing:
//! no length prefix, no acknowledgement, no heartbeat. [`LineDecoder`]
//! turns an arbitrary sequence of byte chunks back into those lines.
//!
//! The decoder works on raw bytes rather than text so a multi-byte UTF-8
//! sequence split across two reads is reassembled before it is parsed.

use serde::Serialize;
use serde_json::Value;

/// A line that could not be parsed as JSON.
#[derive(Debug, thiserror::Error)]
#[error("invalid JSON frame {line:?}: {source}")]
pub struct DecodeError {
    /// The offending line, lossily decoded for logging.
    pub line: String,
    /// The underlying parse error.
    #[source]
    pub source: serde_json::Error,
}

/// Incremental splitter for a newline-delimited byte stream.
///
/// Each call to [`feed`](Self::feed) appends a chunk to the accumulation
/// buffer, returns every complete line, and keeps the trailing partial
/// segment for the next call. Whatever is still buffered when the stream
/// ends is never flushed as a message.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no terminator.
    scanned: usize,
}

impl LineDecoder {
    /// Create a decoder with an empty buffer.
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
        }
    }

    /// Append a chunk and return every complete line, without terminators.
    ///
    /// Empty lines are returned too; [`decode`](Self::decode) is the
    /// layer that skips them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.next_terminator() {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            lines.push(line);
            self.scanned = 0;
        }
        self.scanned = self.buffer.len();
        lines
    }

    /// Position of the first `\n` past the already scanned prefix.
    fn next_terminator(&self) -> Option<usize> {
        let rest = self.buffer.get(self.scanned..)?;
        let offset = rest.iter().position(|&b| b == b'\n')?;
        self.scanned.checked_add(offset)
    }

    /// Append a chunk and parse every complete, non-blank line as JSON.
    ///
    /// A line that fails to parse yields an `Err` entry; parsing of the
    /// following lines is unaffected.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Result<Value, DecodeError>> {
        self.feed(chunk)
            .into_iter()
            .filter(|line| !is_blank(line))
            .map(|line| {
                serde_json::from_slice(&line).map_err(|source| DecodeError {
                    line: String::from_utf8_lossy(&line).into_owned(),
                    source,
                })
            })
            .collect()
    }

    /// Number of bytes buffered waiting for a terminator.
    pub const fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the decoder, returning the unterminated residue if any.
    ///
    /// Callers log and drop this; a partial frame is never delivered.
    pub fn finish(self) -> Option<Vec<u8>> {
        if is_blank(&self.buffer) {
            None
        } else {
            Some(self.buffer)
        }
    }
}

/// Serialize a value as compact JSON followed by a single `\n`.
///
/// # Errors
///
/// Returns the serializer error if `value` cannot be represented as JSON.
pub fn encode_line<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}
