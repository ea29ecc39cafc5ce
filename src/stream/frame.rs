//! Incremental decoder for server-sent event frames.
//!
//! The backend streams frames of the form `data: <json>` terminated by a
//! blank line. There is no fixed frame boundary in the transport: a read may
//! end mid-frame or even mid-codepoint, so the decoder buffers raw bytes and
//! only extracts a frame once a complete blank-line terminator is observed.
//! Partial frames stay buffered and are re-attempted on the next read.

/// Incremental frame decoder.
///
/// Feed byte chunks via [`push`](Self::push); each call returns the `data`
/// payloads of every frame the chunk completed, in arrival order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning the payloads of completed frames.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, resume)) = find_terminator(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..resume).take(end).collect();
            if let Some(payload) = parse_frame(&String::from_utf8_lossy(&frame)) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush any trailing partial frame when the transport closes.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&String::from_utf8_lossy(&rest))
    }

    /// Bytes currently buffered without a complete terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Locate the first blank-line terminator.
///
/// Returns `(frame_end, resume)` where `frame_end` is the length of the frame
/// body and `resume` is the offset of the byte after the terminator.
/// Accepts `\n\n`, `\n\r\n`, and `\r\n\r\n` sequences.
fn find_terminator(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] != b'\n' {
            i += 1;
            continue;
        }
        // A newline followed by an (optionally \r-prefixed) newline.
        if buf.get(i + 1) == Some(&b'\n') {
            return Some((i, i + 2));
        }
        if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
            return Some((i, i + 3));
        }
        i += 1;
    }
    None
}

/// Extract the `data` payload from one frame's text.
///
/// Multiple `data:` lines are joined with `\n`. Comment lines (leading `:`)
/// and unknown fields are ignored. Returns `None` for frames with no data.
fn parse_frame(frame: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in frame.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
