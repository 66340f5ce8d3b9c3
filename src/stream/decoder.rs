#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;

use serde_json::Value;

/// One complete `event:`/`data:` block of a server-sent event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: String,
    pub data: Value,
}

impl Frame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Incremental SSE frame decoder.
///
/// Text is accumulated until a blank line closes a frame; whatever follows the
/// last boundary stays buffered for the next `feed`. Bytes can be fed
/// directly, in which case a UTF-8 sequence split across two chunks is held
/// back until it is complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    pending_bytes: Vec<u8>,
    truncated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<Frame> {
        self.buffer.push_str(chunk);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = vec![];
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Block::Frame(frame) = parse_block(&block[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending_bytes.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.pending_bytes);

        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text.to_string(),
            Err(err) => {
                let valid = err.valid_up_to();
                match err.error_len() {
                    // Incomplete sequence at the end, wait for the rest.
                    None => {
                        self.pending_bytes = bytes[valid..].to_vec();
                        String::from_utf8_lossy(&bytes[..valid]).to_string()
                    }
                    Some(_) => String::from_utf8_lossy(&bytes).to_string(),
                }
            }
        };
        self.feed(&text)
    }

    /// Drains the buffer at end of stream. A trailing frame is yielded only
    /// if its last line was terminated and it holds a parseable payload;
    /// anything else is dropped and reported through [`Self::truncated`].
    pub fn flush(&mut self) -> Vec<Frame> {
        let mut rest = std::mem::take(&mut self.buffer);
        if !self.pending_bytes.is_empty() {
            rest.push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }

        if rest.trim().is_empty() {
            return vec![];
        }

        if rest.ends_with('\n') {
            match parse_block(rest.trim_end_matches('\n')) {
                Block::Frame(frame) => return vec![frame],
                Block::Malformed => return vec![],
                Block::Empty if is_comment_only(&rest) => return vec![],
                Block::Empty => {}
            }
        }

        log::debug!("discarding unterminated frame: {:?}", rest);
        self.truncated = true;
        vec![]
    }

    /// Whether `flush` had to drop an unterminated frame.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.trim().is_empty() || !self.pending_bytes.is_empty()
    }

    /// Drops buffered input without reporting it.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_bytes.clear();
    }
}

enum Block {
    Frame(Frame),
    /// Terminated block whose payload is not valid JSON.
    Malformed,
    /// No `data:` line at all.
    Empty,
}

fn parse_block(block: &str) -> Block {
    let mut kind: Option<&str> = None;
    let mut data_lines: Vec<&str> = vec![];

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            kind = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // `id:`, `retry:` and `:` comments carry nothing we use.
    }

    if data_lines.is_empty() {
        return Block::Empty;
    }

    let kind = kind.filter(|k| !k.is_empty()).unwrap_or("message");
    let payload = data_lines.join("\n");
    match serde_json::from_str::<Value>(&payload) {
        Ok(data) => Block::Frame(Frame::new(kind, data)),
        Err(err) => {
            log::warn!("dropping {} frame with malformed data: {}", kind, err);
            Block::Malformed
        }
    }
}

fn is_comment_only(block: &str) -> bool {
    block
        .lines()
        .all(|line| line.trim().is_empty() || line.starts_with(':'))
}
