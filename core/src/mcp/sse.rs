/// Server-sent events framing
///
/// Incremental decoder for `text/event-stream` bodies. Chunks may split
/// lines (or UTF-8 sequences) anywhere; only complete lines are decoded.
/// Lines end with LF, CRLF or a lone CR.
use tracing::warn;

/// Longest line kept in memory; the rest of a longer line is discarded
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if the server named the event
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// `id:` field, if present
    pub id: Option<String>,
}

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no line terminator
    scanned: usize,
    /// The last chunk ended in CR, so a leading LF completes that line ending
    skip_lf: bool,
    /// Dropping the remainder of an overlong line
    discarding: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and return every event it completed
    pub fn feed(&mut self, mut chunk: &[u8]) -> Vec<SseEvent> {
        if self.skip_lf && !chunk.is_empty() {
            self.skip_lf = false;
            if chunk[0] == b'\n' {
                chunk = &chunk[1..];
            }
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut i = self.scanned;
        while i < self.buffer.len() {
            let byte = self.buffer[i];
            if byte != b'\n' && byte != b'\r' {
                i += 1;
                continue;
            }

            let mut next = i + 1;
            if byte == b'\r' {
                match self.buffer.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.skip_lf = true,
                }
            }

            if self.discarding {
                self.discarding = false;
            } else {
                let line = String::from_utf8_lossy(&self.buffer[start..i]).into_owned();
                if let Some(event) = self.process_line(&line) {
                    events.push(event);
                }
            }
            start = next;
            i = next;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_LINE_BYTES {
            warn!(
                target: "mcp_client",
                bytes = self.buffer.len(),
                limit = MAX_LINE_BYTES,
                "Event stream line too long, discarding"
            );
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        events
    }

    /// Bytes received but not yet terminated by a line ending
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // `retry` and unknown fields are ignored
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data, id })
    }
}
