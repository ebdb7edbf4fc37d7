//! Incremental decoder for `text/event-stream` bodies.

use crate::error::{Error, Result};

/// Event type used when the stream does not name one.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Longest line the decoder buffers before giving up on the stream.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl ServerEvent {
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT_TYPE
    }
}

/// Turns arbitrary body chunks into events.
///
/// Lines may end in LF, CRLF or CR and may be split anywhere, including
/// inside a UTF-8 sequence. A leading byte order mark is skipped. An event
/// still incomplete when the body ends is discarded.
#[derive(Debug)]
pub struct EventStreamDecoder {
    buf: Vec<u8>,
    // bytes of `buf` already searched for a line ending
    scanned: usize,
    started: bool,
    skip_lf: bool,
    max_line_length: usize,
    data: String,
    event: Option<String>,
    last_id: Option<String>,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            started: false,
            skip_lf: false,
            max_line_length: MAX_LINE_LENGTH,
            data: String::new(),
            event: None,
            last_id: None,
        }
    }
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Feeds one body chunk and returns every event it completes.
    ///
    /// Fails with `MeetingPointError` once a line grows past the configured
    /// maximum without a line ending.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<ServerEvent>> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        if !self.skip_bom() {
            return Ok(events);
        }

        let mut start = 0;
        let mut i = self.scanned;
        while i < self.buf.len() {
            let byte = self.buf[i];

            // second half of a CRLF split across lines
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    i += 1;
                    start = i;
                    continue;
                }
            }

            if byte == b'\n' || byte == b'\r' {
                let line = String::from_utf8_lossy(&self.buf[start..i]).into_owned();
                self.skip_lf = byte == b'\r';
                if let Some(event) = self.process_line(&line) {
                    events.push(event);
                }
                start = i + 1;
            }
            i += 1;
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();
        if self.buf.len() > self.max_line_length {
            return Err(Error::meeting_point(format!(
                "event stream line exceeds {} bytes",
                self.max_line_length
            )));
        }
        Ok(events)
    }

    /// Drops a leading byte order mark; false while the first bytes could
    /// still be one.
    fn skip_bom(&mut self) -> bool {
        if self.started {
            return true;
        }
        if self.buf.len() < BOM.len() && BOM.starts_with(&self.buf) {
            return false;
        }
        if self.buf.starts_with(BOM) {
            self.buf.drain(..BOM.len());
        }
        self.started = true;
        true
    }

    /// Id of the most recent event that carried one.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<ServerEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            // "retry" and unknown fields are ignored: reconnection is the caller's policy
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(ServerEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}
