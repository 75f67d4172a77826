//! Incremental `text/event-stream` decoding.
//!
//! Bytes are split into lines before any UTF-8 decoding happens, so a
//! multi-byte character split across network chunks is carried over intact
//! in the line buffer until its line completes.

use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::mcp::error::{Result, ToolCallError};

pub const NO_SSE_EVENTS_MESSAGE: &str = "No valid SSE events received";

#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Appends a chunk and returns every line it completed, blank lines
    /// included, without their terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    /// Lines end at `\n`, `\r\n` or a lone `\r`. A `\r` that ends the
    /// buffer stays put until the next byte shows whether `\n` follows.
    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = memchr::memchr2(b'\n', b'\r', &self.buffer[search_index..])
        {
            let line_end = search_index + relative_pos;
            let next = if self.buffer[line_end] == b'\n' {
                line_end + 1
            } else {
                match self.buffer.get(line_end + 1) {
                    Some(b'\n') => line_end + 2,
                    Some(_) => line_end + 1,
                    None if flush => line_end + 1,
                    None => break,
                }
            };

            let line_bytes = &self.buffer[search_index..line_end];
            lines.push(String::from_utf8_lossy(line_bytes).into_owned());

            search_index = next;
        }

        if flush {
            let rest = &self.buffer[search_index..];
            if !rest.is_empty() {
                lines.push(String::from_utf8_lossy(rest).into_owned());
            }
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

/// A dispatched event whose `data` parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: Value,
}

#[derive(Default)]
struct PendingEvent {
    event: Option<String>,
    id: Option<String>,
    data: Option<String>,
}

#[derive(Default)]
pub struct SseDecoder {
    lines: SseLineBuffer,
    pending: PendingEvent,
    last: Option<SseEvent>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) {
        for line in self.lines.push(chunk) {
            self.apply_line(&line);
        }
    }

    /// Flushes a trailing partial line and any event left without a closing
    /// blank line, then returns the last event that parsed. Earlier events
    /// are preamble or heartbeats and are not retained.
    pub fn finish(mut self) -> Option<SseEvent> {
        for line in self.lines.finish() {
            self.apply_line(&line);
        }
        self.dispatch();
        self.last
    }

    fn apply_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data = Some(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let Some(data) = pending.data else {
            return;
        };

        match serde_json::from_str::<Value>(&data) {
            Ok(data) => self.last = Some(SseEvent {
                event: pending.event,
                id: pending.id,
                data,
            }),
            Err(err) => {
                debug!(event = ?pending.event, error = %err, "Skipping non-JSON SSE event");
            }
        }
    }
}

/// The last parsed event is the logical response.
pub fn last_event_payload(last: Option<SseEvent>) -> Result<Value> {
    last.map(|event| event.data)
        .ok_or_else(|| ToolCallError::Parse(NO_SSE_EVENTS_MESSAGE.to_string()))
}

pub fn decode_sse_body(body: &[u8]) -> Result<Value> {
    let mut decoder = SseDecoder::default();
    decoder.push(body);
    last_event_payload(decoder.finish())
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

/// Reads the body chunk by chunk; each network read is a suspension point.
pub async fn read_event_stream(response: reqwest::Response) -> Result<Value> {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        decoder.push(&chunk);
    }

    last_event_payload(decoder.finish())
}
