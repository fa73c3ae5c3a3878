//! Server-Sent Events codec for run-event streams.
//!
//! The encode side turns [`RunEvent`]s into the `data: {json}\n\n` lines an
//! HTTP handler writes to a `text/event-stream` response, closed by
//! `data: [DONE]\n\n`. The decode side is incremental: feed it network
//! chunks as they arrive and it hands back complete events, holding partial
//! frames (and split UTF-8 sequences) until they finish.
//!
//! [`FrameAccumulator`] is the transport-level half — byte buffering,
//! UTF-8 boundary handling, `\n\n` frame splitting — and is reused by the
//! provider adapters for their own SSE wire formats.

use tracing::warn;

use crate::error::AiError;
use crate::event::RunEvent;

/// `Content-Type` for SSE responses.
pub const CONTENT_TYPE: &str = "text/event-stream";
/// `Cache-Control` for SSE responses.
pub const CACHE_CONTROL: &str = "no-cache";

/// Upper bound on buffered bytes for a single unfinished frame.
const MAX_BUFFER: usize = 16 * 1024 * 1024;

/// Encodes one event as an SSE data line.
pub fn encode(event: &RunEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// The SSE completion marker.
pub fn encode_done() -> String {
    "data: [DONE]\n\n".to_owned()
}

/// Incremental frame splitter over raw SSE bytes.
///
/// Bytes accumulate until a complete `\n\n`-delimited frame is available;
/// a multi-byte UTF-8 sequence split across network chunks is held until
/// its continuation arrives.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    text: String,
    bytes: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk; returns the complete frames it finished.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, AiError> {
        if self.text.len() + self.bytes.len() + chunk.len() > MAX_BUFFER {
            return Err(AiError::ResponseFormat {
                message: format!("SSE frame exceeds {MAX_BUFFER} byte buffer limit"),
                raw: String::new(),
            });
        }
        self.bytes.extend_from_slice(chunk);
        match std::str::from_utf8(&self.bytes) {
            Ok(valid) => {
                self.text.push_str(valid);
                self.bytes.clear();
            }
            Err(e) => {
                if e.error_len().is_some() {
                    return Err(AiError::ResponseFormat {
                        message: "invalid UTF-8 in SSE stream".to_owned(),
                        raw: String::new(),
                    });
                }
                let valid_up_to = e.valid_up_to();
                // SAFETY: `valid_up_to` bounds a valid UTF-8 prefix.
                let valid = unsafe { std::str::from_utf8_unchecked(&self.bytes[..valid_up_to]) };
                self.text.push_str(valid);
                self.bytes.drain(..valid_up_to);
            }
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.text.find("\n\n") {
            let frame: String = self.text.drain(..pos + 2).collect();
            let frame = frame.trim_end().to_owned();
            if !frame.is_empty() {
                frames.push(frame);
            }
        }
        Ok(frames)
    }
}

/// The payload of a frame's `data:` line, if it has one.
pub fn extract_data_line(frame: &str) -> Option<&str> {
    frame.lines().find_map(|line| line.strip_prefix("data: "))
}

/// Incremental decoder for AG-UI event streams.
#[derive(Debug, Default)]
pub struct SseParser {
    frames: FrameAccumulator,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the `[DONE]` marker has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds a network chunk; returns the events it completed.
    ///
    /// Frames whose payload does not deserialize as a [`RunEvent`] are
    /// skipped with a warning — an AG-UI stream may carry event kinds this
    /// vocabulary doesn't know.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RunEvent>, AiError> {
        let mut events = Vec::new();
        for frame in self.frames.feed(chunk)? {
            let Some(data) = extract_data_line(&frame) else {
                continue;
            };
            if data == "[DONE]" {
                self.done = true;
                continue;
            }
            match serde_json::from_str::<RunEvent>(data) {
                Ok(event) => events.push(event),
                Err(err) => warn!(%err, "skipping undecodable SSE event"),
            }
        }
        Ok(events)
    }
}
