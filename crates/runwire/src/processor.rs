//! Event-stream post-processing.
//!
//! Adapters emit text deltas at whatever granularity the wire gives them,
//! which is often too fine (single tokens) or too coarse for a given UI.
//! [`rechunk`] rewrites `TEXT_MESSAGE_CONTENT` deltas to a chosen
//! [`ChunkStrategy`] without disturbing anything else: boundary events keep
//! their order, the cumulative `content` field stays correct, and held text
//! is flushed before `TEXT_MESSAGE_END` or a terminal event so nothing is
//! ever dropped.
//!
//! [`replay`] turns a recorded event vector back into a stream, which keeps
//! processor and consumer tests deterministic.

use std::collections::{HashMap, VecDeque};

use futures::StreamExt;

use crate::event::{EventStream, RunEvent};

/// How to re-split streamed text deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Pass deltas through untouched.
    Immediate,
    /// Emit at whitespace boundaries; a partial word is held until it
    /// completes.
    WordBoundary,
    /// Emit at sentence punctuation (`.`, `!`, `?`, `,`, `;`, `:`, or a
    /// newline).
    PunctuationBoundary,
    /// Emit fixed-size chunks of `n` characters. `FixedSize(0)` behaves
    /// like [`Immediate`](Self::Immediate).
    FixedSize(usize),
}

impl ChunkStrategy {
    /// Splits emittable chunks off the front of `held`, leaving any
    /// remainder in place.
    fn drain(&self, held: &mut String) -> Vec<String> {
        if held.is_empty() {
            return Vec::new();
        }
        match self {
            ChunkStrategy::Immediate | ChunkStrategy::FixedSize(0) => {
                vec![std::mem::take(held)]
            }
            ChunkStrategy::WordBoundary => split_after_last(held, char::is_whitespace),
            ChunkStrategy::PunctuationBoundary => {
                split_after_last(held, |c| matches!(c, '.' | '!' | '?' | ',' | ';' | ':' | '\n'))
            }
            ChunkStrategy::FixedSize(n) => {
                let mut chunks = Vec::new();
                while held.chars().count() >= *n {
                    let cut = held
                        .char_indices()
                        .nth(*n)
                        .map_or(held.len(), |(i, _)| i);
                    let rest = held.split_off(cut);
                    chunks.push(std::mem::replace(held, rest));
                }
                chunks
            }
        }
    }
}

/// One chunk up to and including the last character matching `boundary`.
fn split_after_last(held: &mut String, boundary: impl Fn(char) -> bool) -> Vec<String> {
    let cut = held
        .char_indices()
        .filter(|(_, c)| boundary(*c))
        .next_back()
        .map(|(i, c)| i + c.len_utf8());
    match cut {
        Some(cut) if cut > 0 => {
            let rest = held.split_off(cut);
            vec![std::mem::replace(held, rest)]
        }
        _ => Vec::new(),
    }
}

#[derive(Default)]
struct MessageBuffer {
    /// Text received but not yet re-emitted.
    held: String,
    /// Cumulative text already emitted, for the `content` field.
    emitted: String,
    model: Option<String>,
}

struct RechunkState {
    source: EventStream,
    strategy: ChunkStrategy,
    buffers: HashMap<String, MessageBuffer>,
    pending: VecDeque<RunEvent>,
    exhausted: bool,
}

/// Rewrites text deltas in `source` according to `strategy`.
pub fn rechunk(strategy: ChunkStrategy, source: EventStream) -> EventStream {
    if strategy == ChunkStrategy::Immediate {
        return source;
    }
    let state = RechunkState {
        source,
        strategy,
        buffers: HashMap::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };
    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.exhausted {
                return None;
            }
            match state.source.next().await {
                Some(event) => state.admit(event),
                None => {
                    state.exhausted = true;
                    state.flush_all();
                }
            }
        }
    }))
}

impl RechunkState {
    fn admit(&mut self, event: RunEvent) {
        match event {
            RunEvent::TextMessageContent {
                message_id,
                model,
                delta,
                ..
            } => {
                let buffer = self.buffers.entry(message_id.clone()).or_default();
                if buffer.model.is_none() {
                    buffer.model = model;
                }
                buffer.held.push_str(&delta);
                for chunk in self.strategy.drain(&mut buffer.held) {
                    buffer.emitted.push_str(&chunk);
                    self.pending.push_back(RunEvent::text_message_content(
                        message_id.clone(),
                        buffer.model.clone(),
                        chunk,
                        buffer.emitted.clone(),
                    ));
                }
            }
            RunEvent::TextMessageEnd { ref message_id, .. } => {
                self.flush(&message_id.clone());
                self.pending.push_back(event);
            }
            _ => {
                if event.is_terminal() {
                    self.flush_all();
                }
                self.pending.push_back(event);
            }
        }
    }

    fn flush(&mut self, message_id: &str) {
        if let Some(mut buffer) = self.buffers.remove(message_id) {
            if !buffer.held.is_empty() {
                let chunk = std::mem::take(&mut buffer.held);
                buffer.emitted.push_str(&chunk);
                self.pending.push_back(RunEvent::text_message_content(
                    message_id,
                    buffer.model.clone(),
                    chunk,
                    buffer.emitted.clone(),
                ));
            }
        }
    }

    fn flush_all(&mut self) {
        let ids: Vec<String> = self.buffers.keys().cloned().collect();
        for id in ids {
            self.flush(&id);
        }
    }
}

/// A recorded event vector as a stream, for deterministic tests and
/// session replay.
pub fn replay(events: Vec<RunEvent>) -> EventStream {
    Box::pin(futures::stream::iter(events))
}
