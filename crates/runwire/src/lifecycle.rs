//! Run lifecycle enforcement.
//!
//! Every adapter wraps its raw event stream in [`guard`], which makes the
//! stream-level contract hold no matter what the transport does:
//!
//! - the first event is always `RUN_STARTED` (one is synthesized if the
//!   source failed before emitting it),
//! - at most one terminal event is emitted, and nothing follows it,
//! - a source that ends without a terminal gets a `RUN_ERROR` appended.
//!
//! Cancellation is deliberately applied *outside* this wrapper (see
//! [`Adapter::events`](crate::Adapter::events) implementations): a
//! cancelled run ends mid-stream with no terminal event, which is the
//! wire-level signal for "cancelled".

use std::collections::VecDeque;

use futures::StreamExt;

use crate::error::code;
use crate::event::{ErrorInfo, EventStream, RunEvent, new_run_id};

struct GuardState {
    source: EventStream,
    pending: VecDeque<RunEvent>,
    started: bool,
    terminated: bool,
    exhausted: bool,
    run_id: String,
    model: Option<String>,
}

/// Wraps `source` so the lifecycle invariants hold for its consumer.
///
/// `model` is used on synthesized events when the source never got far
/// enough to name one.
pub fn guard(model: Option<String>, source: EventStream) -> EventStream {
    let state = GuardState {
        source,
        pending: VecDeque::new(),
        started: false,
        terminated: false,
        exhausted: false,
        run_id: new_run_id(),
        model,
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
                    if !state.terminated {
                        state.close_unterminated();
                    }
                }
            }
        }
    }))
}

impl GuardState {
    fn admit(&mut self, event: RunEvent) {
        if self.terminated {
            return;
        }
        if !self.started {
            match &event {
                RunEvent::RunStarted { run_id, model, .. } => {
                    self.run_id = run_id.clone();
                    if model.is_some() {
                        self.model = model.clone();
                    }
                }
                _ => {
                    self.pending.push_back(RunEvent::run_started(
                        self.run_id.clone(),
                        self.model.clone(),
                    ));
                }
            }
            self.started = true;
        } else if matches!(event, RunEvent::RunStarted { .. }) {
            // A duplicate start is a transport bug; swallow it.
            return;
        }
        if event.is_terminal() {
            self.terminated = true;
        }
        self.pending.push_back(self.stamp(event));
    }

    fn stamp(&self, mut event: RunEvent) -> RunEvent {
        if let RunEvent::RunError { run_id, .. } = &mut event {
            if run_id.is_none() {
                *run_id = Some(self.run_id.clone());
            }
        }
        event
    }

    fn close_unterminated(&mut self) {
        if !self.started {
            self.pending.push_back(RunEvent::run_started(
                self.run_id.clone(),
                self.model.clone(),
            ));
            self.started = true;
        }
        self.terminated = true;
        self.pending.push_back(RunEvent::run_error(
            Some(self.run_id.clone()),
            self.model.clone(),
            ErrorInfo::with_code("stream ended without a terminal event", code::STREAM_FORMAT),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FinishReason;

    fn collect(events: Vec<RunEvent>) -> Vec<RunEvent> {
        futures::executor::block_on(
            guard(Some("m".into()), Box::pin(futures::stream::iter(events)))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_well_formed_stream_passes_through() {
        let events = collect(vec![
            RunEvent::run_started("run-1", Some("m".into())),
            RunEvent::text_message_start("msg-1", None),
            RunEvent::text_message_end("msg-1", None),
            RunEvent::run_finished("run-1", None, Some(FinishReason::Stop), None),
        ]);
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], RunEvent::RunStarted { .. }));
        assert!(events[3].is_terminal());
    }

    #[test]
    fn test_missing_start_is_synthesized() {
        let events = collect(vec![RunEvent::run_error(
            None,
            None,
            ErrorInfo::new("connect refused"),
        )]);
        assert_eq!(events.len(), 2);
        let RunEvent::RunStarted { run_id, .. } = &events[0] else {
            panic!("expected RUN_STARTED first, got {:?}", events[0]);
        };
        let RunEvent::RunError {
            run_id: err_run_id, ..
        } = &events[1]
        else {
            panic!("expected RUN_ERROR, got {:?}", events[1]);
        };
        assert_eq!(err_run_id.as_deref(), Some(run_id.as_str()));
    }

    #[test]
    fn test_events_after_terminal_suppressed() {
        let events = collect(vec![
            RunEvent::run_started("run-1", None),
            RunEvent::run_finished("run-1", None, Some(FinishReason::Stop), None),
            RunEvent::text_message_start("msg-late", None),
            RunEvent::run_finished("run-1", None, Some(FinishReason::Stop), None),
        ]);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_unterminated_source_gets_error() {
        let events = collect(vec![
            RunEvent::run_started("run-1", None),
            RunEvent::text_message_start("msg-1", None),
        ]);
        assert_eq!(events.len(), 3);
        let RunEvent::RunError { error, .. } = &events[2] else {
            panic!("expected trailing RUN_ERROR, got {:?}", events[2]);
        };
        assert_eq!(error.code.as_deref(), Some(code::STREAM_FORMAT));
    }

    #[test]
    fn test_empty_source_yields_start_and_error() {
        let events = collect(vec![]);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RunEvent::RunStarted { .. }));
        assert!(matches!(events[1], RunEvent::RunError { .. }));
    }
}
