//! Mock adapter for testing.
//!
//! [`MockAdapter`] is a queue-based fake: each call to
//! [`events`](crate::Adapter::events) pops the next scripted event vector
//! and streams it, so tests control exactly what a backend "says" without
//! touching the network. It implements [`Adapter`](crate::Adapter), so it
//! works anywhere a real adapter does — including through
//! [`DynAdapter`](crate::DynAdapter) via the blanket impl, and under the
//! agent loop.
//!
//! Scripted events pass through the same [`lifecycle`](crate::lifecycle)
//! guard and cancellation cut as real adapters, so a deliberately
//! malformed script exercises the production enforcement path.
//!
//! # Usage
//!
//! ```rust,no_run
//! use runwire::mock::MockAdapter;
//! use runwire::test_helpers::text_run;
//! use runwire::{Adapter, ChatOptions, Message};
//!
//! # async fn example() {
//! let mock = MockAdapter::new();
//! mock.queue_run(text_run("run-1", "Hello!"));
//!
//! let options = ChatOptions {
//!     messages: vec![Message::user("Hi")],
//!     ..Default::default()
//! };
//! let events = mock.events(&options).await;
//! # let _ = events;
//! assert_eq!(mock.recorded_calls().len(), 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::StreamExt;

use crate::adapter::{Adapter, AdapterMetadata, Capability, ChatOptions};
use crate::event::{EventStream, RunEvent};
use crate::lifecycle;

/// A queue-based mock adapter for unit and integration tests.
///
/// Push event scripts with [`queue_run`](Self::queue_run). Every call
/// records its [`ChatOptions`] for later assertion via
/// [`recorded_calls`](Self::recorded_calls).
///
/// # Panics
///
/// [`events`](Adapter::events) panics if the script queue is empty.
pub struct MockAdapter {
    scripts: Mutex<VecDeque<Vec<RunEvent>>>,
    meta: AdapterMetadata,
    calls: Arc<Mutex<Vec<ChatOptions>>>,
}

impl fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queued = self.scripts.lock().unwrap().len();
        let call_count = self.calls.lock().unwrap().len();
        f.debug_struct("MockAdapter")
            .field("meta", &self.meta)
            .field("queued_runs", &queued)
            .field("recorded_calls", &call_count)
            .finish()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Creates a mock with default metadata and an empty queue.
    pub fn new() -> Self {
        Self::with_metadata(AdapterMetadata {
            name: "mock".into(),
            model: "mock-model".into(),
            capabilities: [Capability::Tools, Capability::StructuredOutput]
                .into_iter()
                .collect(),
        })
    }

    /// Creates a mock with the given metadata.
    pub fn with_metadata(meta: AdapterMetadata) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            meta,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueues the event script for the next `events` call.
    pub fn queue_run(&self, events: Vec<RunEvent>) -> &Self {
        self.scripts.lock().unwrap().push_back(events);
        self
    }

    /// A clone of every [`ChatOptions`] passed to `events`, in call
    /// order.
    pub fn recorded_calls(&self) -> Vec<ChatOptions> {
        self.calls.lock().unwrap().clone()
    }

    /// Scripts still waiting to be consumed.
    pub fn remaining_runs(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

impl Adapter for MockAdapter {
    async fn events(&self, options: &ChatOptions) -> EventStream {
        self.calls.lock().unwrap().push(options.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockAdapter: no queued runs remaining");
        let guarded = lifecycle::guard(
            Some(self.meta.model.clone()),
            Box::pin(futures::stream::iter(script)),
        );
        match options.cancellation.clone() {
            Some(token) => {
                Box::pin(guarded.take_while(move |_| {
                    let stop = token.is_cancelled();
                    async move { !stop }
                }))
            }
            None => guarded,
        }
    }

    fn metadata(&self) -> AdapterMetadata {
        self.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{collect_events, text_run};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_scripted_run_plays_back() {
        let mock = MockAdapter::new();
        mock.queue_run(text_run("run-1", "Hello"));
        let events = collect_events(mock.events(&ChatOptions::default()).await).await;
        assert!(matches!(events[0], RunEvent::RunStarted { .. }));
        assert!(events.last().unwrap().is_terminal());
        assert_eq!(mock.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_scripts_pop_in_order() {
        let mock = MockAdapter::new();
        mock.queue_run(text_run("run-1", "first"))
            .queue_run(text_run("run-2", "second"));
        let first = collect_events(mock.events(&ChatOptions::default()).await).await;
        let second = collect_events(mock.events(&ChatOptions::default()).await).await;
        assert!(matches!(&first[0], RunEvent::RunStarted { run_id, .. } if run_id == "run-1"));
        assert!(matches!(&second[0], RunEvent::RunStarted { run_id, .. } if run_id == "run-2"));
        assert_eq!(mock.remaining_runs(), 0);
    }

    #[tokio::test]
    async fn test_unterminated_script_goes_through_guard() {
        let mock = MockAdapter::new();
        mock.queue_run(vec![RunEvent::run_started("run-1", None)]);
        let events = collect_events(mock.events(&ChatOptions::default()).await).await;
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_yields_nothing() {
        let mock = MockAdapter::new();
        mock.queue_run(text_run("run-1", "never seen"));
        let token = CancellationToken::new();
        token.cancel();
        let options = ChatOptions {
            cancellation: Some(token),
            ..Default::default()
        };
        let events = collect_events(mock.events(&options).await).await;
        assert!(events.is_empty());
    }
}
