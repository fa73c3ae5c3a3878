//! # runwire
//!
//! Uniform, streaming-first access to AI model backends.
//!
//! Every backend — hosted or local — is exposed through one adapter
//! interface that emits a single normalized event vocabulary
//! ([`RunEvent`], AG-UI protocol shape). On top of that sit the agent
//! loop ([`ChatEngine`]: model runs interleaved with automatic tool
//! execution), structured output ([`structured`]), an SSE codec
//! ([`sse`]), and a registry for building adapters from configuration
//! ([`registry`]).
//!
//! # Adapter crates
//!
//! | Crate | Backend |
//! |-------|---------|
//! | [`runwire-anthropic`](https://docs.rs/runwire-anthropic) | Claude (Anthropic Messages API) |
//! | [`runwire-openai`](https://docs.rs/runwire-openai) | GPT (OpenAI Chat Completions) |
//! | [`runwire-ollama`](https://docs.rs/runwire-ollama) | Ollama (local) |
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//!  │ runwire-anthropic │ │  runwire-openai │ │  runwire-ollama │
//!  └─────────┬─────────┘ └────────┬────────┘ └────────┬────────┘
//!            │                    │                    │
//!            └──────────┬─────────┴─────────┬──────────┘
//!                       │                   │
//!                       ▼                   ▼
//!            ┌─────────────────────────────────────┐
//!            │              runwire                │  ← you are here
//!            │  (Adapter trait, RunEvent, engine)  │
//!            └─────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use runwire::{Adapter, ChatOptions, Message, collect_run};
//!
//! # async fn example(adapter: impl Adapter) -> Result<(), runwire::AiError> {
//! let options = ChatOptions {
//!     messages: vec![Message::user("Explain ownership in Rust")],
//!     max_tokens: Some(1024),
//!     ..Default::default()
//! };
//!
//! let summary = collect_run(adapter.events(&options).await).await?;
//! println!("{}", summary.text);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`event`] | The [`RunEvent`] vocabulary and the [`EventStream`] alias |
//! | [`message`] | Conversation messages, parts, and tool-call records |
//! | [`adapter`] | The [`Adapter`] trait and per-run [`ChatOptions`] |
//! | [`engine`] | Agent loop with tool execution and approvals |
//! | [`tool`] | Tool definitions, registry, and batch execution |
//! | [`lifecycle`] | Stream-level lifecycle enforcement |
//! | [`processor`] | Text re-chunking and deterministic replay |
//! | [`partial_json`] | Tolerant parser for mid-stream argument previews |
//! | [`sse`] | Server-sent events encoding and incremental parsing |
//! | [`registry`] | Dynamic adapter instantiation from configuration |
//! | [`structured`] | Typed responses with schema validation (feature-gated) |
//! | [`error`] | Unified [`AiError`] across all backends |

pub mod adapter;
pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod message;
pub mod partial_json;
pub mod processor;
pub mod registry;
pub mod schema;
pub mod sse;
pub mod tool;

#[cfg(feature = "schema")]
pub mod structured;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

// ── Core re-exports ────────────────────────────────────────────────
//
// Only the types that appear in nearly every program are re-exported
// at the crate root. Everything else lives in its submodule:
//
//   runwire::engine::*     — loop strategies, approval handles
//   runwire::tool::*       — handlers, registry, batch execution
//   runwire::processor::*  — ChunkStrategy, replay
//   runwire::sse::*        — encode, SseParser
//   runwire::registry::*   — AdapterRegistry, AdapterFactory
//   runwire::structured::* — generate_object (schema feature)
//   runwire::mock::*       — MockAdapter (test-utils feature)

pub use adapter::{
    Adapter, AdapterMetadata, Capability, ChatOptions, DynAdapter, RunSummary, collect_run,
};
pub use engine::{ApprovalHandle, ChatEngine};
pub use error::AiError;
pub use event::{ErrorInfo, EventStream, FinishReason, RunEvent, UsageInfo};
pub use message::{Message, Part, Role, ToolCall, ToolCallResult};
pub use registry::AdapterRegistry;
pub use schema::JsonSchema;
pub use tool::{ToolDefinition, ToolHandler, ToolRegistry};
