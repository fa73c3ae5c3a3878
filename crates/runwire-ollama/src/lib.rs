//! Ollama adapter for runwire.
//!
//! This crate implements [`Adapter`](runwire::Adapter) for Ollama's
//! JSON Lines chat API: streaming generation against local or remote
//! models, normalized into the shared [`RunEvent`](runwire::RunEvent)
//! vocabulary, with tool calling and schema-constrained output via the
//! native `format` field.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use runwire::{Adapter, ChatOptions, Message, collect_run};
//! use runwire_ollama::{OllamaAdapter, OllamaConfig};
//!
//! # async fn example() -> Result<(), runwire::AiError> {
//! let adapter = OllamaAdapter::new(OllamaConfig {
//!     model: "llama3.2".into(),
//!     ..Default::default()
//! });
//!
//! let summary = collect_run(adapter.events(&ChatOptions {
//!     messages: vec![Message::user("Hello!")],
//!     ..Default::default()
//! }).await).await?;
//! println!("{}", summary.text);
//! # Ok(())
//! # }
//! ```

mod adapter;
mod config;
mod convert;
mod factory;
mod stream;
mod types;

pub use adapter::OllamaAdapter;
pub use config::OllamaConfig;
pub use factory::{OllamaFactory, register_global};
