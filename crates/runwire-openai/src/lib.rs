//! `OpenAI` adapter for runwire.
//!
//! This crate implements [`Adapter`](runwire::Adapter) for the `OpenAI`
//! Chat Completions API: streaming generation normalized into the shared
//! [`RunEvent`](runwire::RunEvent) vocabulary, with full tool-calling and
//! native structured-output support via `response_format`.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use runwire::{Adapter, ChatOptions, Message, collect_run};
//! use runwire_openai::{OpenAiAdapter, OpenAiConfig};
//!
//! # async fn example() -> Result<(), runwire::AiError> {
//! let adapter = OpenAiAdapter::new(OpenAiConfig {
//!     api_key: std::env::var("OPENAI_API_KEY").unwrap(),
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

pub use adapter::OpenAiAdapter;
pub use config::OpenAiConfig;
pub use factory::{OpenAiFactory, register_global};
