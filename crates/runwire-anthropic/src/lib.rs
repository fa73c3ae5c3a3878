//! Anthropic Claude adapter for runwire.
//!
//! This crate implements [`Adapter`](runwire::Adapter) for Anthropic's
//! Messages API: streaming generation normalized into the shared
//! [`RunEvent`](runwire::RunEvent) vocabulary, with full tool-calling and
//! extended-thinking support.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use runwire::{Adapter, ChatOptions, Message, collect_run};
//! use runwire_anthropic::{AnthropicAdapter, AnthropicConfig};
//!
//! # async fn example() -> Result<(), runwire::AiError> {
//! let adapter = AnthropicAdapter::new(AnthropicConfig {
//!     api_key: std::env::var("ANTHROPIC_API_KEY").unwrap(),
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

pub use adapter::AnthropicAdapter;
pub use config::AnthropicConfig;
pub use factory::{AnthropicFactory, register_global};
