//! Anthropic [`Adapter`] implementation.

use std::collections::HashSet;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use runwire::event::new_run_id;
use runwire::{Adapter, AdapterMetadata, AiError, Capability, ChatOptions, EventStream, RunEvent};
use tracing::instrument;

use crate::config::AnthropicConfig;
use crate::convert;

/// Anthropic Claude adapter implementing [`Adapter`].
///
/// Talks to the Anthropic Messages API with tool calling, extended
/// thinking, and streaming.
///
/// # Example
///
/// ```rust,no_run
/// use runwire_anthropic::{AnthropicAdapter, AnthropicConfig};
/// use runwire::{Adapter, ChatOptions, Message, collect_run};
///
/// # async fn example() -> Result<(), runwire::AiError> {
/// let adapter = AnthropicAdapter::new(AnthropicConfig {
///     api_key: std::env::var("ANTHROPIC_API_KEY").unwrap(),
///     ..Default::default()
/// });
///
/// let summary = collect_run(adapter.events(&ChatOptions {
///     messages: vec![Message::user("Hello!")],
///     ..Default::default()
/// }).await).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create a new Anthropic adapter from configuration.
    ///
    /// If `config.client` is `Some`, that client is reused for connection
    /// pooling. Otherwise a new client is built with the configured timeout.
    pub fn new(config: AnthropicConfig) -> Self {
        let client = config.client.clone().unwrap_or_else(|| {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = config.timeout {
                builder = builder.timeout(timeout);
            }
            builder.build().unwrap_or_default()
        });
        Self { config, client }
    }

    /// Build the default headers for Anthropic API requests.
    fn default_headers(&self) -> Result<HeaderMap, AiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key)
                .map_err(|_| AiError::Auth("API key contains invalid header characters".into()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.config.api_version).map_err(|_| {
                AiError::InvalidRequest("API version contains invalid header characters".into())
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Build the full URL for the messages endpoint.
    fn messages_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    /// Send a streaming request to the Messages API, validating the HTTP
    /// status before handing the body to the SSE translator.
    async fn send_request(&self, options: &ChatOptions) -> Result<reqwest::Response, AiError> {
        let request_body = convert::build_request(options, &self.config, true)?;
        let headers = self.default_headers()?;

        let mut req = self
            .client
            .post(self.messages_url())
            .headers(headers)
            .json(&request_body);
        if let Some(timeout) = options.timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                AiError::Timeout {
                    elapsed_ms: options
                        .timeout
                        .or(self.config.timeout)
                        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                }
            } else {
                AiError::Http {
                    status: e.status().map(|s| {
                        http::StatusCode::from_u16(s.as_u16())
                            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
                    }),
                    message: e.to_string(),
                    retryable: e.is_connect() || e.is_timeout(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let http_status = http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            return Err(convert::convert_error(http_status, &body));
        }
        Ok(response)
    }
}

/// A two-event stream for requests that fail before any bytes arrive.
fn error_stream(run_id: String, model: String, err: &AiError) -> EventStream {
    let events = vec![
        RunEvent::run_started(run_id.clone(), Some(model.clone())),
        RunEvent::run_error(Some(run_id), Some(model), err.to_error_info()),
    ];
    Box::pin(futures::stream::iter(events))
}

impl Adapter for AnthropicAdapter {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn events(&self, options: &ChatOptions) -> EventStream {
        let run_id = new_run_id();
        let model = self.config.model.clone();

        let stream = match self.send_request(options).await {
            Ok(response) => crate::stream::into_stream(response, run_id, model.clone()),
            Err(err) => error_stream(run_id, model.clone(), &err),
        };
        // Cancellation stays outside the guard so a cancelled run ends
        // mid-stream with no terminal event.
        let stream = runwire::lifecycle::guard(Some(model), stream);

        match options.cancellation.clone() {
            Some(token) => Box::pin(stream.take_while(move |_| {
                futures::future::ready(!token.is_cancelled())
            })),
            None => stream,
        }
    }

    fn metadata(&self) -> AdapterMetadata {
        let mut capabilities = HashSet::new();
        capabilities.insert(Capability::Tools);
        capabilities.insert(Capability::Vision);
        capabilities.insert(Capability::Thinking);
        capabilities.insert(Capability::StructuredOutput);

        AdapterMetadata {
            name: "anthropic".into(),
            model: self.config.model.clone(),
            capabilities,
        }
    }
}
