//! Anthropic Messages API client (API key auth, streaming).

use anyhow::Result;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::sse::SseParser;
use super::types::{ApiMessage, ApiToolDef, StreamingMessagesRequest};
use crate::providers::shared::{
    ProviderError, ProviderErrorKind, ProviderStream, USER_AGENT, resolve_api_key,
    resolve_base_url,
};
use crate::providers::{CompletionRequest, CompletionService};

/// Default base URL for the Anthropic API.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic client.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl AnthropicConfig {
    /// Builds a config from config-file values and the environment.
    ///
    /// API key: `config_api_key`, then `ANTHROPIC_API_KEY`.
    /// Base URL: `ANTHROPIC_BASE_URL`, then `config_base_url`, then
    /// [`DEFAULT_BASE_URL`].
    ///
    /// # Errors
    /// Returns an error if no API key is available or the base URL is invalid.
    pub fn from_env(
        model: String,
        max_tokens: u32,
        config_base_url: Option<&str>,
        config_api_key: Option<&str>,
    ) -> Result<Self> {
        let api_key = resolve_api_key(config_api_key, "ANTHROPIC_API_KEY", "anthropic")?;
        let base_url = resolve_base_url(
            config_base_url,
            "ANTHROPIC_BASE_URL",
            DEFAULT_BASE_URL,
            "Anthropic",
        )?;

        Ok(Self {
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }
}

/// Anthropic API client.
pub struct AnthropicClient {
    config: AnthropicConfig,
    http: reqwest::Client,
}

impl AnthropicClient {
    /// Creates a new client.
    ///
    /// # Panics
    /// In unit-test builds, panics if `base_url` is the production API.
    pub fn new(config: AnthropicConfig) -> Self {
        #[cfg(test)]
        assert!(
            config.base_url != DEFAULT_BASE_URL,
            "Tests must not use the production Anthropic API; point base_url at a mock server"
        );

        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Sends a transcript and returns the event stream.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] for transport failures and non-2xx responses.
    pub async fn send_messages_stream(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<ProviderStream> {
        let body = StreamingMessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            tools: (!request.tools.is_empty())
                .then(|| request.tools.iter().map(ApiToolDef::from).collect()),
            system: request.system.filter(|s| !s.trim().is_empty()),
            stream: true,
        };

        let url = format!("{}/v1/messages", self.config.base_url);
        debug!(
            %url,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "Opening completion stream"
        );

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("user-agent", USER_AGENT)
            .header("anthropic-version", API_VERSION)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &error_body).into());
        }

        Ok(Box::pin(SseParser::new(Box::pin(response.bytes_stream()))))
    }
}

impl CompletionService for AnthropicClient {
    fn stream_completion<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<ProviderStream>> {
        Box::pin(self.send_messages_stream(request))
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ProviderError::timeout(format!("Connection failed: {e}"))
    } else if e.is_request() {
        ProviderError::new(ProviderErrorKind::HttpStatus, format!("Request error: {e}"))
    } else {
        ProviderError::new(ProviderErrorKind::HttpStatus, format!("Network error: {e}"))
    }
}
