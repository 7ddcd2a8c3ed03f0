//! Completion service boundary and the Anthropic streaming client.
//!
//! The master loop and worker executions only see [`CompletionService`]:
//! given a system prompt, a transcript and a tool catalog it returns a
//! stream of [`StreamEvent`]s.

pub mod anthropic;
#[cfg(test)]
pub(crate) mod scripted;
pub mod shared;

use anyhow::Result;
use futures_util::future::BoxFuture;

pub use shared::{
    ChatContentBlock, ChatMessage, ContentBlockType, MessageContent, ProviderError,
    ProviderErrorKind, ProviderResult, ProviderStream, StreamEvent, Usage, resolve_api_key,
    resolve_base_url,
};

use crate::tools::ToolDefinition;

/// One streaming completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolDefinition],
}

/// External model endpoint.
///
/// Implementations must be shareable across the master loop and every
/// concurrently running worker execution.
pub trait CompletionService: Send + Sync {
    /// Opens a streaming completion.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or the endpoint
    /// rejects it before streaming starts.
    fn stream_completion<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<ProviderStream>>;
}
