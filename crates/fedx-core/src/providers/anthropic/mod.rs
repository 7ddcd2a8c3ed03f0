//! Anthropic Messages API provider.

mod client;
mod sse;
mod types;

pub use client::{AnthropicClient, AnthropicConfig, DEFAULT_BASE_URL};
