//! AI/LLM provider implementations.
//!
//! This module provides a unified interface for the language model that
//! classifies emails.
//!
//! # Supported Providers
//!
//! - **OpenAI-compatible**: Works with OpenAI, vLLM, LM Studio, and other compatible endpoints
//! - **Anthropic**: Claude models via Anthropic's API
//! - **Ollama**: Local LLM inference via Ollama
//!
//! # Example
//!
//! ```rust,no_run
//! use sift::providers::ai::{
//!     LlmProvider, CompletionRequest, Message,
//!     OpenAiCompatibleProvider, AnthropicProvider, OllamaProvider,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Using OpenAI
//! let openai = OpenAiCompatibleProvider::openai("sk-...", "gpt-4o-mini");
//!
//! // Using Anthropic Claude
//! let anthropic = AnthropicProvider::new("sk-ant-...", "claude-3-5-haiku-20241022");
//!
//! // Using local Ollama
//! let ollama = OllamaProvider::new("llama3.2");
//!
//! // All providers implement the same trait
//! let request = CompletionRequest::new(vec![Message::user("Subject: hello")])
//!     .with_system_prompt("You are an email classifier.")
//!     .with_json_output();
//!
//! let response = openai.complete(&request).await?;
//! println!("Response: {}", response.text);
//! # Ok(())
//! # }
//! ```

mod anthropic;
mod ollama;
mod openai;
mod traits;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, LlmResult, Message,
    Role, TokenUsage,
};

use crate::config::AiSettings;

/// Builds the configured LLM provider, reading the API key from the
/// environment variable named in settings.
pub fn provider_from_settings(settings: &AiSettings) -> anyhow::Result<Box<dyn LlmProvider>> {
    let api_key = || -> anyhow::Result<String> {
        std::env::var(&settings.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "environment variable {} is not set (required for provider {})",
                settings.api_key_env,
                settings.provider
            )
        })
    };

    match settings.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicProvider::new(api_key()?, &settings.model))),
        "openai" => match &settings.base_url {
            Some(base) => Ok(Box::new(OpenAiCompatibleProvider::custom(
                base,
                Some(api_key()?),
                &settings.model,
            ))),
            None => Ok(Box::new(OpenAiCompatibleProvider::openai(
                api_key()?,
                &settings.model,
            ))),
        },
        "ollama" => match &settings.base_url {
            Some(base) => Ok(Box::new(OllamaProvider::with_url(base, &settings.model))),
            None => Ok(Box::new(OllamaProvider::new(&settings.model))),
        },
        other => anyhow::bail!("unknown AI provider: {other}"),
    }
}
