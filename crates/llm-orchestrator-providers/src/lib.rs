// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM provider integrations for LLM Orchestrator.

pub mod anthropic;
pub mod mistral;
pub mod ollama;
pub mod openai;
pub mod together;
pub mod traits;

// Re-exports
pub use anthropic::AnthropicProvider;
pub use mistral::MistralProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use together::TogetherProvider;
pub use traits::{GenerateParams, LLMProvider, LLMResponse, ModelCapabilities, ProviderError, ProviderRef};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
