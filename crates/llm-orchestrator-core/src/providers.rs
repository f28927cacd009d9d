// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `LLMProvider` contract implemented by each backend adapter crate.
//!
//! This module owns the wire-independent shape every provider adapter
//! (OpenAI, Anthropic, Mistral, Together, Ollama, ...) must produce: a single
//! `LLMResponse` envelope carrying usage and cost accounting alongside the
//! generated text, so the router and engine never need to know which
//! provider actually served a request.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors a provider adapter can raise. The router inspects these to decide
/// whether a fallback to the next candidate is warranted.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limit exceeded for provider '{0}'")]
    RateLimit(String),

    #[error("authentication failed for provider '{0}'")]
    Authentication(String),

    #[error("model '{model}' not available on provider '{provider}'")]
    ModelNotFound { provider: String, model: String },

    #[error("provider '{provider}' request failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("provider '{0}' is not configured/available")]
    Unavailable(String),
}

impl ProviderError {
    pub fn provider(&self) -> Option<&str> {
        match self {
            ProviderError::RateLimit(p) => Some(p),
            ProviderError::Authentication(p) => Some(p),
            ProviderError::ModelNotFound { provider, .. } => Some(provider),
            ProviderError::RequestFailed { provider, .. } => Some(provider),
            ProviderError::Unavailable(p) => Some(p),
        }
    }
}

/// Declared feature set and limits for a specific model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub code_generation: bool,
    pub reasoning: bool,
    pub analysis: bool,
    pub long_context: bool,
    pub function_calling: bool,
    pub vision: bool,
    pub streaming: bool,
    pub max_tokens: u32,
    pub supported_languages: Vec<String>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            code_generation: false,
            reasoning: false,
            analysis: false,
            long_context: false,
            function_calling: false,
            vision: false,
            streaming: false,
            max_tokens: 4096,
            supported_languages: Vec::new(),
        }
    }
}

/// A single completion, with enough usage/cost accounting for the router's
/// usage statistics and the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub tokens_prompt: u32,
    pub tokens_completion: u32,
    pub tokens_total: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Parameters shared by `generate` and `stream_generate`.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 2000,
            extra: HashMap::new(),
        }
    }
}

/// A backend capable of serving text completions for one or more models.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<LLMResponse, ProviderError>;

    async fn stream_generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError>;

    async fn get_cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64;

    async fn get_latency_estimate(&self, model: &str) -> u64;

    fn get_model_capabilities(&self, model: &str) -> ModelCapabilities;

    fn list_models(&self) -> Vec<String>;

    fn is_available(&self) -> bool;

    fn provider_name(&self) -> &str;
}

pub type ProviderRef = std::sync::Arc<dyn LLMProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_exposes_provider_name() {
        let err = ProviderError::RateLimit("openai".into());
        assert_eq!(err.provider(), Some("openai"));
    }

    #[test]
    fn default_capabilities_are_conservative() {
        let caps = ModelCapabilities::default();
        assert!(!caps.code_generation);
        assert_eq!(caps.max_tokens, 4096);
    }
}
