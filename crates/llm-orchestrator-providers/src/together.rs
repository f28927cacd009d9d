// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Together AI provider implementation.
//!
//! Together's inference API is OpenAI-compatible; model identifiers are the
//! slash-qualified HuggingFace-style names in the registry catalogue
//! (e.g. `mistralai/mistral-7b-instruct-v0.2`).

use crate::traits::{GenerateParams, LLMProvider, LLMResponse, ModelCapabilities, ProviderError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use llm_orchestrator_core::registry::ModelRegistry;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "together";

pub struct TogetherProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct TogetherErrorResponse {
    error: TogetherError,
}

#[derive(Debug, Deserialize)]
struct TogetherError {
    message: String,
}

impl TogetherProvider {
    fn convert_reqwest_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: "request timed out".to_string(),
            }
        } else {
            ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.together.xyz/v1".to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .expect("failed to build reqwest client");

        Self { client, api_key, base_url }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("TOGETHER_API_KEY")
            .map_err(|_| ProviderError::Authentication(PROVIDER_NAME.to_string()))?;
        Ok(Self::new(api_key))
    }

    fn to_together_request(&self, prompt: &str, params: &GenerateParams) -> ChatCompletionRequest {
        let mut messages = Vec::new();
        if let Some(system) = params.extra.get("system").and_then(|v| v.as_str()) {
            messages.push(ChatMessage { role: "system".to_string(), content: system.to_string() });
        }
        messages.push(ChatMessage { role: "user".to_string(), content: prompt.to_string() });

        ChatCompletionRequest {
            model: params.model.clone().unwrap_or_else(|| "mistralai/mistral-7b-instruct-v0.2".to_string()),
            messages,
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            stream: false,
        }
    }

    fn parse_error(&self, status: StatusCode, body: &str) -> ProviderError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ProviderError::RateLimit(PROVIDER_NAME.to_string());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ProviderError::Authentication(PROVIDER_NAME.to_string());
        }
        if let Ok(error_response) = serde_json::from_str::<TogetherErrorResponse>(body) {
            return ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: format!("[{}] {}", status.as_u16(), error_response.error.message),
            };
        }
        ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: format!("[{}] {}", status.as_u16(), body),
        }
    }
}

#[async_trait]
impl LLMProvider for TogetherProvider {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<LLMResponse, ProviderError> {
        let started = Instant::now();
        let model = params.model.clone().unwrap_or_else(|| "mistralai/mistral-7b-instruct-v0.2".to_string());
        let request_body = self.to_together_request(prompt, params);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(Self::convert_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(self.parse_error(status, &body));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: format!("malformed response: {e}"),
        })?;

        let choice = completion.choices.into_iter().next().ok_or_else(|| ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: "no choices in response".to_string(),
        })?;

        let cost_usd = self.get_cost(&model, completion.usage.prompt_tokens, completion.usage.completion_tokens).await;

        Ok(LLMResponse {
            content: choice.message.content,
            model,
            provider: PROVIDER_NAME.to_string(),
            tokens_prompt: completion.usage.prompt_tokens,
            tokens_completion: completion.usage.completion_tokens,
            tokens_total: completion.usage.total_tokens,
            cost_usd,
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason: choice.finish_reason,
            metadata: Default::default(),
        })
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        let response = self.generate(prompt, params).await?;
        Ok(Box::pin(stream::once(async move { Ok(response.content) })))
    }

    async fn get_cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        match ModelRegistry::get_model_config(PROVIDER_NAME, model) {
            Some(config) => {
                (prompt_tokens as f64 / 1000.0) * config.cost_per_1k_prompt
                    + (completion_tokens as f64 / 1000.0) * config.cost_per_1k_completion
            }
            None => 0.0,
        }
    }

    async fn get_latency_estimate(&self, model: &str) -> u64 {
        ModelRegistry::get_model_config(PROVIDER_NAME, model).map(|c| c.latency_estimate_ms).unwrap_or(2000)
    }

    fn get_model_capabilities(&self, model: &str) -> ModelCapabilities {
        match ModelRegistry::get_model_config(PROVIDER_NAME, model) {
            Some(config) => ModelCapabilities {
                code_generation: config.has_capability("code_generation"),
                reasoning: config.has_capability("reasoning"),
                analysis: config.has_capability("analysis"),
                long_context: config.has_capability("long_context"),
                function_calling: config.has_capability("function_calling"),
                vision: config.has_capability("vision"),
                streaming: true,
                max_tokens: config.max_tokens,
                supported_languages: Vec::new(),
            },
            None => ModelCapabilities::default(),
        }
    }

    fn list_models(&self) -> Vec<String> {
        ModelRegistry::list_models(Some(PROVIDER_NAME))
            .into_iter()
            .filter_map(|entry| entry.split_once('/').map(|(_, model)| model.to_string()))
            .collect()
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_creation_defaults_base_url() {
        let provider = TogetherProvider::new("test-key".to_string());
        assert_eq!(provider.provider_name(), "together");
        assert_eq!(provider.base_url, "https://api.together.xyz/v1");
    }

    #[test]
    fn request_builder_defaults_to_mistral_7b() {
        let provider = TogetherProvider::new("test-key".to_string());
        let params = GenerateParams::default();
        let request = provider.to_together_request("hi", &params);
        assert_eq!(request.model, "mistralai/mistral-7b-instruct-v0.2");
    }

    #[test]
    fn list_models_strips_provider_prefix_but_keeps_slash_qualified_model_ids() {
        let provider = TogetherProvider::new("test-key".to_string());
        let models = provider.list_models();
        assert!(models.iter().any(|m| m == "mistralai/mistral-7b-instruct-v0.2"));
    }

    #[test]
    fn parse_error_detects_rate_limit_from_status() {
        let provider = TogetherProvider::new("test-key".to_string());
        let error = provider.parse_error(StatusCode::TOO_MANY_REQUESTS, "{}");
        assert!(matches!(error, ProviderError::RateLimit(_)));
    }
}
