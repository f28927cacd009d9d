// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic (Claude) provider implementation.

use crate::traits::{GenerateParams, LLMProvider, LLMResponse, ModelCapabilities, ProviderError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use llm_orchestrator_core::registry::ModelRegistry;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "anthropic";

/// Anthropic API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    api_version: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl AnthropicProvider {
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
        Self::with_base_url(api_key, "https://api.anthropic.com/v1".to_string(), "2023-06-01".to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String, api_version: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build reqwest client");

        Self { client, api_key, base_url, api_version }
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::Authentication(PROVIDER_NAME.to_string()))?;
        Ok(Self::new(api_key))
    }

    fn to_anthropic_request(&self, prompt: &str, params: &GenerateParams) -> MessagesRequest {
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        let system = params.extra.get("system").and_then(|v| v.as_str()).map(String::from);
        let top_p = params.extra.get("top_p").and_then(|v| v.as_f64()).map(|f| f as f32);

        MessagesRequest {
            model: params.model.clone().unwrap_or_else(|| "claude-3-haiku-20240307".to_string()),
            messages,
            max_tokens: params.max_tokens,
            system,
            temperature: Some(params.temperature),
            top_p,
        }
    }

    fn parse_error(&self, status: StatusCode, body: &str) -> ProviderError {
        if let Ok(error_response) = serde_json::from_str::<AnthropicErrorResponse>(body) {
            let error = error_response.error;
            if status == StatusCode::TOO_MANY_REQUESTS || error.error_type == "rate_limit_error" {
                return ProviderError::RateLimit(PROVIDER_NAME.to_string());
            }
            if status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
                || error.error_type == "authentication_error"
                || error.error_type == "permission_error"
            {
                return ProviderError::Authentication(PROVIDER_NAME.to_string());
            }
            return ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: format!("[{}] {}: {}", status.as_u16(), error.error_type, error.message),
            };
        }
        ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: format!("[{}] {}", status.as_u16(), body),
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<LLMResponse, ProviderError> {
        let started = Instant::now();
        let anthropic_request = self.to_anthropic_request(prompt, params);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(Self::convert_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(self.parse_error(status, &body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: format!("malformed response: {e}"),
        })?;

        let content = parsed.content.iter().map(|block| block.text.as_str()).collect::<Vec<_>>().join("");
        let cost_usd = self.get_cost(&parsed.model, parsed.usage.input_tokens, parsed.usage.output_tokens).await;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("message_id".to_string(), serde_json::json!(parsed.id));

        Ok(LLMResponse {
            content,
            model: parsed.model,
            provider: PROVIDER_NAME.to_string(),
            tokens_prompt: parsed.usage.input_tokens,
            tokens_completion: parsed.usage.output_tokens,
            tokens_total: parsed.usage.input_tokens + parsed.usage.output_tokens,
            cost_usd,
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason: parsed.stop_reason,
            metadata,
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
        ModelRegistry::get_model_config(PROVIDER_NAME, model).map(|c| c.latency_estimate_ms).unwrap_or(2500)
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
        let provider = AnthropicProvider::new("test-key".to_string());
        assert_eq!(provider.provider_name(), "anthropic");
        assert_eq!(provider.base_url, "https://api.anthropic.com/v1");
    }

    #[test]
    fn provider_with_custom_base_url_and_version() {
        let provider = AnthropicProvider::with_base_url(
            "test-key".to_string(),
            "http://localhost:8080".to_string(),
            "2023-06-01".to_string(),
        );
        assert_eq!(provider.base_url, "http://localhost:8080");
        assert_eq!(provider.api_version, "2023-06-01");
    }

    #[test]
    fn request_builder_carries_system_and_max_tokens() {
        let provider = AnthropicProvider::new("test-key".to_string());
        let mut params = GenerateParams {
            model: Some("claude-3-opus".to_string()),
            max_tokens: 100,
            ..Default::default()
        };
        params.extra.insert("system".to_string(), serde_json::json!("You are a helpful assistant"));

        let request = provider.to_anthropic_request("Hello, world!", &params);
        assert_eq!(request.model, "claude-3-opus");
        assert_eq!(request.messages[0].content, "Hello, world!");
        assert_eq!(request.system, Some("You are a helpful assistant".to_string()));
        assert_eq!(request.max_tokens, 100);
    }

    #[test]
    fn parse_error_detects_rate_limit() {
        let provider = AnthropicProvider::new("test-key".to_string());
        let error_json = r#"{"error": {"type": "rate_limit_error", "message": "Rate limit exceeded"}}"#;
        let error = provider.parse_error(StatusCode::TOO_MANY_REQUESTS, error_json);
        assert!(matches!(error, ProviderError::RateLimit(_)));
    }

    #[test]
    fn parse_error_detects_auth_failure() {
        let provider = AnthropicProvider::new("test-key".to_string());
        let error_json = r#"{"error": {"type": "authentication_error", "message": "Invalid API key"}}"#;
        let error = provider.parse_error(StatusCode::UNAUTHORIZED, error_json);
        assert!(matches!(error, ProviderError::Authentication(_)));
    }
}
