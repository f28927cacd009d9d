// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama provider implementation.
//!
//! Ollama runs models locally behind a plain HTTP API with no API key and
//! no usage-based cost (the registry prices every Ollama model at zero).
//! The `/api/generate` response shape differs from the OpenAI-style chat
//! completion envelope the other adapters speak.

use crate::traits::{GenerateParams, LLMProvider, LLMResponse, ModelCapabilities, ProviderError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use llm_orchestrator_core::registry::ModelRegistry;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "ollama";

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    options: GenerateOptions,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    done_reason: Option<String>,
}

impl OllamaProvider {
    fn convert_reqwest_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: "request timed out".to_string(),
            }
        } else if err.is_connect() {
            ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: "could not connect to ollama daemon".to_string(),
            }
        } else {
            ProviderError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("failed to build reqwest client");

        Self { client, base_url }
    }

    pub fn from_env() -> Self {
        match std::env::var("OLLAMA_BASE_URL") {
            Ok(base_url) => Self::with_base_url(base_url),
            Err(_) => Self::new(),
        }
    }

    fn to_ollama_request(&self, prompt: &str, params: &GenerateParams) -> GenerateRequest {
        let system = params.extra.get("system").and_then(|v| v.as_str()).map(String::from);
        GenerateRequest {
            model: params.model.clone().unwrap_or_else(|| "llama2".to_string()),
            prompt: prompt.to_string(),
            system,
            options: GenerateOptions { temperature: params.temperature, num_predict: params.max_tokens },
            stream: false,
        }
    }

    fn parse_error(&self, status: StatusCode, body: &str) -> ProviderError {
        ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: format!("[{}] {}", status.as_u16(), body),
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<LLMResponse, ProviderError> {
        let started = Instant::now();
        let model = params.model.clone().unwrap_or_else(|| "llama2".to_string());
        let request_body = self.to_ollama_request(prompt, params);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
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

        let generated: GenerateResponse = serde_json::from_str(&body).map_err(|e| ProviderError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            message: format!("malformed response: {e}"),
        })?;

        Ok(LLMResponse {
            content: generated.response,
            model,
            provider: PROVIDER_NAME.to_string(),
            tokens_prompt: generated.prompt_eval_count,
            tokens_completion: generated.eval_count,
            tokens_total: generated.prompt_eval_count + generated.eval_count,
            cost_usd: 0.0,
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason: generated.done_reason,
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

    async fn get_cost(&self, _model: &str, _prompt_tokens: u32, _completion_tokens: u32) -> f64 {
        0.0
    }

    async fn get_latency_estimate(&self, model: &str) -> u64 {
        ModelRegistry::get_model_config(PROVIDER_NAME, model).map(|c| c.latency_estimate_ms).unwrap_or(6000)
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
        true
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_creation_defaults_to_localhost() {
        let provider = OllamaProvider::new();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn cost_is_always_zero() {
        let provider = OllamaProvider::new();
        assert!(provider.is_available());
    }

    #[test]
    fn request_builder_defaults_to_llama2() {
        let provider = OllamaProvider::new();
        let params = GenerateParams::default();
        let request = provider.to_ollama_request("hi", &params);
        assert_eq!(request.model, "llama2");
        assert!(!request.stream);
    }

    #[tokio::test]
    async fn get_cost_is_zero_regardless_of_tokens() {
        let provider = OllamaProvider::new();
        assert_eq!(provider.get_cost("llama2", 1000, 1000).await, 0.0);
    }
}
