// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Facade that ties provider selection, fallback, and usage tracking into a
//! single `generate` call, so the workflow engine never talks to a provider
//! or the router directly.

use crate::providers::{GenerateParams, LLMResponse, ProviderError, ProviderRef};
use crate::router::{LLMRouter, SelectionCriteria};
use std::collections::HashMap;
use std::time::Instant;

/// Extra routing/accounting context threaded through a single `generate`
/// call but not part of the wire request itself.
#[derive(Debug, Clone, Default)]
pub struct GenerateContext {
    pub workspace_id: Option<String>,
    pub execution_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub task_type: Option<String>,
    pub budget_remaining_usd: Option<f64>,
    pub required_capability: Option<String>,
    pub enable_fallback: Option<bool>,
}

/// Records a completed LLM call for cost accounting. Implemented by the
/// persistence layer; the core crate only depends on the trait.
pub trait CostLogger: Send + Sync {
    fn log_llm_call(
        &self,
        workspace_id: &str,
        execution_id: &str,
        provider: &str,
        model: &str,
        response: &LLMResponse,
    );
}

/// Unifies provider selection, fallback, and usage/cost tracking behind one
/// `generate` call.
pub struct LLMService {
    providers: HashMap<String, ProviderRef>,
    router: LLMRouter,
    enable_fallback_default: bool,
    cost_logger: Option<Box<dyn CostLogger>>,
}

impl LLMService {
    pub fn new(providers: HashMap<String, ProviderRef>, router: LLMRouter, enable_fallback_default: bool) -> Self {
        Self {
            providers,
            router,
            enable_fallback_default,
            cost_logger: None,
        }
    }

    pub fn with_cost_logger(mut self, logger: Box<dyn CostLogger>) -> Self {
        self.cost_logger = Some(logger);
        self
    }

    pub fn router(&self) -> &LLMRouter {
        &self.router
    }

    /// Generates a completion, selecting a provider/model via the router
    /// unless both are pinned in `context`, then walking the fallback chain
    /// on a `ProviderError` (never on other failure classes).
    pub async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
        context: &GenerateContext,
    ) -> Result<LLMResponse, ProviderError> {
        let enable_fallback = context.enable_fallback.unwrap_or(self.enable_fallback_default);

        if let (Some(provider), Some(model)) = (&context.provider, &context.model) {
            return self.generate_with_provider(provider, model, prompt, params, context).await;
        }

        let criteria = SelectionCriteria {
            budget_remaining_usd: context.budget_remaining_usd,
            required_capability: context.required_capability.clone(),
            task_type: context.task_type.clone(),
            ..Default::default()
        };
        let (provider, model) = self
            .router
            .select_provider(&criteria)
            .map_err(|_| ProviderError::Unavailable("no provider selected".to_string()))?;

        match self.generate_with_provider(&provider, &model, prompt, params, context).await {
            Ok(response) => Ok(response),
            Err(err) => {
                tracing::warn!(provider = %provider, model = %model, error = %err, "primary provider failed");
                if !enable_fallback {
                    return Err(err);
                }

                let chain = self.router.get_fallback_chain(
                    &provider,
                    &model,
                    None,
                    context.required_capability.as_deref(),
                );

                let mut tried = vec![format!("{provider}/{model}")];
                for (fb_provider, fb_model) in chain.into_iter().skip(1) {
                    tried.push(format!("{fb_provider}/{fb_model}"));
                    tracing::info!(provider = %fb_provider, model = %fb_model, "trying fallback provider");
                    match self.generate_with_provider(&fb_provider, &fb_model, prompt, params, context).await {
                        Ok(response) => return Ok(response),
                        Err(fallback_err) => {
                            tracing::warn!(provider = %fb_provider, model = %fb_model, error = %fallback_err, "fallback provider failed");
                            continue;
                        }
                    }
                }

                Err(ProviderError::RequestFailed {
                    provider: "fallback_chain".to_string(),
                    message: format!("all providers failed. tried: {}", tried.join(", ")),
                })
            }
        }
    }

    async fn generate_with_provider(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        params: &GenerateParams,
        context: &GenerateContext,
    ) -> Result<LLMResponse, ProviderError> {
        let provider_instance = self
            .providers
            .get(provider)
            .ok_or_else(|| ProviderError::Unavailable(provider.to_string()))?;

        let mut params = params.clone();
        params.model = Some(model.to_string());

        let started = Instant::now();
        let result = provider_instance.generate(prompt, &params).await;

        match result {
            Ok(response) => {
                self.router.track_usage(
                    provider,
                    model,
                    true,
                    response.latency_ms,
                    response.cost_usd,
                );

                // Cost is logged exactly once, here, only on success.
                if let (Some(logger), Some(ws), Some(exec)) =
                    (&self.cost_logger, &context.workspace_id, &context.execution_id)
                {
                    logger.log_llm_call(ws, exec, provider, model, &response);
                }

                tracing::info!(
                    provider = %provider,
                    model = %model,
                    tokens_total = response.tokens_total,
                    cost_usd = response.cost_usd,
                    latency_ms = response.latency_ms,
                    "LLM generation successful"
                );

                Ok(response)
            }
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.router.track_usage(provider, model, false, elapsed_ms, 0.0);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RoutingStrategy;

    #[tokio::test]
    async fn generate_errors_cleanly_when_no_providers_registered() {
        let router = LLMRouter::new(HashMap::new(), RoutingStrategy::Balanced);
        let service = LLMService::new(HashMap::new(), router, true);
        let result = service
            .generate("hello", &GenerateParams::default(), &GenerateContext::default())
            .await;
        assert!(result.is_err());
    }
}
