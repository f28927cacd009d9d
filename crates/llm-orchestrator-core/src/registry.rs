// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static catalogue of known provider/model combinations: pricing,
//! capabilities, and latency estimates used by the router's
//! cost/latency/capability-matching strategies.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Static configuration for a single provider/model pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub context_window: u32,
    pub cost_per_1k_prompt: f64,
    pub cost_per_1k_completion: f64,
    pub latency_estimate_ms: u64,
    pub capabilities: Vec<&'static str>,
}

impl ModelConfig {
    pub fn total_cost_per_1k(&self) -> f64 {
        self.cost_per_1k_prompt + self.cost_per_1k_completion
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| *c == capability)
    }
}

struct RawEntry {
    model: &'static str,
    max_tokens: u32,
    context_window: u32,
    cost_per_1k_prompt: f64,
    cost_per_1k_completion: f64,
    latency_estimate_ms: u64,
    capabilities: &'static [&'static str],
}

macro_rules! entry {
    ($model:expr, $max_tokens:expr, $ctx:expr, $cp:expr, $cc:expr, $lat:expr, [$($cap:expr),* $(,)?]) => {
        RawEntry {
            model: $model,
            max_tokens: $max_tokens,
            context_window: $ctx,
            cost_per_1k_prompt: $cp,
            cost_per_1k_completion: $cc,
            latency_estimate_ms: $lat,
            capabilities: &[$($cap),*],
        }
    };
}

fn catalogue() -> Vec<(&'static str, Vec<RawEntry>)> {
    vec![
        (
            "openai",
            vec![
                entry!("gpt-4", 8192, 8192, 0.03, 0.06, 1000, ["code", "reasoning", "analysis", "function_calling"]),
                entry!("gpt-4-turbo", 4096, 128_000, 0.01, 0.03, 800, ["code", "reasoning", "analysis", "function_calling", "vision"]),
                entry!("gpt-4-32k", 32_768, 32_768, 0.06, 0.12, 1500, ["code", "reasoning", "analysis", "long_context"]),
                entry!("gpt-3.5-turbo", 4096, 16_385, 0.0005, 0.0015, 500, ["code", "simple_analysis", "function_calling"]),
                entry!("gpt-3.5-turbo-16k", 16_384, 16_384, 0.001, 0.002, 600, ["code", "simple_analysis", "long_context"]),
            ],
        ),
        (
            "anthropic",
            vec![
                entry!("claude-3-opus", 4096, 200_000, 0.015, 0.075, 1500, ["code", "reasoning", "analysis", "long_context", "vision"]),
                entry!("claude-3-sonnet", 4096, 200_000, 0.003, 0.015, 800, ["code", "reasoning", "analysis", "long_context"]),
                entry!("claude-3-haiku", 4096, 200_000, 0.00025, 0.00125, 500, ["code", "simple_analysis", "long_context"]),
                entry!("claude-2.1", 4096, 200_000, 0.008, 0.024, 1000, ["code", "reasoning", "analysis", "long_context"]),
            ],
        ),
        (
            "mistral",
            vec![
                entry!("mistral-large", 4096, 32_768, 0.008, 0.024, 1200, ["code", "reasoning", "analysis"]),
                entry!("mistral-medium", 4096, 32_768, 0.0027, 0.0081, 1000, ["code", "analysis"]),
                entry!("mistral-small", 4096, 32_768, 0.002, 0.006, 800, ["code", "simple_analysis"]),
                entry!("mistral-tiny", 4096, 32_768, 0.00025, 0.00075, 600, ["code"]),
            ],
        ),
        (
            "ollama",
            vec![
                entry!("llama2", 4096, 4096, 0.0, 0.0, 5000, ["code", "simple_analysis"]),
                entry!("llama2:13b", 4096, 4096, 0.0, 0.0, 8000, ["code", "analysis"]),
                entry!("llama2:70b", 4096, 4096, 0.0, 0.0, 15_000, ["code", "reasoning", "analysis"]),
                entry!("mistral", 8192, 32_768, 0.0, 0.0, 4000, ["code", "analysis"]),
                entry!("codellama", 4096, 16_384, 0.0, 0.0, 6000, ["code"]),
                entry!("codellama:13b", 4096, 16_384, 0.0, 0.0, 9000, ["code"]),
                entry!("qwen3-coder:30b", 8192, 32_768, 0.0, 0.0, 12_000, ["code", "analysis", "reasoning"]),
            ],
        ),
        (
            "together",
            vec![
                entry!("mistralai/mistral-7b-instruct-v0.2", 8192, 32_768, 0.0002, 0.0002, 1500, ["code", "analysis"]),
                entry!("codellama/codellama-34b-instruct-hf", 4096, 16_384, 0.000776, 0.000776, 2000, ["code"]),
                entry!("meta-llama/llama-2-70b-chat-hf", 4096, 4096, 0.0009, 0.0009, 2500, ["code", "reasoning", "analysis"]),
            ],
        ),
    ]
}

fn models() -> &'static HashMap<(String, String), ModelConfig> {
    static MODELS: OnceLock<HashMap<(String, String), ModelConfig>> = OnceLock::new();
    MODELS.get_or_init(|| {
        let mut map = HashMap::new();
        for (provider, entries) in catalogue() {
            for e in entries {
                map.insert(
                    (provider.to_string(), e.model.to_string()),
                    ModelConfig {
                        provider: provider.to_string(),
                        model: e.model.to_string(),
                        max_tokens: e.max_tokens,
                        context_window: e.context_window,
                        cost_per_1k_prompt: e.cost_per_1k_prompt,
                        cost_per_1k_completion: e.cost_per_1k_completion,
                        latency_estimate_ms: e.latency_estimate_ms,
                        capabilities: e.capabilities.to_vec(),
                    },
                );
            }
        }
        map
    })
}

/// Read-only lookup over the embedded model catalogue.
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn get_model_config(provider: &str, model: &str) -> Option<ModelConfig> {
        models()
            .get(&(provider.to_lowercase(), model.to_lowercase()))
            .cloned()
    }

    pub fn list_models(provider: Option<&str>) -> Vec<String> {
        models()
            .keys()
            .filter(|(p, _)| provider.map(|want| want.eq_ignore_ascii_case(p)).unwrap_or(true))
            .map(|(p, m)| format!("{p}/{m}"))
            .collect()
    }

    pub fn find_models_by_capability(
        capability: &str,
        max_cost_per_1k: Option<f64>,
        max_latency_ms: Option<u64>,
    ) -> Vec<ModelConfig> {
        models()
            .values()
            .filter(|c| c.has_capability(capability))
            .filter(|c| max_cost_per_1k.map(|max| c.total_cost_per_1k() <= max).unwrap_or(true))
            .filter(|c| max_latency_ms.map(|max| c.latency_estimate_ms <= max).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn get_cheapest_model(capability: Option<&str>, exclude_local: bool) -> Option<ModelConfig> {
        models()
            .values()
            .filter(|c| !(exclude_local && c.provider == "ollama"))
            .filter(|c| capability.map(|cap| c.has_capability(cap)).unwrap_or(true))
            .min_by(|a, b| {
                a.total_cost_per_1k()
                    .partial_cmp(&b.total_cost_per_1k())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    pub fn get_fastest_model(capability: Option<&str>, max_cost_per_1k: Option<f64>) -> Option<ModelConfig> {
        models()
            .values()
            .filter(|c| capability.map(|cap| c.has_capability(cap)).unwrap_or(true))
            .filter(|c| max_cost_per_1k.map(|max| c.total_cost_per_1k() <= max).unwrap_or(true))
            .min_by_key(|c| c.latency_estimate_ms)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_model_config_is_case_insensitive() {
        let config = ModelRegistry::get_model_config("OpenAI", "GPT-4").unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.max_tokens, 8192);
    }

    #[test]
    fn cheapest_model_excludes_local_when_asked() {
        let cheapest = ModelRegistry::get_cheapest_model(None, true).unwrap();
        assert_ne!(cheapest.provider, "ollama");
    }

    #[test]
    fn cheapest_model_without_exclusion_is_free_local_model() {
        let cheapest = ModelRegistry::get_cheapest_model(None, false).unwrap();
        assert_eq!(cheapest.provider, "ollama");
        assert_eq!(cheapest.total_cost_per_1k(), 0.0);
    }

    #[test]
    fn find_models_by_capability_filters_correctly() {
        let models = ModelRegistry::find_models_by_capability("vision", None, None);
        assert!(models.iter().all(|m| m.has_capability("vision")));
        assert!(!models.is_empty());
    }

    #[test]
    fn fastest_model_respects_cost_ceiling() {
        let fastest = ModelRegistry::get_fastest_model(None, Some(0.0)).unwrap();
        assert_eq!(fastest.total_cost_per_1k(), 0.0);
    }
}
