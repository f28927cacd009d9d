// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intelligent routing across registered LLM providers: strategy-driven
//! selection, canonical fallback chains, and per-provider usage accounting.

use crate::error::RouterError;
use crate::providers::ProviderRef;
use crate::registry::{ModelConfig, ModelRegistry};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strategy used to pick a provider/model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    CostOptimized,
    LatencyOptimized,
    QualityOptimized,
    LocalFirst,
    CapabilityMatch,
    Balanced,
}

impl RoutingStrategy {
    /// Parses a strategy from loose, case-insensitive input such as an
    /// environment variable value. Returns `None` on anything unrecognized
    /// rather than guessing.
    pub fn from_str_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "cost_optimized" | "cost-optimized" | "cost" => Some(Self::CostOptimized),
            "latency_optimized" | "latency-optimized" | "latency" => Some(Self::LatencyOptimized),
            "quality_optimized" | "quality-optimized" | "quality" => Some(Self::QualityOptimized),
            "local_first" | "local-first" | "local" => Some(Self::LocalFirst),
            "capability_match" | "capability-match" | "capability" => Some(Self::CapabilityMatch),
            "balanced" => Some(Self::Balanced),
            _ => None,
        }
    }

    /// Maps XS/S/M/L/XL task-complexity labels onto a default strategy.
    pub fn from_task_complexity(complexity: &str, _task_type: Option<&str>) -> Self {
        match complexity {
            "XS" | "S" => Self::CostOptimized,
            "M" => Self::Balanced,
            "L" | "XL" => Self::QualityOptimized,
            _ => Self::Balanced,
        }
    }
}

/// Canonical (provider, model) fallback chains, mirroring each routing
/// strategy's preferred ordering.
pub struct FallbackChain;

impl FallbackChain {
    pub fn high_quality() -> Vec<(&'static str, &'static str)> {
        vec![
            ("openai", "gpt-4"),
            ("anthropic", "claude-3-opus"),
            ("mistral", "mistral-large"),
            ("together", "meta-llama/llama-2-70b-chat-hf"),
        ]
    }

    pub fn cost_optimized() -> Vec<(&'static str, &'static str)> {
        vec![
            ("openai", "gpt-3.5-turbo"),
            ("anthropic", "claude-3-haiku"),
            ("mistral", "mistral-tiny"),
            ("together", "mistralai/mistral-7b-instruct-v0.2"),
            ("ollama", "mistral"),
        ]
    }

    pub fn fast_latency() -> Vec<(&'static str, &'static str)> {
        vec![
            ("openai", "gpt-3.5-turbo"),
            ("anthropic", "claude-3-haiku"),
            ("mistral", "mistral-small"),
            ("ollama", "mistral"),
        ]
    }

    pub fn local_only() -> Vec<(&'static str, &'static str)> {
        vec![("ollama", "mistral"), ("ollama", "llama2"), ("ollama", "codellama")]
    }

    pub fn code_generation() -> Vec<(&'static str, &'static str)> {
        vec![
            ("openai", "gpt-4"),
            ("anthropic", "claude-3-sonnet"),
            ("together", "codellama/codellama-34b-instruct-hf"),
            ("ollama", "codellama"),
        ]
    }

    pub fn long_context() -> Vec<(&'static str, &'static str)> {
        vec![
            ("anthropic", "claude-3-sonnet"),
            ("anthropic", "claude-3-haiku"),
            ("openai", "gpt-4-turbo"),
            ("mistral", "mistral-medium"),
        ]
    }

    pub fn balanced() -> Vec<(&'static str, &'static str)> {
        vec![
            ("openai", "gpt-3.5-turbo"),
            ("anthropic", "claude-3-sonnet"),
            ("mistral", "mistral-medium"),
            ("together", "mistralai/mistral-7b-instruct-v0.2"),
            ("ollama", "mistral"),
        ]
    }

    fn for_strategy(strategy: RoutingStrategy) -> Vec<(&'static str, &'static str)> {
        match strategy {
            RoutingStrategy::CostOptimized => Self::cost_optimized(),
            RoutingStrategy::LatencyOptimized => Self::fast_latency(),
            RoutingStrategy::QualityOptimized => Self::high_quality(),
            RoutingStrategy::LocalFirst => Self::local_only(),
            RoutingStrategy::CapabilityMatch | RoutingStrategy::Balanced => Self::balanced(),
        }
    }
}

/// Running total of calls, successes, failures, latency, and cost for one
/// provider/model pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_latency_ms: u64,
    pub total_cost_usd: f64,
}

/// Criteria considered when selecting a provider/model.
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub budget_remaining_usd: Option<f64>,
    pub latency_sensitive: bool,
    pub prefer_local: bool,
    pub required_capability: Option<String>,
    pub strategy: Option<RoutingStrategy>,
    pub task_complexity: Option<String>,
    pub task_type: Option<String>,
}

/// Routes requests across registered providers, tracks usage, and builds
/// fallback chains for the engine to walk on provider failure.
pub struct LLMRouter {
    providers: HashMap<String, ProviderRef>,
    default_strategy: RoutingStrategy,
    default_fallback_chain: Vec<(String, String)>,
    usage_stats: DashMap<String, UsageStats>,
}

impl LLMRouter {
    pub fn new(providers: HashMap<String, ProviderRef>, default_strategy: RoutingStrategy) -> Self {
        let default_fallback_chain = FallbackChain::balanced()
            .into_iter()
            .map(|(p, m)| (p.to_string(), m.to_string()))
            .collect();
        Self {
            providers,
            default_strategy,
            default_fallback_chain,
            usage_stats: DashMap::new(),
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: ProviderRef) {
        let name = name.into();
        tracing::info!(provider = %name, "registered LLM provider");
        self.providers.insert(name, provider);
    }

    pub fn get_provider(&self, name: &str) -> Option<ProviderRef> {
        self.providers.get(name).cloned()
    }

    fn available_providers(&self) -> HashMap<&str, &ProviderRef> {
        self.providers
            .iter()
            .filter(|(_, p)| p.is_available())
            .map(|(name, p)| (name.as_str(), p))
            .collect()
    }

    /// Picks a (provider, model) pair honoring the given criteria. Mirrors
    /// the strategy dispatch in the reference router one-to-one.
    pub fn select_provider(&self, criteria: &SelectionCriteria) -> Result<(String, String), RouterError> {
        if self.available_providers().is_empty() {
            return Err(RouterError::NoProviderAvailable);
        }

        let strategy = criteria.strategy.unwrap_or_else(|| {
            criteria
                .task_complexity
                .as_deref()
                .map(|c| RoutingStrategy::from_task_complexity(c, criteria.task_type.as_deref()))
                .unwrap_or(self.default_strategy)
        });

        tracing::info!(
            ?strategy,
            budget = ?criteria.budget_remaining_usd,
            latency_sensitive = criteria.latency_sensitive,
            prefer_local = criteria.prefer_local,
            capability = ?criteria.required_capability,
            "selecting LLM provider"
        );

        if strategy == RoutingStrategy::LocalFirst || criteria.prefer_local {
            return Ok(self.select_local_first(criteria.required_capability.as_deref()));
        }

        Ok(match strategy {
            RoutingStrategy::CostOptimized => self.select_cost_optimized(
                criteria.required_capability.as_deref(),
                !criteria.prefer_local,
            ),
            RoutingStrategy::LatencyOptimized => {
                self.select_latency_optimized(criteria.required_capability.as_deref(), criteria.budget_remaining_usd)
            }
            RoutingStrategy::QualityOptimized => {
                self.select_quality_optimized(criteria.required_capability.as_deref())
            }
            RoutingStrategy::CapabilityMatch => {
                self.select_capability_match(criteria.required_capability.as_deref())
            }
            _ => self.select_balanced(criteria.required_capability.as_deref()),
        })
    }

    fn select_local_first(&self, required_capability: Option<&str>) -> (String, String) {
        if self.providers.get("ollama").map(|p| p.is_available()).unwrap_or(false) {
            let models = ModelRegistry::find_models_by_capability(required_capability.unwrap_or("code"), None, None);
            if let Some(m) = models.into_iter().find(|m| m.provider == "ollama") {
                return ("ollama".to_string(), m.model);
            }
        }
        self.select_cost_optimized(required_capability, false)
    }

    fn select_cost_optimized(&self, required_capability: Option<&str>, exclude_local: bool) -> (String, String) {
        if let Some(config) = ModelRegistry::get_cheapest_model(required_capability, exclude_local) {
            if self.providers.contains_key(&config.provider) {
                return (config.provider, config.model);
            }
        }
        ("openai".to_string(), "gpt-3.5-turbo".to_string())
    }

    fn select_latency_optimized(&self, required_capability: Option<&str>, budget_remaining: Option<f64>) -> (String, String) {
        let max_cost = budget_remaining.map(|b| b / 1000.0);
        if let Some(config) = ModelRegistry::get_fastest_model(required_capability, max_cost) {
            if self.providers.contains_key(&config.provider) {
                return (config.provider, config.model);
            }
        }
        ("openai".to_string(), "gpt-3.5-turbo".to_string())
    }

    fn select_quality_optimized(&self, required_capability: Option<&str>) -> (String, String) {
        for (provider, model) in FallbackChain::high_quality() {
            if self.providers.get(provider).map(|p| p.is_available()).unwrap_or(false) {
                if let Some(cap) = required_capability {
                    if let Some(config) = ModelRegistry::get_model_config(provider, model) {
                        if config.has_capability(cap) {
                            return (provider.to_string(), model.to_string());
                        }
                    }
                } else {
                    return (provider.to_string(), model.to_string());
                }
            }
        }
        ("openai".to_string(), "gpt-4".to_string())
    }

    fn select_capability_match(&self, required_capability: Option<&str>) -> (String, String) {
        let Some(cap) = required_capability else {
            return ("openai".to_string(), "gpt-3.5-turbo".to_string());
        };
        for config in ModelRegistry::find_models_by_capability(cap, None, None) {
            if self.providers.contains_key(&config.provider) {
                return (config.provider, config.model);
            }
        }
        ("openai".to_string(), "gpt-3.5-turbo".to_string())
    }

    fn select_balanced(&self, required_capability: Option<&str>) -> (String, String) {
        for (provider, model) in FallbackChain::balanced() {
            if self.providers.get(provider).map(|p| p.is_available()).unwrap_or(false) {
                if let Some(cap) = required_capability {
                    if let Some(config) = ModelRegistry::get_model_config(provider, model) {
                        if config.has_capability(cap) {
                            return (provider.to_string(), model.to_string());
                        }
                    }
                } else {
                    return (provider.to_string(), model.to_string());
                }
            }
        }
        ("openai".to_string(), "gpt-3.5-turbo".to_string())
    }

    /// Builds the fallback chain for a primary pick, filtered by capability
    /// and availability, with the primary forced to the front.
    pub fn get_fallback_chain(
        &self,
        primary_provider: &str,
        primary_model: &str,
        strategy: Option<RoutingStrategy>,
        required_capability: Option<&str>,
    ) -> Vec<(String, String)> {
        let strategy = strategy.unwrap_or(self.default_strategy);
        let mut base_chain: Vec<(String, String)> = FallbackChain::for_strategy(strategy)
            .into_iter()
            .map(|(p, m)| (p.to_string(), m.to_string()))
            .collect();

        if base_chain.is_empty() {
            base_chain = self.default_fallback_chain.clone();
        }

        if let Some(cap) = required_capability {
            let filtered: Vec<(String, String)> = base_chain
                .iter()
                .filter(|(p, m)| {
                    ModelRegistry::get_model_config(p, m)
                        .map(|c| c.has_capability(cap))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            if !filtered.is_empty() {
                base_chain = filtered;
            }
        }

        let mut available_chain: Vec<(String, String)> = base_chain
            .into_iter()
            .filter(|(p, _)| self.providers.get(p).map(|pr| pr.is_available()).unwrap_or(false))
            .collect();

        let primary = (primary_provider.to_string(), primary_model.to_string());
        available_chain.retain(|entry| entry != &primary);
        available_chain.insert(0, primary);
        available_chain
    }

    /// Records the outcome of a single call against its provider/model key.
    pub fn track_usage(&self, provider: &str, model: &str, success: bool, latency_ms: u64, cost_usd: f64) {
        let key = format!("{provider}/{model}");
        let mut entry = self.usage_stats.entry(key).or_default();
        entry.total_calls += 1;
        if success {
            entry.successful_calls += 1;
        } else {
            entry.failed_calls += 1;
        }
        entry.total_latency_ms += latency_ms;
        entry.total_cost_usd += cost_usd;
    }

    /// Returns usage stats, optionally filtered to a single provider's
    /// `provider/model` keys by prefix match.
    pub fn get_usage_stats(&self, provider: Option<&str>) -> HashMap<String, UsageStats> {
        let prefix = provider.map(|p| format!("{p}/"));
        self.usage_stats
            .iter()
            .filter(|entry| prefix.as_ref().map(|pfx| entry.key().starts_with(pfx)).unwrap_or(true))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn model_config_for(&self, provider: &str, model: &str) -> Option<ModelConfig> {
        ModelRegistry::get_model_config(provider, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_loose_accepts_known_aliases() {
        assert_eq!(RoutingStrategy::from_str_loose("cost"), Some(RoutingStrategy::CostOptimized));
        assert_eq!(RoutingStrategy::from_str_loose("LOCAL_FIRST"), Some(RoutingStrategy::LocalFirst));
        assert_eq!(RoutingStrategy::from_str_loose("nonsense"), None);
    }

    #[test]
    fn from_task_complexity_maps_xs_to_cost_optimized() {
        assert_eq!(RoutingStrategy::from_task_complexity("XS", None), RoutingStrategy::CostOptimized);
        assert_eq!(RoutingStrategy::from_task_complexity("XL", None), RoutingStrategy::QualityOptimized);
    }

    #[test]
    fn select_provider_without_any_registered_provider_errors() {
        let router = LLMRouter::new(HashMap::new(), RoutingStrategy::Balanced);
        let result = router.select_provider(&SelectionCriteria::default());
        assert!(matches!(result, Err(RouterError::NoProviderAvailable)));
    }

    #[test]
    fn track_usage_accumulates_per_key() {
        let router = LLMRouter::new(HashMap::new(), RoutingStrategy::Balanced);
        router.track_usage("openai", "gpt-4", true, 100, 0.02);
        router.track_usage("openai", "gpt-4", false, 200, 0.01);
        let stats = router.get_usage_stats(Some("openai"));
        let entry = stats.get("openai/gpt-4").unwrap();
        assert_eq!(entry.total_calls, 2);
        assert_eq!(entry.successful_calls, 1);
        assert_eq!(entry.failed_calls, 1);
        assert_eq!(entry.total_latency_ms, 300);
    }

    #[test]
    fn fallback_chain_forces_primary_to_front() {
        let router = LLMRouter::new(HashMap::new(), RoutingStrategy::Balanced);
        let chain = router.get_fallback_chain("anthropic", "claude-3-haiku", Some(RoutingStrategy::Balanced), None);
        // No providers are registered/available, so availability filtering drops
        // everything except the primary, which is always force-inserted.
        assert_eq!(chain.first().unwrap(), &("anthropic".to_string(), "claude-3-haiku".to_string()));
    }
}
