// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed configuration surface for the orchestration core.
//!
//! Mirrors the environment variables listed in the external-interfaces
//! section of the design: routing strategy, fallback/local-first flags,
//! provider credentials, encryption backend selection, and the
//! integration-façade polling/timeout knobs. Nothing here reads the
//! environment implicitly at call sites elsewhere; callers construct one
//! `OrchestratorConfig` and pass it down explicitly.

use crate::router::RoutingStrategy;
use std::collections::HashMap;
use std::time::Duration;

/// Which encryption backend the secret engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionBackendKind {
    SymmetricToken,
    CloudKms,
    TransitKms,
}

/// Process-wide configuration for the orchestration core.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub llm_routing_strategy: RoutingStrategy,
    pub llm_enable_fallback: bool,
    pub llm_prefer_local: bool,
    pub provider_base_urls: HashMap<String, String>,
    pub encryption_backend: EncryptionBackendKind,
    pub integration_poll_interval: Duration,
    pub integration_timeout: Duration,
    pub default_workflow_timeout: Duration,
    pub default_max_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            llm_routing_strategy: RoutingStrategy::Balanced,
            llm_enable_fallback: true,
            llm_prefer_local: false,
            provider_base_urls: HashMap::new(),
            encryption_backend: EncryptionBackendKind::SymmetricToken,
            integration_poll_interval: Duration::from_secs(2),
            integration_timeout: Duration::from_secs(3600),
            default_workflow_timeout: Duration::from_secs(3600),
            default_max_retries: 3,
        }
    }
}

impl OrchestratorConfig {
    /// Builds a config from process environment variables, falling back to
    /// [`Default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(strategy) = std::env::var("LLM_ROUTING_STRATEGY") {
            if let Some(parsed) = RoutingStrategy::from_str_loose(&strategy) {
                config.llm_routing_strategy = parsed;
            }
        }

        if let Ok(val) = std::env::var("LLM_ENABLE_FALLBACK") {
            config.llm_enable_fallback = parse_bool(&val, config.llm_enable_fallback);
        }

        if let Ok(val) = std::env::var("LLM_PREFER_LOCAL") {
            config.llm_prefer_local = parse_bool(&val, config.llm_prefer_local);
        }

        for provider in ["OPENAI", "ANTHROPIC", "MISTRAL", "TOGETHER", "OPENROUTER", "OLLAMA"] {
            let key = format!("{provider}_BASE_URL");
            if let Ok(url) = std::env::var(&key) {
                config
                    .provider_base_urls
                    .insert(provider.to_lowercase(), url);
            }
        }

        if let Ok(backend) = std::env::var("ENCRYPTION_BACKEND") {
            config.encryption_backend = match backend.to_lowercase().as_str() {
                "cloud_kms" | "aws_kms" => EncryptionBackendKind::CloudKms,
                "transit_kms" | "vault" => EncryptionBackendKind::TransitKms,
                _ => EncryptionBackendKind::SymmetricToken,
            };
        }

        if let Ok(val) = std::env::var("INTEGRATION_POLL_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.integration_poll_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("INTEGRATION_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.integration_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("WORKFLOW_DEFAULT_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.default_workflow_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("WORKFLOW_DEFAULT_MAX_RETRIES") {
            if let Ok(n) = val.parse::<u32>() {
                config.default_max_retries = n;
            }
        }

        config
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = OrchestratorConfig::default();
        assert!(config.llm_enable_fallback);
        assert!(!config.llm_prefer_local);
        assert_eq!(config.default_max_retries, 3);
    }

    #[test]
    fn parse_bool_falls_back_on_garbage() {
        assert!(parse_bool("definitely-not-a-bool", true));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("YES", false));
    }
}
