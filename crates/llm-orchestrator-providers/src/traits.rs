// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider trait definitions (re-exported from core).

pub use llm_orchestrator_core::providers::{
    GenerateParams, LLMProvider, LLMResponse, ModelCapabilities, ProviderError, ProviderRef,
};
