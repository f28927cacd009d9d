// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret & encryption service: workspace-scoped secret CRUD, rotation,
//! and a pluggable encryption backend.

pub mod encryption;
pub mod manager;
pub mod secret;

pub use encryption::{CloudKmsBackend, EncryptionBackend, EncryptionBackendRef, SymmetricTokenBackend, TransitKmsBackend};
pub use manager::{CreateSecretInput, SecretEngine, SecretStore, UpdateSecretInput, WorkspaceDirectory};
pub use secret::{RotationPolicy, Secret, SecretAction, SecretAudit, SecretFilter, SecretMetadata};

pub use llm_orchestrator_core::error::{EncryptionError, SecretError};
