// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret engine: workspace-scoped CRUD, rotation, and audit for encrypted
//! secrets.
//!
//! The engine never talks to persistence directly -- it asks a
//! `WorkspaceDirectory` collaborator whether a workspace exists and a
//! `SecretStore` collaborator to read/write secret rows, the same seam
//! pattern the orchestration core uses for `AgentDirectory`. Plaintext
//! values never cross the `SecretMetadata` boundary and are never logged.

use crate::encryption::EncryptionBackendRef;
use crate::secret::{RotationPolicy, Secret, SecretFilter, SecretMetadata};
use chrono::Utc;
use llm_orchestrator_core::error::SecretError;
use std::collections::HashMap;
use uuid::Uuid;

/// Collaborator that knows whether a workspace exists. Implemented by the
/// persistence layer.
pub trait WorkspaceDirectory: Send + Sync {
    fn exists(&self, workspace_id: &str) -> bool;
}

/// Collaborator that stores and retrieves secret rows. Implemented by the
/// persistence layer; the engine only depends on the trait.
pub trait SecretStore: Send + Sync {
    fn find_active_by_name(&self, workspace_id: &str, name: &str) -> Option<Secret>;
    fn get(&self, id: &str) -> Option<Secret>;
    fn insert(&self, secret: Secret);
    fn update(&self, secret: Secret);
    fn list(&self, workspace_id: &str) -> Vec<Secret>;
}

/// Inputs for [`SecretEngine::create`].
pub struct CreateSecretInput {
    pub workspace_id: String,
    pub name: String,
    pub secret_type: String,
    pub plaintext: String,
    pub rotation_policy: RotationPolicy,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_by: String,
}

/// Inputs for [`SecretEngine::update`]. `None` fields are left unchanged.
#[derive(Default)]
pub struct UpdateSecretInput {
    pub plaintext: Option<String>,
    pub rotation_policy: Option<RotationPolicy>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

pub struct SecretEngine {
    store: Box<dyn SecretStore>,
    workspaces: Box<dyn WorkspaceDirectory>,
    encryption: EncryptionBackendRef,
    audit: Option<std::sync::Arc<llm_orchestrator_audit::AuditLogger>>,
}

impl SecretEngine {
    pub fn new(
        store: Box<dyn SecretStore>,
        workspaces: Box<dyn WorkspaceDirectory>,
        encryption: EncryptionBackendRef,
    ) -> Self {
        Self { store, workspaces, encryption, audit: None }
    }

    pub fn with_audit_logger(mut self, audit: std::sync::Arc<llm_orchestrator_audit::AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn audit_create(&self, secret: &Secret) {
        if let Some(audit) = &self.audit {
            let _ = audit
                .log_secret_create(
                    &secret.id,
                    &secret.created_by,
                    serde_json::json!({
                        "name": secret.name,
                        "secret_type": secret.secret_type,
                        "rotation_policy": secret.rotation_policy,
                    }),
                )
                .await;
        }
    }

    async fn audit_access(&self, secret_id: &str, actor: &str) {
        if let Some(audit) = &self.audit {
            let _ = audit.log_secret_access(secret_id, actor, Utc::now()).await;
        }
    }

    async fn audit_update(&self, secret_id: &str, actor: &str, changed_fields: Vec<String>) {
        if let Some(audit) = &self.audit {
            let _ = audit.log_secret_update(secret_id, actor, changed_fields).await;
        }
    }

    async fn audit_rotate(&self, secret_id: &str, actor: &str, previous_rotated_at: Option<chrono::DateTime<Utc>>) {
        if let Some(audit) = &self.audit {
            let _ = audit.log_secret_rotate(secret_id, actor, previous_rotated_at).await;
        }
    }

    async fn audit_delete(&self, secret_id: &str, actor: &str) {
        if let Some(audit) = &self.audit {
            let _ = audit.log_secret_delete(secret_id, actor).await;
        }
    }

    pub async fn create(&self, input: CreateSecretInput) -> Result<SecretMetadata, SecretError> {
        if !self.workspaces.exists(&input.workspace_id) {
            return Err(SecretError::WorkspaceNotFound(input.workspace_id));
        }
        if self.store.find_active_by_name(&input.workspace_id, &input.name).is_some() {
            return Err(SecretError::DuplicateName(input.name));
        }

        let encrypted_value = self.encryption.encrypt(&input.plaintext).await?;
        let now = Utc::now();
        let secret = Secret {
            id: Uuid::new_v4().to_string(),
            workspace_id: input.workspace_id,
            name: input.name,
            secret_type: input.secret_type,
            encrypted_value,
            rotation_policy: input.rotation_policy,
            last_rotated_at: now,
            rotation_due_at: input.rotation_policy.due_from(now),
            tags: input.tags,
            metadata: input.metadata,
            is_active: true,
            created_at: now,
            created_by: input.created_by.clone(),
            updated_at: now,
            updated_by: input.created_by,
        };

        self.store.insert(secret.clone());
        self.audit_create(&secret).await;
        tracing::info!(secret_id = %secret.id, workspace_id = %secret.workspace_id, "secret created");
        Ok(secret.to_metadata())
    }

    pub fn get_metadata(&self, workspace_id: &str, secret_id: &str) -> Result<SecretMetadata, SecretError> {
        let secret = self.lookup_active(workspace_id, secret_id)?;
        Ok(secret.to_metadata())
    }

    pub async fn get_value(&self, workspace_id: &str, secret_id: &str, actor: &str) -> Result<String, SecretError> {
        let secret = self.lookup_active(workspace_id, secret_id)?;
        let plaintext = self.encryption.decrypt(&secret.encrypted_value).await?;
        self.audit_access(secret_id, actor).await;
        Ok(plaintext)
    }

    pub async fn update(
        &self,
        workspace_id: &str,
        secret_id: &str,
        input: UpdateSecretInput,
        actor: &str,
    ) -> Result<SecretMetadata, SecretError> {
        let mut secret = self.lookup_active(workspace_id, secret_id)?;
        let mut changed_fields = Vec::new();

        if let Some(plaintext) = input.plaintext {
            secret.encrypted_value = self.encryption.encrypt(&plaintext).await?;
            secret.last_rotated_at = Utc::now();
            changed_fields.push("value".to_string());
            changed_fields.push("last_rotated_at".to_string());
        }
        if let Some(policy) = input.rotation_policy {
            secret.rotation_policy = policy;
            changed_fields.push("rotation_policy".to_string());
        }
        if let Some(tags) = input.tags {
            secret.tags = tags;
            changed_fields.push("tags".to_string());
        }
        if let Some(metadata) = input.metadata {
            secret.metadata = metadata;
            changed_fields.push("metadata".to_string());
        }
        if changed_fields.iter().any(|f| f == "value" || f == "rotation_policy") {
            secret.rotation_due_at = secret.rotation_policy.due_from(secret.last_rotated_at);
            changed_fields.push("rotation_due_at".to_string());
        }

        secret.updated_at = Utc::now();
        secret.updated_by = actor.to_string();
        self.store.update(secret.clone());
        self.audit_update(secret_id, actor, changed_fields).await;
        tracing::info!(secret_id = %secret.id, "secret updated");
        Ok(secret.to_metadata())
    }

    /// Rotates a secret's value. The audited `previous_rotated_at` is
    /// captured before the update is applied, not read back from the
    /// persisted row afterward -- rotation always moves `last_rotated_at`
    /// forward, so a post-hoc read would just return the new timestamp.
    pub async fn rotate(
        &self,
        workspace_id: &str,
        secret_id: &str,
        new_plaintext: String,
        actor: &str,
    ) -> Result<SecretMetadata, SecretError> {
        let secret = self.lookup_active(workspace_id, secret_id)?;
        let previous_rotated_at = Some(secret.last_rotated_at);

        let metadata = self
            .update(
                workspace_id,
                secret_id,
                UpdateSecretInput { plaintext: Some(new_plaintext), ..Default::default() },
                actor,
            )
            .await?;

        self.audit_rotate(secret_id, actor, previous_rotated_at).await;
        Ok(metadata)
    }

    pub async fn delete(&self, workspace_id: &str, secret_id: &str, actor: &str) -> Result<(), SecretError> {
        let mut secret = self.lookup_active(workspace_id, secret_id)?;
        secret.is_active = false;
        secret.updated_at = Utc::now();
        secret.updated_by = actor.to_string();
        self.store.update(secret);
        self.audit_delete(secret_id, actor).await;
        tracing::info!(secret_id = %secret_id, "secret deleted");
        Ok(())
    }

    pub fn list(&self, workspace_id: &str, filter: &SecretFilter) -> Vec<SecretMetadata> {
        let now = Utc::now();
        self.store
            .list(workspace_id)
            .into_iter()
            .filter(|secret| filter.matches(secret, now))
            .map(|secret| secret.to_metadata())
            .collect()
    }

    pub fn rotation_due(&self, workspace_id: &str, days_ahead: i64) -> Vec<SecretMetadata> {
        let filter = SecretFilter { is_active: Some(true), rotation_due_within_days: Some(days_ahead), ..Default::default() };
        self.list(workspace_id, &filter)
    }

    fn lookup_active(&self, workspace_id: &str, secret_id: &str) -> Result<Secret, SecretError> {
        let secret = self.store.get(secret_id).ok_or_else(|| SecretError::NotFound(secret_id.to_string()))?;
        if secret.workspace_id != workspace_id || !secret.is_active {
            return Err(SecretError::NotFound(secret_id.to_string()));
        }
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::SymmetricTokenBackend;
    use parking_lot::Mutex;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;

    struct InMemoryStore {
        rows: Mutex<StdHashMap<String, Secret>>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self { rows: Mutex::new(StdHashMap::new()) }
        }
    }

    impl SecretStore for InMemoryStore {
        fn find_active_by_name(&self, workspace_id: &str, name: &str) -> Option<Secret> {
            self.rows.lock().values().find(|s| s.workspace_id == workspace_id && s.name == name && s.is_active).cloned()
        }

        fn get(&self, id: &str) -> Option<Secret> {
            self.rows.lock().get(id).cloned()
        }

        fn insert(&self, secret: Secret) {
            self.rows.lock().insert(secret.id.clone(), secret);
        }

        fn update(&self, secret: Secret) {
            self.rows.lock().insert(secret.id.clone(), secret);
        }

        fn list(&self, workspace_id: &str) -> Vec<Secret> {
            self.rows.lock().values().filter(|s| s.workspace_id == workspace_id).cloned().collect()
        }
    }

    struct AllowAllWorkspaces;
    impl WorkspaceDirectory for AllowAllWorkspaces {
        fn exists(&self, _workspace_id: &str) -> bool {
            true
        }
    }

    fn engine() -> SecretEngine {
        SecretEngine::new(Box::new(InMemoryStore::new()), Box::new(AllowAllWorkspaces), Arc::new(SymmetricTokenBackend::new()))
    }

    fn create_input(name: &str) -> CreateSecretInput {
        CreateSecretInput {
            workspace_id: "ws-1".to_string(),
            name: name.to_string(),
            secret_type: "api_key".to_string(),
            plaintext: "sk-plaintext".to_string(),
            rotation_policy: RotationPolicy::Auto90d,
            tags: vec!["prod".to_string()],
            metadata: StdHashMap::new(),
            created_by: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_get_value_roundtrips_plaintext() {
        let engine = engine();
        let metadata = engine.create(create_input("openai-key")).await.unwrap();
        let value = engine.get_value("ws-1", &metadata.id, "user-1").await.unwrap();
        assert_eq!(value, "sk-plaintext");
    }

    #[tokio::test]
    async fn duplicate_active_name_in_same_workspace_is_rejected() {
        let engine = engine();
        engine.create(create_input("openai-key")).await.unwrap();
        let err = engine.create(create_input("openai-key")).await.unwrap_err();
        assert!(matches!(err, SecretError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn metadata_never_serializes_the_ciphertext_field() {
        let engine = engine();
        let metadata = engine.create(create_input("openai-key")).await.unwrap();
        let serialized = serde_json::to_string(&metadata).unwrap();
        assert!(!serialized.contains("encrypted_value"));
    }

    #[tokio::test]
    async fn delete_is_soft_and_hides_the_secret_from_lookups() {
        let engine = engine();
        let metadata = engine.create(create_input("openai-key")).await.unwrap();
        engine.delete("ws-1", &metadata.id, "user-1").await.unwrap();

        let err = engine.get_metadata("ws-1", &metadata.id).unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn rotate_advances_last_rotated_at_and_keeps_name() {
        let engine = engine();
        let metadata = engine.create(create_input("openai-key")).await.unwrap();
        let before = metadata.last_rotated_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let rotated = engine.rotate("ws-1", &metadata.id, "sk-new-value".to_string(), "user-1").await.unwrap();

        assert!(rotated.last_rotated_at > before);
        assert_eq!(rotated.name, "openai-key");
        let value = engine.get_value("ws-1", &metadata.id, "user-1").await.unwrap();
        assert_eq!(value, "sk-new-value");
    }

    #[tokio::test]
    async fn rotation_due_query_only_returns_active_non_manual_secrets_past_the_horizon() {
        let engine = engine();
        let mut input = create_input("due-soon");
        input.rotation_policy = RotationPolicy::Auto30d;
        let metadata = engine.create(input).await.unwrap();

        // 30 days out is within a 365-day horizon.
        let due = engine.rotation_due("ws-1", 365);
        assert!(due.iter().any(|s| s.id == metadata.id));

        let not_due_yet = engine.rotation_due("ws-1", 1);
        assert!(!not_due_yet.iter().any(|s| s.id == metadata.id));
    }

    #[tokio::test]
    async fn creating_in_unknown_workspace_is_rejected() {
        struct NoWorkspaces;
        impl WorkspaceDirectory for NoWorkspaces {
            fn exists(&self, _workspace_id: &str) -> bool {
                false
            }
        }
        let engine = SecretEngine::new(Box::new(InMemoryStore::new()), Box::new(NoWorkspaces), Arc::new(SymmetricTokenBackend::new()));
        let err = engine.create(create_input("openai-key")).await.unwrap_err();
        assert!(matches!(err, SecretError::WorkspaceNotFound(_)));
    }
}
