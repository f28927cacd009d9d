// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret data model: a workspace-scoped, encrypted-at-rest credential with
//! a rotation policy and an append-only access history.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How often a secret should be rotated, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationPolicy {
    Manual,
    Auto30d,
    Auto60d,
    Auto90d,
    Auto180d,
    Auto365d,
}

impl RotationPolicy {
    /// Days between rotations, or `None` for `Manual` (no due date).
    pub fn period_days(&self) -> Option<i64> {
        match self {
            Self::Manual => None,
            Self::Auto30d => Some(30),
            Self::Auto60d => Some(60),
            Self::Auto90d => Some(90),
            Self::Auto180d => Some(180),
            Self::Auto365d => Some(365),
        }
    }

    /// Computes the next due date from a rotation timestamp, `None` when manual.
    pub fn due_from(&self, last_rotated_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.period_days().map(|days| last_rotated_at + ChronoDuration::days(days))
    }
}

/// One action recorded against a secret. Append-only; never carries
/// plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretAction {
    Created,
    Accessed,
    Updated,
    Rotated,
    Deleted,
}

/// An append-only audit row for one secret action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretAudit {
    pub id: String,
    pub secret_id: String,
    pub action: SecretAction,
    pub actor: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// A workspace-scoped encrypted secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub secret_type: String,
    pub encrypted_value: String,
    pub rotation_policy: RotationPolicy,
    pub last_rotated_at: DateTime<Utc>,
    pub rotation_due_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Secret {
    /// Whether this secret is past its rotation due date. Always `false`
    /// for manually-rotated secrets.
    pub fn is_rotation_due(&self, now: DateTime<Utc>) -> bool {
        self.rotation_due_at.is_some_and(|due| due <= now)
    }

    /// Metadata view with `encrypted_value` stripped -- the only shape
    /// that may ever leave the engine for a non-value request.
    pub fn to_metadata(&self) -> SecretMetadata {
        SecretMetadata {
            id: self.id.clone(),
            workspace_id: self.workspace_id.clone(),
            name: self.name.clone(),
            secret_type: self.secret_type.clone(),
            rotation_policy: self.rotation_policy,
            last_rotated_at: self.last_rotated_at,
            rotation_due_at: self.rotation_due_at,
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
            is_active: self.is_active,
            created_at: self.created_at,
            created_by: self.created_by.clone(),
            updated_at: self.updated_at,
            updated_by: self.updated_by.clone(),
        }
    }
}

/// Everything about a secret except its encrypted/plaintext value. This is
/// the only shape `SecretEngine::list`/`get_metadata` may return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub secret_type: String,
    pub rotation_policy: RotationPolicy,
    pub last_rotated_at: DateTime<Utc>,
    pub rotation_due_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Filter used by [`crate::manager::SecretEngine::list`].
#[derive(Debug, Clone, Default)]
pub struct SecretFilter {
    pub secret_type: Option<String>,
    pub is_active: Option<bool>,
    pub tags_any: Vec<String>,
    pub rotation_due_within_days: Option<i64>,
}

impl SecretFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, secret: &Secret, now: DateTime<Utc>) -> bool {
        if let Some(secret_type) = &self.secret_type {
            if &secret.secret_type != secret_type {
                return false;
            }
        }
        if let Some(is_active) = self.is_active {
            if secret.is_active != is_active {
                return false;
            }
        }
        if !self.tags_any.is_empty() && !secret.tags.iter().any(|t| self.tags_any.contains(t)) {
            return false;
        }
        if let Some(days_ahead) = self.rotation_due_within_days {
            let horizon = now + ChronoDuration::days(days_ahead);
            let due = match secret.rotation_due_at {
                Some(due) => due,
                None => return false,
            };
            if !(due <= horizon && secret.is_active) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_policy_has_no_due_date() {
        assert_eq!(RotationPolicy::Manual.due_from(Utc::now()), None);
    }

    #[test]
    fn auto_30d_due_date_is_30_days_out() {
        let now = Utc::now();
        let due = RotationPolicy::Auto30d.due_from(now).unwrap();
        assert_eq!((due - now).num_days(), 30);
    }

    #[test]
    fn rotation_due_compares_against_now() {
        let now = Utc::now();
        let mut secret = sample_secret(now);
        secret.rotation_due_at = Some(now - ChronoDuration::days(1));
        assert!(secret.is_rotation_due(now));

        secret.rotation_due_at = Some(now + ChronoDuration::days(1));
        assert!(!secret.is_rotation_due(now));

        secret.rotation_due_at = None;
        assert!(!secret.is_rotation_due(now));
    }

    #[test]
    fn metadata_view_never_carries_the_encrypted_value() {
        let secret = sample_secret(Utc::now());
        let metadata = secret.to_metadata();
        let serialized = serde_json::to_string(&metadata).unwrap();
        assert!(!serialized.contains("super-secret-ciphertext"));
    }

    #[test]
    fn filter_matches_on_tag_overlap() {
        let secret = sample_secret(Utc::now());
        let mut filter = SecretFilter::new();
        filter.tags_any = vec!["prod".to_string()];
        assert!(filter.matches(&secret, Utc::now()));

        filter.tags_any = vec!["staging".to_string()];
        assert!(!filter.matches(&secret, Utc::now()));
    }

    fn sample_secret(now: DateTime<Utc>) -> Secret {
        Secret {
            id: "secret-1".to_string(),
            workspace_id: "ws-1".to_string(),
            name: "openai-key".to_string(),
            secret_type: "api_key".to_string(),
            encrypted_value: "super-secret-ciphertext".to_string(),
            rotation_policy: RotationPolicy::Auto90d,
            last_rotated_at: now,
            rotation_due_at: RotationPolicy::Auto90d.due_from(now),
            tags: vec!["prod".to_string()],
            metadata: HashMap::new(),
            is_active: true,
            created_at: now,
            created_by: "user-1".to_string(),
            updated_at: now,
            updated_by: "user-1".to_string(),
        }
    }
}
