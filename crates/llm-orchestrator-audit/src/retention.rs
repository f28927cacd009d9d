use crate::storage::{AuditStorageRef, Result, StorageError, MIN_COMPLIANCE_RETENTION_DAYS};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::time;

/// Which audit trail a retention manager is enforcing. Secret and approval
/// trails are held to [`MIN_COMPLIANCE_RETENTION_DAYS`]; everything else
/// (workflow/step/config events) can use a shorter operational window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionScope {
    SecretActions,
    ApprovalDecisions,
    Operational,
}

/// Manages retention policy for audit events. One manager governs one
/// retention scope, so a deployment typically runs a secret-actions
/// manager and an approval-decisions manager on independent schedules.
pub struct AuditRetentionManager {
    storage: AuditStorageRef,
    scope: RetentionScope,
    retention_days: u32,
}

impl AuditRetentionManager {
    /// Create a new retention manager. Rejects a `retention_days` shorter
    /// than the compliance floor for `SecretActions`/`ApprovalDecisions`
    /// scopes.
    pub fn new(storage: AuditStorageRef, scope: RetentionScope, retention_days: u32) -> Result<Self> {
        let floor = match scope {
            RetentionScope::SecretActions | RetentionScope::ApprovalDecisions => MIN_COMPLIANCE_RETENTION_DAYS,
            RetentionScope::Operational => 0,
        };
        if retention_days < floor {
            return Err(StorageError::ConfigurationError(format!(
                "retention of {retention_days} days is below the {floor}-day compliance floor for {scope:?}"
            )));
        }

        Ok(Self {
            storage,
            scope,
            retention_days,
        })
    }

    /// The scope this manager enforces.
    pub fn scope(&self) -> RetentionScope {
        self.scope
    }

    /// Run cleanup of old audit events
    /// Returns the number of events deleted
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(self.retention_days as i64);

        tracing::info!(
            scope = ?self.scope,
            retention_days = self.retention_days,
            cutoff_date = %cutoff,
            "Running audit log cleanup"
        );

        let deleted = self.storage.delete_older_than(cutoff).await?;

        tracing::info!(scope = ?self.scope, deleted_count = deleted, "Audit log cleanup completed");

        Ok(deleted)
    }

    /// Start background cleanup task
    /// Returns a handle that can be used to cancel the task
    pub fn start_background_cleanup(
        self: Arc<Self>,
        interval: time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval_timer = time::interval(interval);

            loop {
                interval_timer.tick().await;

                match self.cleanup().await {
                    Ok(deleted) => {
                        tracing::debug!(deleted_count = deleted, "Background cleanup completed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Background cleanup failed");
                    }
                }
            }
        })
    }

    /// Get the retention period in days
    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Calculate the cutoff date for cleanup
    pub fn cutoff_date(&self) -> DateTime<Utc> {
        Utc::now() - Duration::days(self.retention_days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileAuditStorage, RotationPolicy};
    
    use crate::models::{AuditEventType, AuditFilter, AuditResult, ResourceType};
    use crate::models::AuditEvent;
    use std::time::Duration as StdDuration;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn operational_scope_cleans_up_on_a_short_schedule() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage: AuditStorageRef = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );

        let mut old_event = AuditEvent::new(
            AuditEventType::WorkflowExecution,
            "Old workflow".to_string(),
            ResourceType::Workflow,
            "workflow-old".to_string(),
            AuditResult::Success,
        );
        old_event.timestamp = Utc::now() - Duration::days(2);
        storage.store(&old_event).await.unwrap();

        let recent_event = AuditEvent::new(
            AuditEventType::WorkflowExecution,
            "Recent workflow".to_string(),
            ResourceType::Workflow,
            "workflow-recent".to_string(),
            AuditResult::Success,
        );
        storage.store(&recent_event).await.unwrap();

        let manager = AuditRetentionManager::new(storage.clone(), RetentionScope::Operational, 1).unwrap();

        let deleted = manager.cleanup().await.unwrap();
        assert_eq!(deleted, 1);

        let events = storage.query(AuditFilter::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id, "workflow-recent");
    }

    #[tokio::test]
    async fn secret_actions_scope_rejects_a_retention_below_the_compliance_floor() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage: AuditStorageRef = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );

        let result = AuditRetentionManager::new(storage.clone(), RetentionScope::SecretActions, 30);
        assert!(result.is_err());

        let manager = AuditRetentionManager::new(storage, RetentionScope::ApprovalDecisions, MIN_COMPLIANCE_RETENTION_DAYS).unwrap();
        assert_eq!(manager.retention_days(), MIN_COMPLIANCE_RETENTION_DAYS);
        assert_eq!(manager.scope(), RetentionScope::ApprovalDecisions);
    }

    #[tokio::test]
    async fn test_retention_cutoff_date() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage: AuditStorageRef = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );

        let manager = AuditRetentionManager::new(storage, RetentionScope::SecretActions, 90).unwrap();

        assert_eq!(manager.retention_days(), 90);

        let cutoff = manager.cutoff_date();
        let expected_cutoff = Utc::now() - Duration::days(90);

        // Allow 1 second difference for test execution time
        let diff = (cutoff - expected_cutoff).num_seconds().abs();
        assert!(diff <= 1);
    }

    #[tokio::test]
    async fn test_background_cleanup() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage: AuditStorageRef = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );

        let mut old_event = AuditEvent::new(
            AuditEventType::WorkflowExecution,
            "Old workflow".to_string(),
            ResourceType::Workflow,
            "workflow-old".to_string(),
            AuditResult::Success,
        );
        old_event.timestamp = Utc::now() - Duration::days(2);
        storage.store(&old_event).await.unwrap();

        let manager = Arc::new(AuditRetentionManager::new(storage.clone(), RetentionScope::Operational, 1).unwrap());

        let handle = manager.start_background_cleanup(StdDuration::from_millis(100));
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        handle.abort();

        let events = storage.query(AuditFilter::new()).await.unwrap();
        assert_eq!(events.len(), 0);
    }
}
