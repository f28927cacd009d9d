// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-level approval state machine and the roll-up that derives an
//! overall workflow-step approval status from its individual files.

use crate::error::ApprovalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileApprovalStatus {
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

/// Aggregate status rolled up from every file in a workflow-step approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    RequestChanges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// One file's before/after content as submitted in an approval-data payload.
/// `line_changes` and `diff_summary` are kept as `Value` -- the engine never
/// interprets their shape, only stores and returns it, the same as the
/// approval-data payload itself carries them untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub id: String,
    pub workflow_approval_id: String,
    pub file_path: String,
    pub file_type: String,
    pub change_type: ChangeType,
    pub is_new_file: bool,
    pub is_binary: bool,
    pub original_content: Option<String>,
    pub new_content: Option<String>,
    pub diff_summary: Value,
    pub line_changes: Value,
}

/// One per-file entry of an approval-data payload, as submitted to
/// [`ApprovalEngine::create_file_changes_from_payload`].
#[derive(Debug, Clone, Deserialize)]
pub struct FileChangeInput {
    pub file_path: String,
    pub file_type: String,
    pub change_type: ChangeType,
    pub is_new_file: bool,
    pub is_binary: bool,
    pub original_content: Option<String>,
    pub new_content: Option<String>,
    #[serde(default)]
    pub diff_summary: Value,
    #[serde(default)]
    pub line_changes: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineComment {
    pub line_number: u32,
    pub text: String,
    pub commenter: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileApproval {
    pub id: String,
    pub workflow_approval_id: String,
    pub file_change_id: String,
    pub file_path: String,
    pub status: FileApprovalStatus,
    pub reviewer_comment: Option<String>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub inline_comments: Vec<InlineComment>,
    pub review_metadata: HashMap<String, Value>,
}

impl FileApproval {
    pub fn new(
        id: impl Into<String>,
        workflow_approval_id: impl Into<String>,
        file_change_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_approval_id: workflow_approval_id.into(),
            file_change_id: file_change_id.into(),
            file_path: file_path.into(),
            status: FileApprovalStatus::Pending,
            reviewer_comment: None,
            updated_by: None,
            updated_at: Utc::now(),
            inline_comments: Vec::new(),
            review_metadata: HashMap::new(),
        }
    }
}

/// What kind of action an `ApprovalHistoryEntry` records. A `Comment` entry
/// carries no status change -- `old_status == new_status` -- since a
/// comment never transitions the file's approval state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalActionType {
    Approve,
    Reject,
    RequestChanges,
    Comment,
    Rollback,
}

/// An append-only record of a single file approval's status transition, or
/// of a comment left against it with no status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub file_approval_id: String,
    pub action_type: ApprovalActionType,
    pub old_status: FileApprovalStatus,
    pub new_status: FileApprovalStatus,
    pub actor: String,
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// In-memory tracking of file changes, their approvals, and the append-only
/// history for one workflow-step approval. Swappable for a persisted store
/// behind the same operations without the engine/controller needing to
/// change.
#[derive(Default)]
pub struct ApprovalEngine {
    file_changes: HashMap<String, FileChange>,
    files: HashMap<String, FileApproval>,
    history: Vec<ApprovalHistoryEntry>,
    next_id: std::sync::atomic::AtomicU64,
}

impl ApprovalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("{prefix}-{n}")
    }

    pub fn register_file(&mut self, file: FileApproval) {
        self.files.insert(file.id.clone(), file);
    }

    /// Materialises one `FileChange` and exactly one `FileApproval` per
    /// entry of an approval-data payload, both starting `pending`, and
    /// associates them with `workflow_approval_id`.
    pub fn create_file_changes_from_payload(
        &mut self,
        workflow_approval_id: &str,
        entries: Vec<FileChangeInput>,
    ) -> Vec<(FileChange, FileApproval)> {
        let mut created = Vec::with_capacity(entries.len());
        for entry in entries {
            let change_id = self.fresh_id("fc");
            let approval_id = self.fresh_id("fa");

            let file_change = FileChange {
                id: change_id.clone(),
                workflow_approval_id: workflow_approval_id.to_string(),
                file_path: entry.file_path.clone(),
                file_type: entry.file_type,
                change_type: entry.change_type,
                is_new_file: entry.is_new_file,
                is_binary: entry.is_binary,
                original_content: entry.original_content,
                new_content: entry.new_content,
                diff_summary: entry.diff_summary,
                line_changes: entry.line_changes,
            };
            let file_approval = FileApproval::new(approval_id, workflow_approval_id, change_id.clone(), entry.file_path);

            self.file_changes.insert(file_change.id.clone(), file_change.clone());
            self.files.insert(file_approval.id.clone(), file_approval.clone());
            created.push((file_change, file_approval));
        }
        created
    }

    pub fn file_changes_for(&self, workflow_approval_id: &str) -> Vec<&FileChange> {
        self.file_changes.values().filter(|c| c.workflow_approval_id == workflow_approval_id).collect()
    }

    pub fn files_for(&self, workflow_approval_id: &str) -> Vec<&FileApproval> {
        self.files
            .values()
            .filter(|f| f.workflow_approval_id == workflow_approval_id)
            .collect()
    }

    pub fn get(&self, file_approval_id: &str) -> Result<&FileApproval, ApprovalError> {
        self.files
            .get(file_approval_id)
            .ok_or_else(|| ApprovalError::NotFound(file_approval_id.to_string()))
    }

    pub fn approve_file(&mut self, file_approval_id: &str, approved_by: &str) -> Result<(), ApprovalError> {
        self.transition(file_approval_id, ApprovalActionType::Approve, FileApprovalStatus::Approved, approved_by, None)
    }

    pub fn reject_file(&mut self, file_approval_id: &str, rejected_by: &str, comment: &str) -> Result<(), ApprovalError> {
        if comment.trim().is_empty() {
            return Err(ApprovalError::CommentRequired);
        }
        self.transition(
            file_approval_id,
            ApprovalActionType::Reject,
            FileApprovalStatus::Rejected,
            rejected_by,
            Some(comment.to_string()),
        )
    }

    pub fn request_file_changes(&mut self, file_approval_id: &str, requested_by: &str, comment: &str) -> Result<(), ApprovalError> {
        if comment.trim().is_empty() {
            return Err(ApprovalError::CommentRequired);
        }
        self.transition(
            file_approval_id,
            ApprovalActionType::RequestChanges,
            FileApprovalStatus::ChangesRequested,
            requested_by,
            Some(comment.to_string()),
        )
    }

    /// Resets a file approval back to `Pending`, recording the rollback in
    /// history the same as any other transition. `reason` is required --
    /// the table in SPEC_FULL.md §4.7 lists "actor id, reason" for rollback.
    pub fn rollback(&mut self, file_approval_id: &str, actor: &str, reason: &str) -> Result<(), ApprovalError> {
        if reason.trim().is_empty() {
            return Err(ApprovalError::CommentRequired);
        }
        self.transition(file_approval_id, ApprovalActionType::Rollback, FileApprovalStatus::Pending, actor, Some(reason.to_string()))
    }

    /// Records an inline comment against a file without changing its
    /// approval status, and appends a matching `action_type = comment`
    /// history row with `old_status == new_status`.
    pub fn add_comment(&mut self, file_approval_id: &str, line_number: u32, text: &str, commenter: &str) -> Result<(), ApprovalError> {
        let file = self
            .files
            .get_mut(file_approval_id)
            .ok_or_else(|| ApprovalError::NotFound(file_approval_id.to_string()))?;

        file.inline_comments.push(InlineComment {
            line_number,
            text: text.to_string(),
            commenter: commenter.to_string(),
            created_at: Utc::now(),
        });
        let status = file.status;

        self.history.push(ApprovalHistoryEntry {
            file_approval_id: file_approval_id.to_string(),
            action_type: ApprovalActionType::Comment,
            old_status: status,
            new_status: status,
            actor: commenter.to_string(),
            comment: Some(text.to_string()),
            recorded_at: Utc::now(),
        });

        Ok(())
    }

    pub fn set_review_metadata(&mut self, file_approval_id: &str, metadata: HashMap<String, Value>) -> Result<(), ApprovalError> {
        let file = self
            .files
            .get_mut(file_approval_id)
            .ok_or_else(|| ApprovalError::NotFound(file_approval_id.to_string()))?;
        file.review_metadata.extend(metadata);
        Ok(())
    }

    fn transition(
        &mut self,
        file_approval_id: &str,
        action_type: ApprovalActionType,
        new_status: FileApprovalStatus,
        actor: &str,
        comment: Option<String>,
    ) -> Result<(), ApprovalError> {
        let file = self
            .files
            .get_mut(file_approval_id)
            .ok_or_else(|| ApprovalError::NotFound(file_approval_id.to_string()))?;

        let old_status = file.status;
        file.status = new_status;
        file.reviewer_comment = comment.clone();
        file.updated_by = Some(actor.to_string());
        file.updated_at = Utc::now();

        self.history.push(ApprovalHistoryEntry {
            file_approval_id: file_approval_id.to_string(),
            action_type,
            old_status,
            new_status,
            actor: actor.to_string(),
            comment,
            recorded_at: Utc::now(),
        });

        Ok(())
    }

    pub fn history_for(&self, file_approval_id: &str) -> Vec<&ApprovalHistoryEntry> {
        self.history.iter().filter(|h| h.file_approval_id == file_approval_id).collect()
    }

    /// Rolls every file's status for a workflow-step approval up to one
    /// aggregate `ApprovalStatus`. Any rejection wins outright; otherwise
    /// any requested change wins; otherwise all-approved beats pending.
    pub fn rollup_status(&self, workflow_approval_id: &str) -> ApprovalStatus {
        let files = self.files_for(workflow_approval_id);
        if files.is_empty() {
            return ApprovalStatus::Pending;
        }

        if files.iter().any(|f| f.status == FileApprovalStatus::Rejected) {
            return ApprovalStatus::Rejected;
        }
        if files.iter().any(|f| f.status == FileApprovalStatus::ChangesRequested) {
            return ApprovalStatus::RequestChanges;
        }
        if files.iter().all(|f| f.status == FileApprovalStatus::Approved) {
            return ApprovalStatus::Approved;
        }
        ApprovalStatus::Pending
    }

    /// Approves every file under a workflow-step approval in one bulk call,
    /// re-evaluating roll-up at each step (via repeated `approve_file`
    /// calls) the same as the one-file-at-a-time path.
    pub fn approve_all(&mut self, workflow_approval_id: &str, approved_by: &str) -> Result<(), ApprovalError> {
        let ids: Vec<String> = self
            .files_for(workflow_approval_id)
            .into_iter()
            .map(|f| f.id.clone())
            .collect();
        for id in ids {
            self.approve_file(&id, approved_by)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_files(n: usize) -> (ApprovalEngine, Vec<String>) {
        let mut engine = ApprovalEngine::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let id = format!("fa-{i}");
            engine.register_file(FileApproval::new(&id, "wa-1", format!("fc-{i}"), format!("src/file{i}.py")));
            ids.push(id);
        }
        (engine, ids)
    }

    #[test]
    fn rollup_is_pending_with_no_decisions() {
        let (engine, _) = engine_with_files(3);
        assert_eq!(engine.rollup_status("wa-1"), ApprovalStatus::Pending);
    }

    #[test]
    fn any_rejection_wins_over_everything() {
        let (mut engine, ids) = engine_with_files(3);
        engine.approve_file(&ids[0], "reviewer").unwrap();
        engine.request_file_changes(&ids[1], "reviewer", "needs work").unwrap();
        engine.reject_file(&ids[2], "reviewer", "broken").unwrap();
        assert_eq!(engine.rollup_status("wa-1"), ApprovalStatus::Rejected);
    }

    #[test]
    fn request_changes_wins_over_pending_and_approved() {
        let (mut engine, ids) = engine_with_files(2);
        engine.approve_file(&ids[0], "reviewer").unwrap();
        engine.request_file_changes(&ids[1], "reviewer", "tweak this").unwrap();
        assert_eq!(engine.rollup_status("wa-1"), ApprovalStatus::RequestChanges);
    }

    #[test]
    fn all_approved_rolls_up_to_approved() {
        let (mut engine, ids) = engine_with_files(3);
        for id in &ids {
            engine.approve_file(id, "reviewer").unwrap();
        }
        assert_eq!(engine.rollup_status("wa-1"), ApprovalStatus::Approved);
    }

    #[test]
    fn rejection_requires_a_comment() {
        let (mut engine, ids) = engine_with_files(1);
        let result = engine.reject_file(&ids[0], "reviewer", "");
        assert!(matches!(result, Err(ApprovalError::CommentRequired)));
    }

    #[test]
    fn approve_all_bulk_approves_every_file() {
        let (mut engine, _) = engine_with_files(3);
        engine.approve_all("wa-1", "reviewer").unwrap();
        assert_eq!(engine.rollup_status("wa-1"), ApprovalStatus::Approved);
    }

    #[test]
    fn history_records_every_transition() {
        let (mut engine, ids) = engine_with_files(1);
        engine.approve_file(&ids[0], "reviewer").unwrap();
        let history = engine.history_for(&ids[0]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action_type, ApprovalActionType::Approve);
        assert_eq!(history[0].old_status, FileApprovalStatus::Pending);
        assert_eq!(history[0].new_status, FileApprovalStatus::Approved);
    }

    #[test]
    fn a_comment_produces_a_history_row_with_no_status_change() {
        let (mut engine, ids) = engine_with_files(1);
        engine.add_comment(&ids[0], 42, "looks risky", "reviewer").unwrap();

        let file = engine.get(&ids[0]).unwrap();
        assert_eq!(file.status, FileApprovalStatus::Pending);
        assert_eq!(file.inline_comments.len(), 1);
        assert_eq!(file.inline_comments[0].line_number, 42);

        let history = engine.history_for(&ids[0]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action_type, ApprovalActionType::Comment);
        assert_eq!(history[0].old_status, history[0].new_status);
    }

    #[test]
    fn create_file_changes_from_payload_materialises_one_pending_pair_per_entry() {
        let mut engine = ApprovalEngine::new();
        let entries = vec![
            FileChangeInput {
                file_path: "src/app.py".to_string(),
                file_type: "py".to_string(),
                change_type: ChangeType::Modified,
                is_new_file: false,
                is_binary: false,
                original_content: Some("print('old')".to_string()),
                new_content: Some("print('new')".to_string()),
                diff_summary: serde_json::json!({"additions": 1, "deletions": 1}),
                line_changes: serde_json::json!([]),
            },
            FileChangeInput {
                file_path: "README.md".to_string(),
                file_type: "md".to_string(),
                change_type: ChangeType::Created,
                is_new_file: true,
                is_binary: false,
                original_content: None,
                new_content: Some("# New Project".to_string()),
                diff_summary: serde_json::json!({"additions": 1, "deletions": 0}),
                line_changes: serde_json::json!([]),
            },
        ];

        let created = engine.create_file_changes_from_payload("wa-1", entries);
        assert_eq!(created.len(), 2);
        for (change, approval) in &created {
            assert_eq!(approval.status, FileApprovalStatus::Pending);
            assert_eq!(approval.file_change_id, change.id);
        }
        assert_eq!(engine.file_changes_for("wa-1").len(), 2);
        assert_eq!(engine.files_for("wa-1").len(), 2);
    }

    #[test]
    fn rollback_requires_a_reason() {
        let (mut engine, ids) = engine_with_files(1);
        engine.approve_file(&ids[0], "reviewer").unwrap();
        let result = engine.rollback(&ids[0], "admin", "");
        assert!(matches!(result, Err(ApprovalError::CommentRequired)));

        engine.rollback(&ids[0], "admin", "needs more changes").unwrap();
        assert_eq!(engine.get(&ids[0]).unwrap().status, FileApprovalStatus::Pending);
    }
}
