// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tamper-evident audit logging: every event is hash-chained to the one
//! before it, so a storage backend can detect a deleted or reordered row.
//! Used by the secret engine and the file-level approval engine; workflow
//! and step execution events are logged the same way.

pub mod database;
pub mod file;
pub mod logger;
pub mod models;
pub mod retention;
pub mod storage;

pub use logger::AuditLogger;
pub use models::{AuditEvent, AuditEventType, AuditFilter, AuditResult, ResourceType};
pub use retention::{AuditRetentionManager, RetentionScope};
pub use storage::{AuditStorage, AuditStorageRef, StorageError, MIN_COMPLIANCE_RETENTION_DAYS};

#[cfg(feature = "database")]
pub use database::DatabaseAuditStorage;
pub use file::{FileAuditStorage, RotationPolicy};
