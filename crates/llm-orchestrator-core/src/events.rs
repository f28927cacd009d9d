// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle event payloads and the broadcaster contract.
//!
//! The engine and controller publish events through an external
//! `EventBroadcaster` collaborator. Broadcast failures are logged and
//! swallowed -- they must never fail the operation that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Discriminant for the lifecycle events the engine and controller emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepSkipped,
    AgentActivity,
}

/// A single lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_type: EventType,
    pub execution_id: String,
    pub workflow_id: String,
    pub workspace_id: String,
    pub step_id: Option<String>,
    pub agent_id: Option<String>,
    pub data: Value,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(
        event_type: EventType,
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        workspace_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            workspace_id: workspace_id.into(),
            step_id: None,
            agent_id: None,
            data: Value::Object(Default::default()),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_step_id(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Broadcast error: logged and continued, never propagated to callers.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("broadcast channel closed")]
    ChannelClosed,
    #[error("broadcast backend error: {0}")]
    Backend(String),
}

/// External collaborator responsible for fanning events out to subscribers.
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), BroadcastError>;
}

pub type EventBroadcasterRef = Arc<dyn EventBroadcaster>;

/// Publishes an event, logging and swallowing any broadcast failure.
///
/// This is the single choke point every caller in the engine/controller
/// should go through so the "log & continue; never fail the operation"
/// policy can't be forgotten at a call site.
pub async fn emit(broadcaster: &EventBroadcasterRef, event: WorkflowEvent) {
    let event_type = event.event_type;
    let execution_id = event.execution_id.clone();
    if let Err(err) = broadcaster.publish(event).await {
        tracing::warn!(
            ?event_type,
            execution_id = %execution_id,
            error = %err,
            "event broadcast failed, continuing"
        );
    }
}

/// An in-memory broadcaster backed by a tokio broadcast channel. Useful as a
/// default for tests and for single-process deployments without an external
/// pub/sub collaborator wired in.
pub struct InMemoryBroadcaster {
    sender: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl InMemoryBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBroadcaster for InMemoryBroadcaster {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), BroadcastError> {
        // No active subscribers is not an error: the event was legitimately
        // published, nobody happened to be listening.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_never_panics_on_closed_channel() {
        struct AlwaysFails;
        #[async_trait]
        impl EventBroadcaster for AlwaysFails {
            async fn publish(&self, _event: WorkflowEvent) -> Result<(), BroadcastError> {
                Err(BroadcastError::ChannelClosed)
            }
        }

        let broadcaster: EventBroadcasterRef = Arc::new(AlwaysFails);
        let event = WorkflowEvent::new(
            EventType::WorkflowStarted,
            "exec-1",
            "wf-1",
            "ws-1",
            "started",
        );
        emit(&broadcaster, event).await;
    }

    #[tokio::test]
    async fn in_memory_broadcaster_delivers_to_subscriber() {
        let broadcaster = InMemoryBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        let event = WorkflowEvent::new(EventType::StepStarted, "exec-1", "wf-1", "ws-1", "go");
        broadcaster.publish(event.clone()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.execution_id, event.execution_id);
    }
}
