// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error type for the persistence layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to connect to state database: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
