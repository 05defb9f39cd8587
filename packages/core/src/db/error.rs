//! Store Error Types
//!
//! This module defines error types for `NodeStore` implementations, giving
//! the engine enough structure to tell optimistic-concurrency conflicts apart
//! from genuine backend failures.

use thiserror::Error;

/// Node store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Stored version differs from the version the write was planned against
    #[error("Version conflict for node {node_id}: expected version {expected_version}, found {actual_version}")]
    VersionConflict {
        node_id: String,
        expected_version: i64,
        actual_version: i64,
    },

    /// Insert of a node whose ID already exists in the collection
    #[error("Node already exists: {node_id}")]
    DuplicateNode { node_id: String },

    /// Update or delete of a node that is not stored
    #[error("Node not stored: {node_id}")]
    MissingNode { node_id: String },

    /// Failure injected by a test store
    #[error("Injected write failure: {0}")]
    InjectedFailure(String),

    /// Backend-specific failure (connection, serialization, ...)
    #[error("Store backend failed: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Create a version conflict error
    pub fn version_conflict(
        node_id: impl Into<String>,
        expected_version: i64,
        actual_version: i64,
    ) -> Self {
        Self::VersionConflict {
            node_id: node_id.into(),
            expected_version,
            actual_version,
        }
    }

    /// Create a duplicate node error
    pub fn duplicate_node(node_id: impl Into<String>) -> Self {
        Self::DuplicateNode {
            node_id: node_id.into(),
        }
    }

    /// Create a missing node error
    pub fn missing_node(node_id: impl Into<String>) -> Self {
        Self::MissingNode {
            node_id: node_id.into(),
        }
    }

    /// Whether retrying the whole operation from a fresh read can succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::MissingNode { .. })
    }
}
