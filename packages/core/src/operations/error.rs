//! Error types for tree mutation operations
//!
//! Every validation failure is detected before the engine issues a write, so
//! an operation that returns one of the validation variants has had no side
//! effects. Only `Store` (and `VersionConflict` raised by the store) can
//! surface after the write phase started.

use crate::db::StoreError;
use thiserror::Error;

/// Coarse error classification, mirroring the caller-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    BadRequest,
    Conflict,
    /// Cancelled or timed out before any write was issued
    Unavailable,
    Internal,
}

/// Errors that can occur during tree mutation operations
///
/// # Examples
///
/// ```rust
/// use classnode_core::operations::{ErrorKind, TreeOperationError};
///
/// let err = TreeOperationError::cycle_detected("unit-1", "lesson-3");
/// assert_eq!(err.kind(), ErrorKind::BadRequest);
/// ```
#[derive(Error, Debug)]
pub enum TreeOperationError {
    /// Node does not exist, or exists in a different collection
    #[error("Node '{node_id}' not found in collection '{collection_id}'")]
    NodeNotFound {
        collection_id: String,
        node_id: String,
    },

    /// Candidate parent does not exist, or exists in a different collection
    #[error("Parent node '{parent_id}' not found in collection '{collection_id}'")]
    ParentNotFound {
        collection_id: String,
        parent_id: String,
    },

    /// Node is import-locked and cannot take part in a structural mutation
    #[error("Node '{node_id}' is locked by import and cannot be restructured")]
    ImportLocked { node_id: String },

    /// Reparenting would make the node its own ancestor
    #[error("Cycle detected: node '{node_id}' cannot be moved under '{parent_id}'")]
    CycleDetected { node_id: String, parent_id: String },

    /// Insert named an ID that is already stored
    #[error("Node '{node_id}' already exists")]
    NodeAlreadyExists { node_id: String },

    /// Request is malformed for reasons other than a cycle
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Node changed between read and write (optimistic concurrency control)
    ///
    /// Safe to retry the whole operation from a fresh read.
    #[error("Version conflict for node '{node_id}': expected version {expected_version}, but current version is {actual_version}")]
    VersionConflict {
        node_id: String,
        expected_version: i64,
        actual_version: i64,
    },

    /// Caller cancelled before the write phase
    #[error("Operation cancelled before any write was issued")]
    Cancelled,

    /// Collection lock could not be acquired in time
    #[error("Timed out after {timeout_ms}ms waiting for collection '{collection_id}'")]
    LockTimeout {
        collection_id: String,
        timeout_ms: u64,
    },

    /// Store failure outside the validation phase
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for TreeOperationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                node_id,
                expected_version,
                actual_version,
            } => Self::VersionConflict {
                node_id,
                expected_version,
                actual_version,
            },
            StoreError::DuplicateNode { node_id } => Self::NodeAlreadyExists { node_id },
            other => Self::Store(other),
        }
    }
}

impl TreeOperationError {
    /// Create a NodeNotFound error
    pub fn node_not_found(collection_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            collection_id: collection_id.into(),
            node_id: node_id.into(),
        }
    }

    /// Create a ParentNotFound error
    pub fn parent_not_found(
        collection_id: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self::ParentNotFound {
            collection_id: collection_id.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Create an ImportLocked error
    pub fn import_locked(node_id: impl Into<String>) -> Self {
        Self::ImportLocked {
            node_id: node_id.into(),
        }
    }

    /// Create a CycleDetected error
    pub fn cycle_detected(node_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::CycleDetected {
            node_id: node_id.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Create an InvalidRequest error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create a LockTimeout error
    pub fn lock_timeout(collection_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::LockTimeout {
            collection_id: collection_id.into(),
            timeout_ms,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound { .. } | Self::ParentNotFound { .. } => ErrorKind::NotFound,
            Self::ImportLocked { .. } => ErrorKind::Forbidden,
            Self::CycleDetected { .. }
            | Self::InvalidRequest { .. }
            | Self::NodeAlreadyExists { .. } => ErrorKind::BadRequest,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::Store(err) if err.is_conflict() => ErrorKind::Conflict,
            Self::Cancelled | Self::LockTimeout { .. } => ErrorKind::Unavailable,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may retry the same request from a fresh read
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
