//! Tree Operations
//!
//! Pure building blocks of the mutation engine plus the request types callers
//! hand to it:
//!
//! - `lock_policy` - import-lock checks
//! - `cycle_detector` - descendant walk for reparenting
//! - `sequence_reindexer` - gap close / gap open / in-group shift / renumber
//! - `planner` - turns a validated request into a `WriteBatch`
//! - `integrity` - invariant checks and dense repair planning
//! - `retry_queue` - caller-side retry on version conflicts

pub mod cycle_detector;
pub mod error;
pub mod integrity;
pub mod lock_policy;
pub mod planner;
pub mod retry_queue;
pub mod sequence_reindexer;

pub use error::{ErrorKind, TreeOperationError};
pub use integrity::{IntegrityReport, SequenceViolation};
pub use retry_queue::ConflictRetryQueue;

use crate::models::{ClassNode, NodeContentUpdate};

/// Parameters for `TreeMutationEngine::move_node`
///
/// `new_sequence` is a requested 1-based rank in the destination group; out
/// of range values are clamped to the nearest valid insertion point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveNodeParams {
    pub collection_id: String,
    pub node_id: String,
    /// `None` moves the node to the root level
    pub new_parent_id: Option<String>,
    pub new_sequence: i64,
}

impl MoveNodeParams {
    pub fn new(
        collection_id: impl Into<String>,
        node_id: impl Into<String>,
        new_parent_id: Option<String>,
        new_sequence: i64,
    ) -> Self {
        Self {
            collection_id: collection_id.into(),
            node_id: node_id.into(),
            new_parent_id,
            new_sequence,
        }
    }
}

/// Parameters for `TreeMutationEngine::update_node`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNodeParams {
    pub collection_id: String,
    pub node_id: String,
    pub content: NodeContentUpdate,
    /// Requested rank within the current sibling group
    pub new_sequence: Option<i64>,
}

impl UpdateNodeParams {
    pub fn new(collection_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            node_id: node_id.into(),
            content: NodeContentUpdate::default(),
            new_sequence: None,
        }
    }

    pub fn with_content(mut self, content: NodeContentUpdate) -> Self {
        self.content = content;
        self
    }

    pub fn with_sequence(mut self, new_sequence: i64) -> Self {
        self.new_sequence = Some(new_sequence);
        self
    }
}

/// Parameters for `TreeMutationEngine::insert_node`
///
/// # ID Generation
///
/// `id = None` generates a UUID v4. Callers that pre-generate IDs (for
/// optimistic UI state) pass them through; a collision is rejected by the
/// store as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertNodeParams {
    pub collection_id: String,
    pub id: Option<String>,
    pub parent_id: Option<String>,
    /// Requested rank; `None` appends to the end of the group
    pub sequence: Option<i64>,
    pub title: String,
    pub node_type: String,
    pub description: Option<String>,
    pub is_locked_by_import: bool,
}

impl InsertNodeParams {
    pub fn new(
        collection_id: impl Into<String>,
        parent_id: Option<String>,
        title: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        Self {
            collection_id: collection_id.into(),
            id: None,
            parent_id,
            sequence: None,
            title: title.into(),
            node_type: node_type.into(),
            description: None,
            is_locked_by_import: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at_sequence(mut self, sequence: i64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn locked_by_import(mut self, locked: bool) -> Self {
        self.is_locked_by_import = locked;
        self
    }

    /// Build the node to insert; the sequence is assigned during planning
    pub(crate) fn into_node(self) -> ClassNode {
        let mut node = match self.id {
            Some(id) => ClassNode::new_with_id(
                id,
                self.collection_id,
                self.parent_id,
                0,
                self.title,
                self.node_type,
            ),
            None => ClassNode::new(
                self.collection_id,
                self.parent_id,
                0,
                self.title,
                self.node_type,
            ),
        };
        node.description = self.description;
        node.is_locked_by_import = self.is_locked_by_import;
        node
    }
}
