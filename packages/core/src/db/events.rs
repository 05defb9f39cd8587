//! Domain Events for ClassNode trees
//!
//! The mutation engine emits these events on a tokio broadcast channel after
//! a batch has been applied successfully. Subscribers (UI bridges, caches,
//! audit logs) observe tree changes without coupling to the engine.

use crate::models::ClassNode;
use serde::{Deserialize, Serialize};

/// Position of a node within its collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreePosition {
    pub parent_id: Option<String>,
    pub sequence: i64,
}

impl From<&ClassNode> for TreePosition {
    fn from(node: &ClassNode) -> Self {
        Self {
            parent_id: node.parent_id.clone(),
            sequence: node.sequence,
        }
    }
}

/// Domain events emitted by the tree mutation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    /// A node changed parent (or position among root nodes)
    #[serde(rename_all = "camelCase")]
    NodeMoved {
        collection_id: String,
        node_id: String,
        from: TreePosition,
        to: TreePosition,
        /// Number of siblings whose sequence shifted
        siblings_shifted: usize,
    },

    /// A node changed position within its sibling group
    #[serde(rename_all = "camelCase")]
    NodeReordered {
        collection_id: String,
        node_id: String,
        old_sequence: i64,
        new_sequence: i64,
        siblings_shifted: usize,
    },

    /// A node's content or position was updated
    NodeUpdated(ClassNode),

    /// A node was created at a position
    NodeInserted(ClassNode),

    /// A node and its subtree were removed
    #[serde(rename_all = "camelCase")]
    NodeDeleted {
        collection_id: String,
        node_id: String,
        removed: usize,
    },

    /// Sibling sequences were rebuilt to restore density
    #[serde(rename_all = "camelCase")]
    CollectionRepaired {
        collection_id: String,
        renumbered: usize,
    },
}

impl TreeEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::NodeMoved { .. } => "node:moved",
            TreeEvent::NodeReordered { .. } => "node:reordered",
            TreeEvent::NodeUpdated(_) => "node:updated",
            TreeEvent::NodeInserted(_) => "node:inserted",
            TreeEvent::NodeDeleted { .. } => "node:deleted",
            TreeEvent::CollectionRepaired { .. } => "collection:repaired",
        }
    }

    pub fn collection_id(&self) -> &str {
        match self {
            TreeEvent::NodeUpdated(node) | TreeEvent::NodeInserted(node) => &node.collection_id,
            TreeEvent::NodeMoved { collection_id, .. }
            | TreeEvent::NodeReordered { collection_id, .. }
            | TreeEvent::NodeDeleted { collection_id, .. }
            | TreeEvent::CollectionRepaired { collection_id, .. } => collection_id,
        }
    }
}
