//! ClassNode Data Structures
//!
//! This module defines the `ClassNode` struct: one vertex of a class roadmap
//! tree (a curriculum or skill map). Nodes form a rooted forest scoped to a
//! collection id, and every node carries a 1-based `sequence` giving its rank
//! among the siblings that share its `(collection_id, parent_id)`.
//!
//! # Examples
//!
//! ```rust
//! use classnode_core::models::ClassNode;
//!
//! let unit = ClassNode::new("class-101", None, 1, "Unit 1", "unit");
//! let lesson = ClassNode::new("class-101", Some(unit.id.clone()), 1, "Lesson 1", "lesson");
//!
//! assert!(unit.is_root());
//! assert_eq!(lesson.parent_id.as_deref(), Some(unit.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default version value for serde deserialization (version 1)
fn default_version() -> i64 {
    1
}

/// A node in a class roadmap tree.
///
/// # Fields
///
/// - `id`: Unique identifier (UUID v4 unless supplied by the caller)
/// - `collection_id`: The class this tree belongs to
/// - `parent_id`: Parent within the same collection, `None` for roots
/// - `sequence`: 1-based rank among siblings
/// - `title`, `node_type`, `description`: content, not interpreted by the engine
/// - `is_locked_by_import`: structural position is frozen when set
/// - `version`: optimistic concurrency version, bumped by the store on each write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassNode {
    /// Unique identifier, immutable once created
    pub id: String,

    /// Forest scope; siblings and ancestors always share it
    pub collection_id: String,

    /// Parent node ID, `None` denotes a root
    pub parent_id: Option<String>,

    /// 1-based rank within the sibling group
    pub sequence: i64,

    /// Display title
    pub title: String,

    /// Free-form type tag (e.g. "unit", "lesson", "skill")
    pub node_type: String,

    /// Optional long-form description
    #[serde(default)]
    pub description: Option<String>,

    /// Set when the node's content came from an external import
    #[serde(default)]
    pub is_locked_by_import: bool,

    /// Optimistic concurrency control version (incremented on each write)
    #[serde(default = "default_version")]
    pub version: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
}

impl ClassNode {
    /// Create a new unlocked node with an auto-generated UUID
    pub fn new(
        collection_id: impl Into<String>,
        parent_id: Option<String>,
        sequence: i64,
        title: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        Self::new_with_id(
            Uuid::new_v4().to_string(),
            collection_id,
            parent_id,
            sequence,
            title,
            node_type,
        )
    }

    /// Create a new unlocked node with a caller-provided ID
    pub fn new_with_id(
        id: impl Into<String>,
        collection_id: impl Into<String>,
        parent_id: Option<String>,
        sequence: i64,
        title: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: id.into(),
            collection_id: collection_id.into(),
            parent_id,
            sequence,
            title: title.into(),
            node_type: node_type.into(),
            description: None,
            is_locked_by_import: false,
            version: 1,
            created_at: now,
            modified_at: now,
        }
    }

    /// Builder-style setter for the import lock
    pub fn locked_by_import(mut self, locked: bool) -> Self {
        self.is_locked_by_import = locked;
        self
    }

    /// Builder-style setter for the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The parent filter that selects this node's sibling group
    pub fn sibling_filter(&self) -> ParentFilter {
        ParentFilter::from(self.parent_id.clone())
    }
}

/// Content-only changes for a node.
///
/// `None` and blank strings mean "leave unchanged"; the engine rejects a
/// blank title before it gets here. Content fields carry no structural
/// meaning, so applying them never touches sibling sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeContentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeContentUpdate {
    /// Create a new empty update
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check if the update contains any effective change
    pub fn is_empty(&self) -> bool {
        non_blank(&self.title).is_none()
            && non_blank(&self.node_type).is_none()
            && non_blank(&self.description).is_none()
    }

    /// Apply the provided values to `node`.
    ///
    /// Returns `true` when at least one field actually changed.
    pub fn apply_to(&self, node: &mut ClassNode) -> bool {
        let mut changed = false;

        if let Some(title) = non_blank(&self.title) {
            if node.title != title {
                node.title = title.to_string();
                changed = true;
            }
        }

        if let Some(node_type) = non_blank(&self.node_type) {
            if node.node_type != node_type {
                node.node_type = node_type.to_string();
                changed = true;
            }
        }

        if let Some(description) = non_blank(&self.description) {
            if node.description.as_deref() != Some(description) {
                node.description = Some(description.to_string());
                changed = true;
            }
        }

        changed
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Selects which nodes of a collection a query returns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentFilter {
    /// Every node in the collection
    Any,
    /// Root nodes only (`parent_id = None`)
    Root,
    /// Direct children of the given node
    Child(String),
}

impl ParentFilter {
    pub fn matches(&self, node: &ClassNode) -> bool {
        match self {
            ParentFilter::Any => true,
            ParentFilter::Root => node.parent_id.is_none(),
            ParentFilter::Child(parent_id) => node.parent_id.as_deref() == Some(parent_id),
        }
    }
}

impl From<Option<String>> for ParentFilter {
    fn from(parent_id: Option<String>) -> Self {
        match parent_id {
            Some(id) => ParentFilter::Child(id),
            None => ParentFilter::Root,
        }
    }
}

impl From<Option<&str>> for ParentFilter {
    fn from(parent_id: Option<&str>) -> Self {
        ParentFilter::from(parent_id.map(str::to_string))
    }
}
