//! NodeStore Trait - Storage Abstraction Layer
//!
//! This module defines the `NodeStore` trait that the tree mutation engine
//! reads from and writes to. The engine never talks to a database directly;
//! any backend that can fetch nodes by collection and apply a batch of writes
//! atomically can host ClassNode trees.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so network-backed stores fit
//!    without blocking the runtime
//! 2. **Ownership Semantics**: Writes take ownership of nodes; callers clone
//!    if they need to retain the original
//! 3. **Optimistic Concurrency**: Every write carries the version it was
//!    planned against, and stores reject stale writes with
//!    `StoreError::VersionConflict`
//! 4. **Atomic Batches**: A structural mutation touches several siblings.
//!    `apply_batch` must apply all of them or none, so a failed mutation can
//!    never leave a sibling group with gaps or duplicate sequences
//!
//! # Examples
//!
//! ```rust,no_run
//! use classnode_core::db::{InMemoryNodeStore, NodeStore};
//! use classnode_core::models::ParentFilter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), classnode_core::db::StoreError> {
//! let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
//! let roots = store.find_nodes("class-101", ParentFilter::Root).await?;
//! println!("{} root nodes", roots.len());
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{ClassNode, ParentFilter};
use async_trait::async_trait;

/// A single planned write against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeWrite {
    /// Create a node that must not exist yet
    Insert(ClassNode),

    /// Replace a stored node; `node.version` is the expected stored version
    Update(ClassNode),

    /// Remove a stored node at the expected version
    Delete {
        collection_id: String,
        id: String,
        version: i64,
    },
}

impl NodeWrite {
    /// ID of the node this write touches
    pub fn node_id(&self) -> &str {
        match self {
            NodeWrite::Insert(node) | NodeWrite::Update(node) => &node.id,
            NodeWrite::Delete { id, .. } => id,
        }
    }

    pub fn collection_id(&self) -> &str {
        match self {
            NodeWrite::Insert(node) | NodeWrite::Update(node) => &node.collection_id,
            NodeWrite::Delete { collection_id, .. } => collection_id,
        }
    }
}

/// An ordered set of writes to apply atomically.
///
/// Staging a second write for the same node replaces the first one but keeps
/// the first write's expected version, so a node adjusted twice during
/// planning is still checked against the version it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<NodeWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an update for `node`, merging with any earlier write to it
    pub fn stage_update(&mut self, node: ClassNode) {
        if let Some(existing) = self.position_of(&node.id) {
            match &self.writes[existing] {
                NodeWrite::Update(previous) => {
                    let mut merged = node;
                    merged.version = previous.version;
                    self.writes[existing] = NodeWrite::Update(merged);
                }
                NodeWrite::Insert(_) => {
                    self.writes[existing] = NodeWrite::Insert(node);
                }
                // A deleted node stays deleted
                NodeWrite::Delete { .. } => {}
            }
            return;
        }
        self.writes.push(NodeWrite::Update(node));
    }

    /// Stage updates for every node in `nodes`
    pub fn stage_updates(&mut self, nodes: impl IntoIterator<Item = ClassNode>) {
        for node in nodes {
            self.stage_update(node);
        }
    }

    pub fn stage_insert(&mut self, node: ClassNode) {
        self.writes.push(NodeWrite::Insert(node));
    }

    /// Stage deletion of `node` at its current version
    pub fn stage_delete(&mut self, node: &ClassNode) {
        let write = NodeWrite::Delete {
            collection_id: node.collection_id.clone(),
            id: node.id.clone(),
            version: node.version,
        };
        match self.position_of(&node.id) {
            Some(existing) => self.writes[existing] = write,
            None => self.writes.push(write),
        }
    }

    pub fn writes(&self) -> &[NodeWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<NodeWrite> {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Whether the batch contains a write for the given node
    pub fn touches(&self, node_id: &str) -> bool {
        self.position_of(node_id).is_some()
    }

    fn position_of(&self, node_id: &str) -> Option<usize> {
        self.writes.iter().position(|w| w.node_id() == node_id)
    }
}

/// Abstraction layer for ClassNode persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the engine can be shared across
/// tasks behind an `Arc`.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Get a node by collection and ID
    ///
    /// Returns `Ok(None)` when the node does not exist in that collection.
    async fn get_node(
        &self,
        collection_id: &str,
        node_id: &str,
    ) -> Result<Option<ClassNode>, StoreError>;

    /// Fetch nodes of a collection, optionally restricted to one sibling group
    ///
    /// Results are sorted by `(sequence, id)`.
    async fn find_nodes(
        &self,
        collection_id: &str,
        filter: ParentFilter,
    ) -> Result<Vec<ClassNode>, StoreError>;

    /// Persist a full node record
    ///
    /// `node.version` must equal the stored version; the returned node carries
    /// the bumped version.
    async fn update_node(&self, node: ClassNode) -> Result<ClassNode, StoreError>;

    /// Apply every write in `batch` atomically
    ///
    /// Either every write lands or none does. Returns the stored state of each
    /// inserted or updated node, in batch order.
    async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<ClassNode>, StoreError>;
}
