//! Tree Mutation Engine
//!
//! Orchestrates structural changes to ClassNode trees against a `NodeStore`.
//! Every mutation follows the same shape:
//!
//! 1. Acquire the collection's mutation lock
//! 2. Read the nodes the operation depends on and validate the request
//!    (existence, import locks, cycles)
//! 3. Plan every resulting write into one `WriteBatch`
//! 4. Apply the batch with a single `NodeStore::apply_batch` call
//! 5. Broadcast a `TreeEvent`
//!
//! Validation failures surface before step 4, so they never leave side
//! effects. Cancellation is checked before every read and before the batch is
//! issued; once the batch is issued the operation runs to completion. If the
//! write phase fails for a reason other than a version conflict, the engine
//! rebuilds dense sequences for the collection before reporting the error.

use crate::db::{NodeStore, TreeEvent, WriteBatch};
use crate::models::{ClassNode, ParentFilter};
use crate::operations::cycle_detector::{descendants, would_create_cycle};
use crate::operations::integrity::{check_integrity, plan_repair, IntegrityReport};
use crate::operations::lock_policy::{check_mutable, check_subtree_mutable};
use crate::operations::planner::{plan_delete, plan_insert, plan_move, plan_update};
use crate::operations::{
    ErrorKind, InsertNodeParams, MoveNodeParams, TreeOperationError, UpdateNodeParams,
};
use crate::services::{CollectionGuard, CollectionLocks, ConfigError, EngineConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Core service for structural ClassNode mutations
///
/// # Examples
///
/// ```no_run
/// use classnode_core::db::InMemoryNodeStore;
/// use classnode_core::operations::MoveNodeParams;
/// use classnode_core::services::TreeMutationEngine;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = TreeMutationEngine::new(Arc::new(InMemoryNodeStore::new()));
///     let cancel = CancellationToken::new();
///
///     engine
///         .move_node(MoveNodeParams::new("class-101", "lesson-3", Some("unit-2".into()), 1), &cancel)
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TreeMutationEngine {
    store: Arc<dyn NodeStore>,
    locks: Arc<CollectionLocks>,
    config: EngineConfig,
    event_tx: broadcast::Sender<TreeEvent>,
}

impl TreeMutationEngine {
    /// Create an engine with the default configuration
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        let config = EngineConfig::default();
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Self {
            store,
            locks: Arc::new(CollectionLocks::new()),
            config,
            event_tx,
        }
    }

    /// Create an engine with a validated custom configuration
    pub fn with_config(store: Arc<dyn NodeStore>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            store,
            locks: Arc::new(CollectionLocks::new()),
            config,
            event_tx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to tree events
    ///
    /// Events are sent only after a batch has been applied successfully.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors; having no subscribers is normal
    fn emit_event(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    fn ensure_live(cancel: &CancellationToken) -> Result<(), TreeOperationError> {
        if cancel.is_cancelled() {
            return Err(TreeOperationError::Cancelled);
        }
        Ok(())
    }

    async fn lock_collection(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionGuard, TreeOperationError> {
        self.locks
            .acquire(collection_id, self.config.lock_timeout(), cancel)
            .await
    }

    /// Load a node, treating a node from another collection as absent
    async fn load_node(
        &self,
        collection_id: &str,
        node_id: &str,
    ) -> Result<ClassNode, TreeOperationError> {
        self.store
            .get_node(collection_id, node_id)
            .await?
            .filter(|node| node.collection_id == collection_id)
            .ok_or_else(|| TreeOperationError::node_not_found(collection_id, node_id))
    }

    /// Apply a planned batch, repairing the collection if the write phase broke
    async fn apply(
        &self,
        collection_id: &str,
        batch: WriteBatch,
    ) -> Result<Vec<ClassNode>, TreeOperationError> {
        let writes = batch.len();
        match self.store.apply_batch(batch).await {
            Ok(stored) => {
                tracing::debug!("Applied {} write(s) to collection '{}'", writes, collection_id);
                Ok(stored)
            }
            Err(err) => {
                let err = TreeOperationError::from(err);
                if err.is_retryable() {
                    tracing::warn!(
                        "Write conflict in collection '{}': {}",
                        collection_id,
                        err
                    );
                } else if err.kind() != ErrorKind::Internal {
                    // Rejected by validation in the store; nothing was written
                    tracing::debug!("Store rejected batch for collection '{}': {}", collection_id, err);
                } else {
                    tracing::warn!(
                        "Write phase failed in collection '{}' after planning {} write(s): {}",
                        collection_id,
                        writes,
                        err
                    );
                    if self.config.repair_on_write_failure {
                        if let Err(repair_err) = self.repair_locked(collection_id).await {
                            tracing::warn!(
                                "Repair of collection '{}' failed: {}",
                                collection_id,
                                repair_err
                            );
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Pick the stored copy of `node_id` out of a batch result
    fn stored_copy(stored: Vec<ClassNode>, node_id: &str, planned: ClassNode) -> ClassNode {
        stored
            .into_iter()
            .find(|n| n.id == node_id)
            .unwrap_or(planned)
    }

    /// Move a node to a new parent (or the root level) at a given rank
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` / `ParentNotFound` if either node is absent from the collection
    /// - `ImportLocked` if the node or the new parent is import-locked
    /// - `CycleDetected` if the new parent is the node itself or one of its descendants
    /// - `VersionConflict` if the tree changed between read and write
    pub async fn move_node(
        &self,
        params: MoveNodeParams,
        cancel: &CancellationToken,
    ) -> Result<ClassNode, TreeOperationError> {
        let MoveNodeParams {
            collection_id,
            node_id,
            new_parent_id,
            new_sequence,
        } = params;

        let _guard = self.lock_collection(&collection_id, cancel).await?;

        Self::ensure_live(cancel)?;
        let node = self.load_node(&collection_id, &node_id).await?;
        check_mutable(&node)?;

        if let Some(parent_id) = new_parent_id.as_deref() {
            Self::ensure_live(cancel)?;
            let parent = self
                .store
                .get_node(&collection_id, parent_id)
                .await?
                .filter(|p| p.collection_id == collection_id)
                .ok_or_else(|| TreeOperationError::parent_not_found(&collection_id, parent_id))?;
            check_mutable(&parent)?;
        }

        Self::ensure_live(cancel)?;
        let collection_nodes = self
            .store
            .find_nodes(&collection_id, ParentFilter::Any)
            .await?;

        if would_create_cycle(&collection_nodes, &node.id, new_parent_id.as_deref()) {
            return Err(TreeOperationError::cycle_detected(
                &node.id,
                new_parent_id.unwrap_or_default(),
            ));
        }

        let plan = plan_move(&collection_nodes, &node, new_parent_id, new_sequence);
        tracing::debug!(
            "Planned move of '{}' with {} sibling shift(s)",
            node.id,
            plan.siblings_shifted
        );

        Self::ensure_live(cancel)?;
        let stored = self.apply(&collection_id, plan.batch).await?;
        let moved = Self::stored_copy(stored, &node.id, plan.node);

        tracing::info!(
            "Moved node '{}' in collection '{}' to parent {:?} at sequence {}",
            moved.id,
            collection_id,
            moved.parent_id,
            moved.sequence
        );

        self.emit_event(TreeEvent::NodeMoved {
            collection_id,
            node_id: moved.id.clone(),
            from: plan.from,
            to: (&moved).into(),
            siblings_shifted: plan.siblings_shifted,
        });

        Ok(moved)
    }

    /// Update a node's content and optionally its rank among its siblings
    ///
    /// Never changes the parent. A requested rank is clamped to the size of
    /// the node's sibling group; a rank equal to the current one writes
    /// nothing for the siblings.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the node is absent from the collection
    /// - `ImportLocked` if the node is import-locked
    /// - `InvalidRequest` if a title is supplied but blank
    /// - `VersionConflict` if the tree changed between read and write
    pub async fn update_node(
        &self,
        params: UpdateNodeParams,
        cancel: &CancellationToken,
    ) -> Result<ClassNode, TreeOperationError> {
        let UpdateNodeParams {
            collection_id,
            node_id,
            content,
            new_sequence,
        } = params;

        if content.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(TreeOperationError::invalid_request("node title must not be blank"));
        }

        let _guard = self.lock_collection(&collection_id, cancel).await?;

        Self::ensure_live(cancel)?;
        let node = self.load_node(&collection_id, &node_id).await?;
        check_mutable(&node)?;

        let siblings = if new_sequence.is_some() {
            Self::ensure_live(cancel)?;
            self.store
                .find_nodes(&collection_id, node.sibling_filter())
                .await?
        } else {
            Vec::new()
        };

        let plan = plan_update(&siblings, &node, &content, new_sequence);
        if plan.batch.is_empty() {
            tracing::debug!("Update of '{}' changes nothing; skipping write", node.id);
            return Ok(node);
        }

        Self::ensure_live(cancel)?;
        let stored = self.apply(&collection_id, plan.batch).await?;
        let updated = Self::stored_copy(stored, &node.id, plan.node);

        if let Some((old_sequence, new_sequence)) = plan.reorder {
            tracing::info!(
                "Reordered node '{}' in collection '{}' from {} to {}",
                updated.id,
                collection_id,
                old_sequence,
                new_sequence
            );
            self.emit_event(TreeEvent::NodeReordered {
                collection_id: collection_id.clone(),
                node_id: updated.id.clone(),
                old_sequence,
                new_sequence,
                siblings_shifted: plan.siblings_shifted,
            });
        }
        if plan.content_changed {
            self.emit_event(TreeEvent::NodeUpdated(updated.clone()));
        }

        Ok(updated)
    }

    /// Create a node under `parent_id` at a rank (append when unspecified)
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` if the parent is absent from the collection
    /// - `ImportLocked` if the parent is import-locked
    /// - `InvalidRequest` if the title is blank
    /// - `NodeAlreadyExists` if a caller-supplied ID is already stored
    pub async fn insert_node(
        &self,
        params: InsertNodeParams,
        cancel: &CancellationToken,
    ) -> Result<ClassNode, TreeOperationError> {
        if params.title.trim().is_empty() {
            return Err(TreeOperationError::invalid_request("node title must not be blank"));
        }

        let collection_id = params.collection_id.clone();
        let _guard = self.lock_collection(&collection_id, cancel).await?;

        if let Some(parent_id) = params.parent_id.as_deref() {
            Self::ensure_live(cancel)?;
            let parent = self
                .store
                .get_node(&collection_id, parent_id)
                .await?
                .filter(|p| p.collection_id == collection_id)
                .ok_or_else(|| TreeOperationError::parent_not_found(&collection_id, parent_id))?;
            check_mutable(&parent)?;
        }

        Self::ensure_live(cancel)?;
        let siblings = self
            .store
            .find_nodes(&collection_id, ParentFilter::from(params.parent_id.clone()))
            .await?;

        let sequence = params.sequence;
        let plan = plan_insert(&siblings, params.into_node(), sequence);

        Self::ensure_live(cancel)?;
        let node_id = plan.node.id.clone();
        let stored = self.apply(&collection_id, plan.batch).await?;
        let inserted = Self::stored_copy(stored, &node_id, plan.node);

        tracing::info!(
            "Inserted node '{}' into collection '{}' at sequence {} ({} sibling shift(s))",
            inserted.id,
            collection_id,
            inserted.sequence,
            plan.siblings_shifted
        );
        self.emit_event(TreeEvent::NodeInserted(inserted.clone()));

        Ok(inserted)
    }

    /// Delete a node with its subtree and close the gap it leaves
    ///
    /// Returns the number of removed nodes.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the node is absent from the collection
    /// - `ImportLocked` if the node or any descendant is import-locked
    pub async fn delete_node(
        &self,
        collection_id: &str,
        node_id: &str,
        cancel: &CancellationToken,
    ) -> Result<usize, TreeOperationError> {
        let _guard = self.lock_collection(collection_id, cancel).await?;

        Self::ensure_live(cancel)?;
        let node = self.load_node(collection_id, node_id).await?;
        check_mutable(&node)?;

        Self::ensure_live(cancel)?;
        let collection_nodes = self
            .store
            .find_nodes(collection_id, ParentFilter::Any)
            .await?;

        let subtree_ids = descendants(&collection_nodes, &node.id);
        check_subtree_mutable(
            collection_nodes
                .iter()
                .filter(|n| subtree_ids.contains(&n.id)),
        )?;

        let plan = plan_delete(&collection_nodes, &node);

        Self::ensure_live(cancel)?;
        self.apply(collection_id, plan.batch).await?;

        tracing::info!(
            "Deleted node '{}' and {} descendant(s) from collection '{}'",
            node.id,
            plan.removed - 1,
            collection_id
        );
        self.emit_event(TreeEvent::NodeDeleted {
            collection_id: collection_id.to_string(),
            node_id: node.id,
            removed: plan.removed,
        });

        Ok(plan.removed)
    }

    /// Rebuild dense sequences for every damaged sibling group
    ///
    /// Returns the number of renumbered nodes (0 for a healthy collection).
    pub async fn repair_collection(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<usize, TreeOperationError> {
        let _guard = self.lock_collection(collection_id, cancel).await?;
        Self::ensure_live(cancel)?;
        self.repair_locked(collection_id).await
    }

    /// Repair body; caller must hold the collection lock
    async fn repair_locked(&self, collection_id: &str) -> Result<usize, TreeOperationError> {
        let collection_nodes = self
            .store
            .find_nodes(collection_id, ParentFilter::Any)
            .await?;

        let renumbered = plan_repair(&collection_nodes);
        if renumbered.is_empty() {
            return Ok(0);
        }

        let count = renumbered.len();
        let mut batch = WriteBatch::new();
        batch.stage_updates(renumbered);
        self.store.apply_batch(batch).await?;

        tracing::info!(
            "Repaired collection '{}': renumbered {} node(s)",
            collection_id,
            count
        );
        self.emit_event(TreeEvent::CollectionRepaired {
            collection_id: collection_id.to_string(),
            renumbered: count,
        });

        Ok(count)
    }

    /// Get a node of a collection
    pub async fn get_node(
        &self,
        collection_id: &str,
        node_id: &str,
    ) -> Result<ClassNode, TreeOperationError> {
        self.load_node(collection_id, node_id).await
    }

    /// Children of `parent_id` (roots when `None`) ordered by sequence
    pub async fn children(
        &self,
        collection_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<ClassNode>, TreeOperationError> {
        Ok(self
            .store
            .find_nodes(collection_id, ParentFilter::from(parent_id))
            .await?)
    }

    /// Every node of a collection ordered by sequence
    pub async fn collection_nodes(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ClassNode>, TreeOperationError> {
        Ok(self
            .store
            .find_nodes(collection_id, ParentFilter::Any)
            .await?)
    }

    /// Check sequence density, acyclicity and parent presence for a collection
    pub async fn check_integrity(
        &self,
        collection_id: &str,
    ) -> Result<IntegrityReport, TreeOperationError> {
        let nodes = self.collection_nodes(collection_id).await?;
        Ok(check_integrity(&nodes))
    }
}
