//! In-Memory NodeStore
//!
//! A `NodeStore` backed by a map guarded by a `tokio::sync::RwLock`. Batches
//! are validated in full under the write lock before anything is applied,
//! which makes `apply_batch` atomic in the same way a database transaction
//! would be.
//!
//! The store also supports fault injection (`fail_next_batch`) so callers can
//! exercise the partial-write repair path that a non-transactional backend
//! would need.

use crate::db::{NodeStore, NodeWrite, StoreError, WriteBatch};
use crate::models::{ClassNode, ParentFilter};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Nodes of one collection keyed by node ID
type CollectionMap = BTreeMap<String, ClassNode>;

#[derive(Debug, Clone)]
struct BatchFault {
    /// Writes applied before the failure is reported
    apply_first: usize,
    reason: String,
}

/// Reference `NodeStore` used by tests, benches and embedders without a database
#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    collections: RwLock<HashMap<String, CollectionMap>>,
    fault: Mutex<Option<BatchFault>>,
    writes_applied: AtomicUsize,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert nodes as-is, without version or sequence checks
    ///
    /// Intended for fixtures; existing nodes with the same ID are replaced.
    pub async fn seed(&self, nodes: impl IntoIterator<Item = ClassNode>) {
        let mut collections = self.collections.write().await;
        for node in nodes {
            collections
                .entry(node.collection_id.clone())
                .or_default()
                .insert(node.id.clone(), node);
        }
    }

    /// Make the next `apply_batch` fail after applying its first `apply_first` writes
    ///
    /// `apply_first = 0` fails before anything lands. Larger values simulate a
    /// backend without transactions that dies halfway through a batch.
    pub fn fail_next_batch(&self, apply_first: usize, reason: impl Into<String>) {
        let mut fault = self.fault.lock().unwrap_or_else(|e| e.into_inner());
        *fault = Some(BatchFault {
            apply_first,
            reason: reason.into(),
        });
    }

    /// Total number of node writes applied since creation
    pub fn writes_applied(&self) -> usize {
        self.writes_applied.load(Ordering::SeqCst)
    }

    fn take_fault(&self) -> Option<BatchFault> {
        self.fault.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn check_write(collections: &HashMap<String, CollectionMap>, write: &NodeWrite) -> Result<(), StoreError> {
        let stored = collections
            .get(write.collection_id())
            .and_then(|nodes| nodes.get(write.node_id()));

        match (write, stored) {
            (NodeWrite::Insert(node), Some(_)) => Err(StoreError::duplicate_node(&node.id)),
            (NodeWrite::Insert(_), None) => Ok(()),
            (NodeWrite::Update(_) | NodeWrite::Delete { .. }, None) => {
                Err(StoreError::missing_node(write.node_id()))
            }
            (NodeWrite::Update(ClassNode { version, .. }), Some(current))
            | (NodeWrite::Delete { version, .. }, Some(current)) => {
                if *version != current.version {
                    Err(StoreError::version_conflict(
                        write.node_id(),
                        *version,
                        current.version,
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Apply one validated write, returning the stored node for inserts and updates
    fn apply_write(
        collections: &mut HashMap<String, CollectionMap>,
        write: NodeWrite,
    ) -> Option<ClassNode> {
        match write {
            NodeWrite::Insert(mut node) => {
                let now = Utc::now();
                node.version = 1;
                node.created_at = now;
                node.modified_at = now;
                collections
                    .entry(node.collection_id.clone())
                    .or_default()
                    .insert(node.id.clone(), node.clone());
                Some(node)
            }
            NodeWrite::Update(mut node) => {
                node.version += 1;
                node.modified_at = Utc::now();
                collections
                    .entry(node.collection_id.clone())
                    .or_default()
                    .insert(node.id.clone(), node.clone());
                Some(node)
            }
            NodeWrite::Delete {
                collection_id, id, ..
            } => {
                if let Some(nodes) = collections.get_mut(&collection_id) {
                    nodes.remove(&id);
                }
                None
            }
        }
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get_node(
        &self,
        collection_id: &str,
        node_id: &str,
    ) -> Result<Option<ClassNode>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection_id)
            .and_then(|nodes| nodes.get(node_id))
            .cloned())
    }

    async fn find_nodes(
        &self,
        collection_id: &str,
        filter: ParentFilter,
    ) -> Result<Vec<ClassNode>, StoreError> {
        let collections = self.collections.read().await;
        let mut nodes: Vec<ClassNode> = collections
            .get(collection_id)
            .map(|nodes| nodes.values().filter(|n| filter.matches(n)).cloned().collect())
            .unwrap_or_default();

        nodes.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
        Ok(nodes)
    }

    async fn update_node(&self, node: ClassNode) -> Result<ClassNode, StoreError> {
        let mut batch = WriteBatch::new();
        batch.stage_update(node);
        let mut stored = self.apply_batch(batch).await?;
        stored
            .pop()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("update produced no node")))
    }

    async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<ClassNode>, StoreError> {
        let mut collections = self.collections.write().await;

        for write in batch.writes() {
            Self::check_write(&collections, write)?;
        }

        let writes = batch.into_writes();
        let fault = self.take_fault();
        let limit = fault.as_ref().map_or(writes.len(), |f| f.apply_first);

        let mut stored = Vec::with_capacity(writes.len());
        for write in writes.into_iter().take(limit) {
            if let Some(node) = Self::apply_write(&mut collections, write) {
                stored.push(node);
            }
            self.writes_applied.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(fault) = fault {
            tracing::debug!(
                "Injected batch failure after {} write(s): {}",
                limit,
                fault.reason
            );
            return Err(StoreError::InjectedFailure(fault.reason));
        }

        Ok(stored)
    }
}
