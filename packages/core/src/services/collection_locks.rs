//! Per-collection mutation locks
//!
//! Cycle detection and reindexing both read the whole current state of a
//! collection. Two structural mutations interleaving their reads against the
//! same collection could each plan a valid batch that jointly breaks sequence
//! density, so all structural mutations of one collection run one at a time.
//! Read-only queries do not take the lock.

use crate::operations::TreeOperationError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Guard held for the duration of one structural mutation
pub type CollectionGuard = OwnedMutexGuard<()>;

/// Registry of one async mutex per collection id
#[derive(Debug, Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, collection_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop idle entries so the registry does not grow with every collection ever touched
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(collection_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the collection's lock, waiting at most `timeout`
    ///
    /// Returns `Cancelled` if `cancel` fires while waiting.
    pub async fn acquire(
        &self,
        collection_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CollectionGuard, TreeOperationError> {
        let lock = self.lock_for(collection_id);

        if let Ok(guard) = lock.clone().try_lock_owned() {
            return Ok(guard);
        }
        tracing::debug!("Waiting for mutation lock on collection '{}'", collection_id);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TreeOperationError::Cancelled),
            acquired = tokio::time::timeout(timeout, lock.lock_owned()) => {
                acquired.map_err(|_| {
                    tracing::warn!(
                        "Timed out waiting {:?} for collection '{}'",
                        timeout,
                        collection_id
                    );
                    TreeOperationError::lock_timeout(collection_id, timeout.as_millis() as u64)
                })
            }
        }
    }

    /// Number of collections with a live lock entry
    pub fn tracked_collections(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
