//! Conflict retry queue for tree mutations
//!
//! The engine never retries on its own: a `VersionConflict` means another
//! writer changed the tree between read and write, and the right response is
//! a fresh read. This wrapper re-runs a whole operation on conflict with
//! exponential backoff, for callers that want eventual success over an
//! immediate error.
//!
//! # Example
//!
//! ```rust,no_run
//! use classnode_core::db::InMemoryNodeStore;
//! use classnode_core::operations::{ConflictRetryQueue, MoveNodeParams};
//! use classnode_core::services::TreeMutationEngine;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(TreeMutationEngine::new(Arc::new(InMemoryNodeStore::new())));
//! let queue = ConflictRetryQueue::new(engine);
//!
//! // Retries use the engine config: 3 retries, backoff 10ms, 20ms, 40ms
//! queue
//!     .move_node(MoveNodeParams::new("class-101", "lesson-3", None, 1), &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::models::ClassNode;
use crate::operations::{MoveNodeParams, TreeOperationError, UpdateNodeParams};
use crate::services::TreeMutationEngine;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Re-runs engine operations on version conflicts
pub struct ConflictRetryQueue {
    engine: Arc<TreeMutationEngine>,
    max_retries: usize,
}

impl ConflictRetryQueue {
    /// Create a queue using the engine's configured retry limit
    pub fn new(engine: Arc<TreeMutationEngine>) -> Self {
        let max_retries = engine.config().max_conflict_retries;
        Self {
            engine,
            max_retries,
        }
    }

    /// Override the retry limit (0 = single attempt, no retries)
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, or the
    /// retry budget is spent
    ///
    /// # Retry Behavior
    ///
    /// - **Retry on**: conflicts only (`TreeOperationError::is_retryable`)
    /// - **Backoff**: `retry_base_backoff_ms * 2^attempt`
    /// - **Cancellation**: a cancelled token stops retrying with `Cancelled`
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, TreeOperationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TreeOperationError>>,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!("{} succeeded after {} retry(ies)", label, attempt);
                    }
                    return Ok(value);
                }

                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.engine.config().retry_backoff(attempt);
                    tracing::debug!(
                        "{} conflicted on attempt {}/{}: {}. Retrying in {:?}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        err,
                        backoff
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(TreeOperationError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }

                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(
                            "Max retries ({}) exceeded for {}",
                            self.max_retries,
                            label
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// `TreeMutationEngine::move_node` with conflict retries
    pub async fn move_node(
        &self,
        params: MoveNodeParams,
        cancel: &CancellationToken,
    ) -> Result<ClassNode, TreeOperationError> {
        let label = format!("move of node '{}'", params.node_id);
        self.run(&label, cancel, || self.engine.move_node(params.clone(), cancel))
            .await
    }

    /// `TreeMutationEngine::update_node` with conflict retries
    pub async fn update_node(
        &self,
        params: UpdateNodeParams,
        cancel: &CancellationToken,
    ) -> Result<ClassNode, TreeOperationError> {
        let label = format!("update of node '{}'", params.node_id);
        self.run(&label, cancel, || self.engine.update_node(params.clone(), cancel))
            .await
    }
}
