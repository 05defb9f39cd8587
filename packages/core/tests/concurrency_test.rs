//! Concurrency and Failure Tests
//!
//! Exercises the engine under concurrent writers, external version bumps,
//! slow stores and partially applied batches.

#[cfg(test)]
mod concurrency_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use classnode_core::db::{InMemoryNodeStore, NodeStore, StoreError, TreeEvent, WriteBatch};
    use classnode_core::models::{ClassNode, NodeContentUpdate, ParentFilter};
    use classnode_core::operations::{
        ConflictRetryQueue, ErrorKind, InsertNodeParams, MoveNodeParams, TreeOperationError,
        UpdateNodeParams,
    };
    use classnode_core::services::{EngineConfig, TreeMutationEngine};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::assert_ok;
    use tokio_util::sync::CancellationToken;

    const C1: &str = "C1";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }

    fn node(id: &str, parent: Option<&str>, seq: i64) -> ClassNode {
        ClassNode::new_with_id(id, C1, parent.map(str::to_string), seq, id, "lesson")
    }

    /// `(id, parent, sequence)` for every node, sorted by id
    async fn layout(store: &InMemoryNodeStore) -> Result<Vec<(String, Option<String>, i64)>> {
        let mut nodes: Vec<_> = store
            .find_nodes(C1, ParentFilter::Any)
            .await?
            .into_iter()
            .map(|n| (n.id, n.parent_id, n.sequence))
            .collect();
        nodes.sort();
        Ok(nodes)
    }

    async fn seeded(nodes: Vec<ClassNode>) -> (TreeMutationEngine, Arc<InMemoryNodeStore>) {
        init_tracing();
        let store = Arc::new(InMemoryNodeStore::new());
        store.seed(nodes).await;
        (TreeMutationEngine::new(store.clone()), store)
    }

    /// Store wrapper that can stall reads and simulate a concurrent writer
    struct InstrumentedStore {
        inner: InMemoryNodeStore,
        read_delay: Duration,
        /// Bump the version of one batched node right before the next batch lands
        meddle: AtomicBool,
    }

    impl InstrumentedStore {
        fn new(read_delay: Duration) -> Self {
            Self {
                inner: InMemoryNodeStore::new(),
                read_delay,
                meddle: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl NodeStore for InstrumentedStore {
        async fn get_node(
            &self,
            collection_id: &str,
            node_id: &str,
        ) -> Result<Option<ClassNode>, StoreError> {
            self.inner.get_node(collection_id, node_id).await
        }

        async fn find_nodes(
            &self,
            collection_id: &str,
            filter: ParentFilter,
        ) -> Result<Vec<ClassNode>, StoreError> {
            if !self.read_delay.is_zero() {
                tokio::time::sleep(self.read_delay).await;
            }
            self.inner.find_nodes(collection_id, filter).await
        }

        async fn update_node(&self, node: ClassNode) -> Result<ClassNode, StoreError> {
            self.inner.update_node(node).await
        }

        async fn apply_batch(&self, batch: WriteBatch) -> Result<Vec<ClassNode>, StoreError> {
            if self.meddle.swap(false, Ordering::SeqCst) {
                if let Some(write) = batch.writes().first() {
                    let current = self
                        .inner
                        .get_node(write.collection_id(), write.node_id())
                        .await?;
                    if let Some(current) = current {
                        self.inner.update_node(current).await?;
                    }
                }
            }
            self.inner.apply_batch(batch).await
        }
    }

    async fn instrumented(
        nodes: Vec<ClassNode>,
        read_delay: Duration,
        config: EngineConfig,
    ) -> Result<(Arc<TreeMutationEngine>, Arc<InstrumentedStore>)> {
        init_tracing();
        let store = Arc::new(InstrumentedStore::new(read_delay));
        store.inner.seed(nodes).await;
        let engine = TreeMutationEngine::with_config(store.clone(), config)?;
        Ok((Arc::new(engine), store))
    }

    fn fast_retries() -> EngineConfig {
        EngineConfig {
            retry_base_backoff_ms: 1,
            ..EngineConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_moves_keep_collection_dense() -> Result<()> {
        let roots = ["r0", "r1", "r2", "r3"];
        let mut nodes = Vec::new();
        for (i, root) in roots.iter().enumerate() {
            nodes.push(node(root, None, i as i64 + 1));
            for j in 0..4 {
                let id = format!("{}-c{}", root, j);
                nodes.push(node(&id, Some(*root), j + 1));
            }
        }
        let total = nodes.len();
        let (engine, _store) = instrumented(nodes, Duration::ZERO, fast_retries()).await?;

        let mut handles = Vec::new();
        for k in 0..32usize {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let subject = format!("r{}-c{}", k % 4, (k / 4) % 4);
                let target = roots[(k * 3 + 1) % roots.len()].to_string();
                let params = MoveNodeParams::new(C1, subject, Some(target), (k % 6) as i64);
                engine.move_node(params, &CancellationToken::new()).await
            }));
        }

        for handle in handles {
            assert_ok!(handle.await?);
        }

        let report = engine.check_integrity(C1).await?;
        assert!(report.is_healthy(), "{:?}", report);
        assert_eq!(engine.collection_nodes(C1).await?.len(), total);
        Ok(())
    }

    #[tokio::test]
    async fn test_external_write_surfaces_as_conflict_without_repair() -> Result<()> {
        let (engine, store) = instrumented(
            vec![node("A", None, 1), node("B", None, 2), node("C", None, 3)],
            Duration::ZERO,
            fast_retries(),
        )
        .await?;
        store.meddle.store(true, Ordering::SeqCst);
        let mut rx = engine.subscribe();

        let err = engine
            .move_node(MoveNodeParams::new(C1, "A", None, 3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        let roots: Vec<i64> = engine
            .children(C1, None)
            .await?
            .into_iter()
            .map(|n| n.sequence)
            .collect();
        assert_eq!(roots, vec![1, 2, 3]);
        // Conflicts are left to the caller; no repair event is sent
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_queue_recovers_from_conflict() -> Result<()> {
        let (engine, store) = instrumented(
            vec![node("X", None, 1), node("Y", None, 2), node("Z", None, 3)],
            Duration::ZERO,
            fast_retries(),
        )
        .await?;
        store.meddle.store(true, Ordering::SeqCst);
        let queue = ConflictRetryQueue::new(engine.clone());

        let updated = queue
            .update_node(
                UpdateNodeParams::new(C1, "Z").with_sequence(1),
                &CancellationToken::new(),
            )
            .await?;

        assert_eq!(updated.sequence, 1);
        let order: Vec<String> = engine
            .children(C1, None)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(order, vec!["Z", "X", "Y"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_lock_timeout_when_collection_busy() -> Result<()> {
        let config = EngineConfig {
            lock_timeout_ms: 20,
            ..EngineConfig::default()
        };
        let (engine, _store) = instrumented(
            vec![node("A", None, 1), node("B", None, 2)],
            Duration::from_millis(300),
            config,
        )
        .await?;

        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_node(MoveNodeParams::new(C1, "A", None, 2), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = engine
            .move_node(MoveNodeParams::new(C1, "B", None, 2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TreeOperationError::LockTimeout { timeout_ms: 20, .. }));
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        assert_ok!(slow.await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_lock() -> Result<()> {
        let (engine, store) = instrumented(
            vec![node("A", None, 1), node("B", None, 2)],
            Duration::from_millis(200),
            EngineConfig::default(),
        )
        .await?;

        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_node(MoveNodeParams::new(C1, "A", None, 2), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = engine
            .move_node(MoveNodeParams::new(C1, "B", None, 1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeOperationError::Cancelled));

        assert_ok!(slow.await?);
        // Only the first move landed: A and B swapped once
        assert_eq!(store.inner.writes_applied(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_batch_failure_is_repaired() -> Result<()> {
        init_tracing();
        let store = Arc::new(InMemoryNodeStore::new());
        store
            .seed(vec![
                node("A", None, 1),
                node("B", None, 2),
                node("C", None, 3),
                node("D", None, 4),
            ])
            .await;
        let engine = TreeMutationEngine::new(store.clone());
        let mut rx = engine.subscribe();

        store.fail_next_batch(1, "connection reset");
        let err = engine
            .move_node(MoveNodeParams::new(C1, "A", None, 4), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_retryable());

        let report = engine.check_integrity(C1).await?;
        assert!(report.is_healthy(), "{:?}", report);

        let event = rx.try_recv()?;
        assert!(matches!(event, TreeEvent::CollectionRepaired { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_left_alone_when_repair_disabled() -> Result<()> {
        init_tracing();
        let store = Arc::new(InMemoryNodeStore::new());
        store
            .seed(vec![node("A", None, 1), node("B", None, 2), node("C", None, 3)])
            .await;
        let config = EngineConfig::from_json_str(r#"{"repair_on_write_failure": false}"#)?;
        let engine = TreeMutationEngine::with_config(store.clone(), config)?;
        let cancel = CancellationToken::new();

        store.fail_next_batch(1, "disk full");
        assert!(engine
            .move_node(MoveNodeParams::new(C1, "A", None, 3), &cancel)
            .await
            .is_err());
        assert!(!engine.check_integrity(C1).await?.is_healthy());

        let renumbered = engine.repair_collection(C1, &cancel).await?;
        assert!(renumbered > 0);
        assert!(engine.check_integrity(C1).await?.is_healthy());
        assert_eq!(engine.repair_collection(C1, &cancel).await?, 0);
        Ok(())
    }

    /// Old group's gap closed, destination group's gap not yet opened, and
    /// every other cut point of the same batch
    #[tokio::test]
    async fn test_cross_parent_move_interrupted_at_every_write() -> Result<()> {
        let fixture = || {
            vec![
                node("A", None, 1),
                node("B", None, 2),
                node("C", None, 3),
                node("P", None, 4),
                node("p1", Some("P"), 1),
                node("p2", Some("P"), 2),
            ]
        };
        let params = || MoveNodeParams::new(C1, "B", Some("P".to_string()), 2);
        let cancel = CancellationToken::new();

        let batch_len = {
            let (engine, store) = seeded(fixture()).await;
            engine.move_node(params(), &cancel).await?;
            store.writes_applied()
        };
        assert!(batch_len >= 4, "expected closes, opens and the move, got {}", batch_len);

        for applied in 0..batch_len {
            let (engine, store) = seeded(fixture()).await;
            let before = layout(&store).await?;

            store.fail_next_batch(applied, "connection reset");
            let err = engine.move_node(params(), &cancel).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Internal, "applied={}", applied);

            let report = engine.check_integrity(C1).await?;
            assert!(report.is_healthy(), "applied={}: {:?}", applied, report);
            assert_eq!(layout(&store).await?, before, "applied={}", applied);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reorder_is_repaired_without_content_change() -> Result<()> {
        let (engine, store) = seeded(vec![
            node("X", None, 1),
            node("Y", None, 2),
            node("Z", None, 3),
            node("W", None, 4),
        ])
        .await;
        let before = layout(&store).await?;

        store.fail_next_batch(1, "connection reset");
        let err = engine
            .update_node(
                UpdateNodeParams::new(C1, "W")
                    .with_sequence(2)
                    .with_content(NodeContentUpdate::new().with_title("Capstone")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(engine.check_integrity(C1).await?.is_healthy());
        assert_eq!(layout(&store).await?, before);
        assert_eq!(engine.get_node(C1, "W").await?.title, "W");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_insert_is_repaired() -> Result<()> {
        let (engine, store) = seeded(vec![node("A", None, 1), node("B", None, 2), node("C", None, 3)]).await;
        let before = layout(&store).await?;

        store.fail_next_batch(2, "connection reset");
        let err = engine
            .insert_node(
                InsertNodeParams::new(C1, None, "Warm-up", "lesson")
                    .with_id("R")
                    .at_sequence(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(engine.check_integrity(C1).await?.is_healthy());
        assert_eq!(layout(&store).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_subtree_delete_never_orphans() -> Result<()> {
        let fixture = || {
            vec![
                node("A", None, 1),
                node("B", None, 2),
                node("C", None, 3),
                node("b1", Some("B"), 1),
                node("b2", Some("B"), 2),
                node("b11", Some("b1"), 1),
            ]
        };
        let cancel = CancellationToken::new();

        // Four deletes plus closing the root gap
        for applied in 0..5 {
            let (engine, store) = seeded(fixture()).await;

            store.fail_next_batch(applied, "connection reset");
            let err = engine.delete_node(C1, "B", &cancel).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Internal, "applied={}", applied);

            let report = engine.check_integrity(C1).await?;
            assert!(report.is_healthy(), "applied={}: {:?}", applied, report);
            assert_eq!(
                engine.collection_nodes(C1).await?.len(),
                6 - applied.min(4),
                "applied={}",
                applied
            );
        }
        Ok(())
    }
}
