//! Migration coordinator: plans and runs key moves for membership changes.
//!
//! Each key is read from the source, written to the destination, read back
//! and only then deleted from the source. The first failure undoes every
//! completed move, newest first, so the caller can restore the previous
//! membership with the data exactly where it was.

use crate::error::MembershipError;
use crate::metrics::StoreMetrics;
use crate::node::SharedNode;
use crate::partitioning::HashRing;
use crate::rebalancing::transfer::{
    MigrationReport, TransferEntry, TransferKind, TransferPlan, TransferProgress,
};
use crate::types::{Record, Slot};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Plans and executes migrations between nodes.
#[derive(Debug)]
pub struct MigrationCoordinator {
    /// Read each record back from the destination before deleting it.
    verify: bool,
    metrics: Arc<StoreMetrics>,
}

impl MigrationCoordinator {
    /// Create a coordinator.
    pub fn new(verify: bool, metrics: Arc<StoreMetrics>) -> Self {
        Self { verify, metrics }
    }

    /// Plan the transfer for a node that was inserted at `new_slot`.
    ///
    /// Only the newcomer's pre-insertion successor can lose keys; of its
    /// keys, those the new membership assigns to `new_slot` move.
    /// Returns `None` when there is nothing to move.
    pub async fn plan_join(
        &self,
        before: &HashRing<SharedNode>,
        after: &HashRing<SharedNode>,
        new_slot: Slot,
    ) -> Result<Option<TransferPlan>, MembershipError> {
        let Some((_, source)) = before.successor_of(new_slot) else {
            return Ok(None);
        };
        let destination = after
            .member_at(new_slot)
            .ok_or_else(|| migration_failed(format!("no member at slot {new_slot}")))?;

        let held = source.keys().await.map_err(|e| {
            migration_failed(format!("listing keys on {}: {e}", source.info().host))
        })?;

        let mut keys = Vec::new();
        for key in held {
            if after.owner_slot(&key)? == new_slot {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Ok(None);
        }
        keys.sort();

        Ok(Some(TransferPlan {
            kind: TransferKind::Join,
            source: source.clone(),
            destination: destination.clone(),
            keys,
        }))
    }

    /// Plan the transfer for `removed`, which sat at `removed_slot` before
    /// being taken out of `after`.
    ///
    /// Every key it holds moves to the member that now owns its range.
    /// Fails when the node holds keys and no member is left to take them.
    pub async fn plan_leave(
        &self,
        after: &HashRing<SharedNode>,
        removed: &SharedNode,
        removed_slot: Slot,
    ) -> Result<Option<TransferPlan>, MembershipError> {
        let mut keys = removed.keys().await.map_err(|e| {
            migration_failed(format!("listing keys on {}: {e}", removed.info().host))
        })?;

        if keys.is_empty() {
            return Ok(None);
        }

        let Some((_, destination)) = after.successor_of(removed_slot) else {
            return Err(migration_failed(format!(
                "{} holds {} keys and has no successor",
                removed.info().host,
                keys.len()
            )));
        };
        keys.sort();

        Ok(Some(TransferPlan {
            kind: TransferKind::Leave,
            source: removed.clone(),
            destination: destination.clone(),
            keys,
        }))
    }

    /// Move every key in `plan`.
    ///
    /// On failure, completed moves are rolled back and the error says why
    /// the migration stopped (and whether rollback itself hit trouble).
    pub async fn execute(&self, plan: &TransferPlan) -> Result<MigrationReport, MembershipError> {
        let source_host = plan.source.info().host.clone();
        let destination_host = plan.destination.info().host.clone();

        self.metrics.migrations_started.inc();
        info!(
            kind = ?plan.kind,
            from = %source_host,
            to = %destination_host,
            keys = plan.len(),
            "Starting migration"
        );

        let declared_before: HashSet<String> = match plan.destination.declared_attributes().await {
            Ok(attributes) => attributes.into_iter().collect(),
            Err(e) => {
                self.metrics.migrations_failed.inc();
                return Err(migration_failed(format!(
                    "listing attributes on {destination_host}: {e}"
                )));
            }
        };

        let mut progress = TransferProgress::new(plan.len());

        for key in &plan.keys {
            if let Err(reason) = self.move_key(plan, key, &mut progress).await {
                error!(
                    from = %source_host,
                    to = %destination_host,
                    key = %key,
                    moved = progress.moved(),
                    error = %reason,
                    "Migration failed, rolling back"
                );
                self.metrics.migrations_failed.inc();

                let rollback_errors = self.rollback(plan, &progress, &declared_before).await;
                let reason = if rollback_errors.is_empty() {
                    reason
                } else {
                    format!("{reason}; rollback incomplete: {}", rollback_errors.join("; "))
                };
                return Err(MembershipError::MigrationFailed { reason });
            }
        }

        self.metrics.migrations_completed.inc();
        self.metrics.keys_migrated.inc_by(progress.moved() as u64);
        info!(
            from = %source_host,
            to = %destination_host,
            moved = progress.moved(),
            skipped = progress.skipped,
            elapsed_ms = progress.elapsed().as_millis() as u64,
            "Migration complete"
        );

        Ok(MigrationReport {
            source: source_host,
            destination: destination_host,
            moved: progress.moved(),
            skipped: progress.skipped,
        })
    }

    /// Copy, verify and remove one key. When it fails the destination is
    /// left holding what it held before.
    async fn move_key(
        &self,
        plan: &TransferPlan,
        key: &str,
        progress: &mut TransferProgress,
    ) -> Result<(), String> {
        let Some(record) = plan
            .source
            .get(key)
            .await
            .map_err(|e| format!("reading {key} from source: {e}"))?
        else {
            debug!(key, "Key vanished from source before transfer");
            progress.skipped += 1;
            return Ok(());
        };

        let previous = plan
            .destination
            .get(key)
            .await
            .map_err(|e| format!("reading {key} from destination: {e}"))?;

        plan.destination
            .set(key, record.clone())
            .await
            .map_err(|e| format!("writing {key} to destination: {e}"))?;

        let placed = async {
            if self.verify {
                match plan.destination.get(key).await {
                    Ok(Some(copy)) if copy == record => {}
                    Ok(Some(_)) => return Err(format!("{key} differs on destination after write")),
                    Ok(None) => return Err(format!("{key} missing on destination after write")),
                    Err(e) => return Err(format!("verifying {key} on destination: {e}")),
                }
            }
            plan.source
                .delete(key)
                .await
                .map(|_| ())
                .map_err(|e| format!("deleting {key} from source: {e}"))
        }
        .await;

        if let Err(reason) = placed {
            if let Err(e) = restore(&plan.destination, key, previous.as_ref()).await {
                warn!(key, error = %e, "Failed to discard partial copy on destination");
                return Err(format!("{reason}; restoring {key} on destination: {e}"));
            }
            return Err(reason);
        }

        debug!(key, overwrote = previous.is_some(), "Migrated key");
        progress
            .journal
            .push(TransferEntry::new(key, record).with_previous(previous));
        Ok(())
    }

    /// Undo completed moves, newest first, then drop attribute kinds the
    /// migration declared on the destination. Returns a description of
    /// every step that failed.
    async fn rollback(
        &self,
        plan: &TransferPlan,
        progress: &TransferProgress,
        declared_before: &HashSet<String>,
    ) -> Vec<String> {
        let mut failures = Vec::new();

        for entry in progress.journal.iter().rev() {
            if let Err(e) = plan.source.set(&entry.key, entry.record.clone()).await {
                failures.push(format!("restoring {} on source: {e}", entry.key));
                continue;
            }
            if let Err(e) = restore(&plan.destination, &entry.key, entry.previous.as_ref()).await {
                failures.push(format!("restoring {} on destination: {e}", entry.key));
                continue;
            }
            self.metrics.keys_rolled_back.inc();
        }

        match plan.destination.declared_attributes().await {
            Ok(declared) => {
                for attribute in declared {
                    if declared_before.contains(&attribute) {
                        continue;
                    }
                    match plan.destination.forget_attribute(&attribute).await {
                        Ok(true) => debug!(attribute = %attribute, "Forgot attribute kind"),
                        Ok(false) => failures.push(format!(
                            "attribute {attribute} still in use on destination"
                        )),
                        Err(e) => {
                            failures.push(format!("forgetting attribute {attribute}: {e}"))
                        }
                    }
                }
            }
            Err(e) => failures.push(format!("listing attributes on destination: {e}")),
        }

        if failures.is_empty() {
            warn!(restored = progress.moved(), "Migration rolled back");
        } else {
            error!(failures = failures.len(), "Migration rollback incomplete");
        }
        failures
    }
}

/// Put `key` on `node` back to `previous`, deleting it when there was none.
async fn restore(
    node: &SharedNode,
    key: &str,
    previous: Option<&Record>,
) -> crate::error::Result<()> {
    match previous {
        Some(record) => node.set(key, record.clone()).await,
        None => node.delete(key).await.map(|_| ()),
    }
}

fn migration_failed(reason: String) -> MembershipError {
    MembershipError::MigrationFailed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeClient, StorageNode};
    use crate::testing::FaultyNode;
    use crate::types::{NodeInfo, Record, RING_SIZE};

    fn storage(host: &str) -> Arc<StorageNode> {
        Arc::new(StorageNode::new(NodeInfo::new(host, host)))
    }

    fn shared<N: NodeClient + 'static>(node: &Arc<N>) -> SharedNode {
        node.clone()
    }

    fn coordinator() -> MigrationCoordinator {
        MigrationCoordinator::new(true, Arc::new(StoreMetrics::new()))
    }

    fn ring(nodes: &[SharedNode]) -> HashRing<SharedNode> {
        let mut ring = HashRing::new(RING_SIZE);
        for node in nodes {
            ring.insert(node.clone()).unwrap();
        }
        ring
    }

    fn fill(node: &StorageNode, count: usize) {
        for i in 0..count {
            node.set(&format!("key-{i}"), Record::new().with("i", i as i64))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_plan_join_on_empty_ring() {
        let n1: SharedNode = storage("host1");
        let before = ring(&[]);
        let after = ring(&[n1]);

        let plan = coordinator().plan_join(&before, &after, 39909).await.unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn test_plan_join_selects_claimed_keys() {
        let n1 = storage("host1");
        fill(&n1, 200);
        let n2 = storage("host2");

        let before = ring(&[shared(&n1)]);
        let after = ring(&[shared(&n1), shared(&n2)]);

        let plan = coordinator()
            .plan_join(&before, &after, 2751)
            .await
            .unwrap()
            .expect("host2 should claim some keys");

        assert_eq!(plan.kind, TransferKind::Join);
        assert_eq!(plan.source.info().host, "host1");
        assert_eq!(plan.destination.info().host, "host2");
        for key in &plan.keys {
            assert_eq!(after.owner(key).unwrap().info().host, "host2");
        }
        let staying = n1.keys().len() - plan.len();
        assert!(staying > 0);
    }

    #[tokio::test]
    async fn test_execute_moves_keys() {
        let n1 = storage("host1");
        fill(&n1, 200);
        let n2 = storage("host2");

        let before = ring(&[shared(&n1)]);
        let after = ring(&[shared(&n1), shared(&n2)]);
        let coordinator = coordinator();
        let plan = coordinator
            .plan_join(&before, &after, 2751)
            .await
            .unwrap()
            .unwrap();

        let report = coordinator.execute(&plan).await.unwrap();

        assert_eq!(report.moved, plan.len());
        assert_eq!(n1.len() + n2.len(), 200);
        for key in &plan.keys {
            assert!(n2.contains(key));
            assert!(!n1.contains(key));
        }
    }

    #[tokio::test]
    async fn test_execute_rolls_back_on_failure() {
        let n1 = storage("host1");
        fill(&n1, 200);
        let inner = storage("host2");
        let n2 = Arc::new(FaultyNode::new(inner.clone()));
        n2.fail_sets_after(5);

        let before = ring(&[shared(&n1)]);
        let after = ring(&[shared(&n1), shared(&n2)]);
        let metrics = Arc::new(StoreMetrics::new());
        let coordinator = MigrationCoordinator::new(true, metrics.clone());
        let plan = coordinator
            .plan_join(&before, &after, 2751)
            .await
            .unwrap()
            .unwrap();
        assert!(plan.len() > 5);

        let err = coordinator.execute(&plan).await.unwrap_err();

        assert!(matches!(err, MembershipError::MigrationFailed { .. }));
        assert_eq!(n1.len(), 200);
        assert!(inner.is_empty());
        assert!(inner.declared_attributes().is_empty());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.migrations_failed, 1);
        assert_eq!(snapshot.keys_rolled_back, 5);
    }

    #[tokio::test]
    async fn test_verify_detects_corruption() {
        let n1 = storage("host1");
        fill(&n1, 50);
        let inner = storage("host2");
        let n2 = Arc::new(FaultyNode::new(inner.clone()));
        n2.corrupt_reads(true);

        let before = ring(&[shared(&n1)]);
        let after = ring(&[shared(&n1), shared(&n2)]);
        let coordinator = coordinator();
        let plan = coordinator
            .plan_join(&before, &after, 2751)
            .await
            .unwrap()
            .unwrap();

        let err = coordinator.execute(&plan).await.unwrap_err();
        assert!(err.to_string().contains("differs on destination"));
        assert_eq!(n1.len(), 50);
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_plan_leave() {
        let n1 = storage("host1");
        let n2 = storage("host2");
        fill(&n2, 10);
        let removed = shared(&n2);
        let after = ring(&[shared(&n1)]);

        let plan = coordinator()
            .plan_leave(&after, &removed, 2751)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.kind, TransferKind::Leave);
        assert_eq!(plan.len(), 10);
        assert_eq!(plan.destination.info().host, "host1");
    }

    #[tokio::test]
    async fn test_plan_leave_last_node() {
        let n1 = storage("host1");
        let removed = shared(&n1);
        let empty = ring(&[]);

        // Nothing held: nothing to plan.
        assert!(coordinator()
            .plan_leave(&empty, &removed, 39909)
            .await
            .unwrap()
            .is_none());

        fill(&n1, 1);
        let err = coordinator()
            .plan_leave(&empty, &removed, 39909)
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::MigrationFailed { .. }));
    }
}
