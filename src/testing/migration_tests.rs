//! Migration E2E Test Suite
//!
//! End-to-end tests for key migration on membership change, verifying:
//! - Keys land on their new owner and leave their old one
//! - A failed migration rolls back both the data and the membership
//! - Client writes issued during a membership change are not lost
//!
//! # Test Cases
//!
//! | Scenario                     | Verification                                 |
//! |------------------------------|----------------------------------------------|
//! | Scale up (add node)          | new owner holds exactly the keys it owns     |
//! | Scale down (remove node)     | successor receives every key                 |
//! | Failed write on destination  | ring and data as before, node can rejoin     |
//! | Corrupted read-back          | detected when verification is on             |
//! | Destination had its own copy | copy restored after rollback                 |
//! | Kinds declared by migration  | forgotten after rollback                     |
//! | Writes during migration      | every write readable and correctly placed    |

#[cfg(test)]
mod tests {
    use crate::config::RingConfig;
    use crate::error::{Error, MembershipError};
    use crate::node::{NodeClient, SharedNode, StorageNode};
    use crate::partitioning::slot_for;
    use crate::store::ShardedStore;
    use crate::testing::{FaultyNode, TestCluster};
    use crate::types::{NodeInfo, Record, ScalarKind, RING_SIZE};
    use std::collections::HashMap;
    use std::sync::Arc;

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn record_for(i: usize) -> Record {
        Record::new()
            .with("index", i as i64)
            .with("team", if i % 3 == 0 { "red" } else { "blue" })
    }

    async fn fill(cluster: &TestCluster, count: usize) -> HashMap<String, Record> {
        let mut written = HashMap::new();
        for i in 0..count {
            let key = format!("key-{i}");
            cluster.store().set(&key, record_for(i)).await.unwrap();
            written.insert(key, record_for(i));
        }
        written
    }

    async fn assert_all_readable(cluster: &TestCluster, written: &HashMap<String, Record>) {
        for (key, record) in written {
            assert_eq!(
                cluster.store().get(key).await.unwrap().as_ref(),
                Some(record),
                "key {key}"
            );
        }
        assert_eq!(cluster.total_records(), written.len());
        assert!(cluster.misplaced_keys().await.unwrap().is_empty());
    }

    fn assert_migration_failed(err: &Error) {
        assert!(
            matches!(err, Error::Membership(MembershipError::MigrationFailed { .. })),
            "expected migration failure, got {err}"
        );
    }

    // =========================================================================
    // Successful migrations
    // =========================================================================

    #[tokio::test]
    async fn test_add_node_moves_owned_keys() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let written = fill(&cluster, 300).await;

        cluster.add_host("host2").await.unwrap();

        let host1 = cluster.node("host1").unwrap();
        let host2 = cluster.node("host2").unwrap();
        assert!(!host2.is_empty());
        for key in written.keys() {
            let owner = cluster.store().owner_of(key).await.unwrap().host;
            let (holder, other) = if owner == "host2" {
                (host2, host1)
            } else {
                (host1, host2)
            };
            assert!(holder.contains(key), "{key} missing on {owner}");
            assert!(!other.contains(key), "{key} left behind");
        }
        assert_all_readable(&cluster, &written).await;

        let metrics = cluster.store().metrics();
        assert_eq!(metrics.migrations_completed, 1);
        assert_eq!(metrics.keys_migrated, host2.len() as u64);
    }

    #[tokio::test]
    async fn test_add_node_only_touches_successor() {
        let mut cluster = TestCluster::new(&["host1", "host2", "host3"]).await.unwrap();
        let written = fill(&cluster, 400).await;
        let host2_before = cluster.node("host2").unwrap().keys();

        // host4 (19568) lands between host2 (2751) and host1 (39909).
        cluster.add_host("host4").await.unwrap();

        let mut host2_after = cluster.node("host2").unwrap().keys();
        let mut host2_before = host2_before;
        host2_before.sort();
        host2_after.sort();
        assert_eq!(host2_before, host2_after);
        assert_all_readable(&cluster, &written).await;
    }

    #[tokio::test]
    async fn test_rm_node_hands_keys_to_successor() {
        let mut cluster = TestCluster::new(&["host1", "host2", "host3", "host4"])
            .await
            .unwrap();
        let written = fill(&cluster, 500).await;
        let host3_keys = cluster.node("host3").unwrap().keys();
        assert!(!host3_keys.is_empty());

        // host3 (51338) has no member above it, so its range wraps to host2.
        assert_eq!(cluster.remove_host("host3").await.unwrap(), 51338);

        assert!(cluster.node("host3").unwrap().is_empty());
        for key in &host3_keys {
            assert!(cluster.node("host2").unwrap().contains(key));
        }
        assert_eq!(cluster.hosts(), ["host1", "host2", "host4"]);
        assert_all_readable(&cluster, &written).await;
        assert_eq!(cluster.store().metrics().nodes_removed, 1);
    }

    #[tokio::test]
    async fn test_reverse_lookup_after_rebalancing() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        fill(&cluster, 120).await;

        cluster.add_host("host2").await.unwrap();
        cluster.add_host("host3").await.unwrap();
        cluster.remove_host("host1").await.unwrap();

        let mut keys = cluster.store().reverse_lookup("red", "team").await.unwrap().keys;
        keys.sort();
        let mut expected: Vec<_> = (0..120)
            .filter(|i| i % 3 == 0)
            .map(|i| format!("key-{i}"))
            .collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_last_node_leaves_only_when_empty() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        cluster.store().set("k", Record::new().with("a", 1)).await.unwrap();

        let err = cluster.remove_host("host1").await.unwrap_err();
        assert_migration_failed(&err);
        assert_eq!(cluster.store().len().await, 1);
        assert!(cluster.store().get("k").await.unwrap().is_some());

        cluster.store().delete("k").await.unwrap();
        cluster.remove_host("host1").await.unwrap();
        assert!(cluster.store().is_empty().await);
    }

    // =========================================================================
    // Rollback
    // =========================================================================

    #[tokio::test]
    async fn test_failed_join_rolls_back() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let written = fill(&cluster, 200).await;
        let members_before = cluster.store().members().await;

        let flaky = cluster.add_faulty("host2");
        flaky.fail_sets_after(5);
        let err = cluster.join(flaky.clone()).await.unwrap_err();

        assert_migration_failed(&err);
        assert!(err.is_retryable());
        assert_eq!(cluster.store().members().await, members_before);
        assert_eq!(cluster.node("host1").unwrap().len(), 200);
        assert!(cluster.node("host2").unwrap().is_empty());
        assert_all_readable(&cluster, &written).await;

        let metrics = cluster.store().metrics();
        assert_eq!(metrics.migrations_failed, 1);
        assert_eq!(metrics.keys_rolled_back, 5);
        assert_eq!(metrics.nodes_added, 1);

        // Once healthy the same node joins cleanly.
        flaky.heal();
        cluster.join(flaky).await.unwrap();
        assert!(!cluster.node("host2").unwrap().is_empty());
        assert_all_readable(&cluster, &written).await;
    }

    #[tokio::test]
    async fn test_failed_leave_rolls_back() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let flaky = cluster.add_faulty("host2");
        cluster.join(flaky.clone()).await.unwrap();
        let written = fill(&cluster, 200).await;
        let host1_keys = cluster.node("host1").unwrap().len();
        assert!(host1_keys > 3);

        flaky.fail_sets_after(3);
        let err = cluster.remove_host("host1").await.unwrap_err();

        assert_migration_failed(&err);
        assert_eq!(cluster.hosts(), ["host1", "host2"]);
        assert_eq!(cluster.node("host1").unwrap().len(), host1_keys);
        assert_eq!(cluster.store().metrics().keys_rolled_back, 3);

        flaky.heal();
        assert_all_readable(&cluster, &written).await;
    }

    #[tokio::test]
    async fn test_type_conflict_on_destination_rolls_back() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let written = fill(&cluster, 100).await;

        // host2 already declared `team` as an integer attribute.
        let flaky = cluster.add_faulty("host2");
        flaky
            .inner()
            .set("local", Record::new().with("team", 7))
            .await
            .unwrap();

        let err = cluster.join(flaky.clone()).await.unwrap_err();

        assert_migration_failed(&err);
        assert!(err.to_string().contains("type mismatch"));
        assert_eq!(cluster.node("host2").unwrap().keys(), vec!["local"]);
        assert_eq!(cluster.node("host1").unwrap().len(), written.len());
        assert_eq!(cluster.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_corrupted_copy_is_detected() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        fill(&cluster, 100).await;

        let flaky = cluster.add_faulty("host2");
        flaky.corrupt_reads(true);
        let err = cluster.join(flaky.clone()).await.unwrap_err();

        assert!(err.to_string().contains("differs on destination"));
        assert!(cluster.node("host2").unwrap().is_empty());
        assert_eq!(cluster.node("host1").unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_unverified_migration_skips_read_back() {
        let config = RingConfig::new().with_verify_migration(false);
        let mut cluster = TestCluster::with_config(config, &["host1"]).await.unwrap();
        fill(&cluster, 100).await;

        let flaky = cluster.add_faulty("host2");
        flaky.corrupt_reads(true);
        cluster.join(flaky.clone()).await.unwrap();

        assert!(!cluster.node("host2").unwrap().is_empty());
        assert_eq!(cluster.total_records(), 100);
        assert!(cluster.misplaced_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_join_restores_destination_copy() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let on_host1 = Record::new().with("v", "on-host1");
        cluster.store().set("test3", on_host1.clone()).await.unwrap();

        // host2 still holds a copy of test3 from an earlier life.
        let own = Record::new().with("v", "host2-own");
        let flaky = cluster.add_faulty("host2");
        flaky.inner().set("test3", own.clone()).await.unwrap();
        flaky.corrupt_reads(true);

        let err = cluster.join(flaky.clone()).await.unwrap_err();

        assert!(err.to_string().contains("differs on destination"));
        assert_eq!(cluster.node("host2").unwrap().get("test3"), Some(own));
        assert_eq!(cluster.node("host1").unwrap().get("test3"), Some(on_host1.clone()));
        assert_eq!(cluster.store().get("test3").await.unwrap(), Some(on_host1));
    }

    #[tokio::test]
    async fn test_failed_source_delete_restores_destination_copy() {
        let store = ShardedStore::with_defaults();
        let host1 = Arc::new(FaultyNode::new(storage("host1")));
        store.add_node(host1.clone()).await.unwrap();
        let on_host1 = Record::new().with("v", "on-host1");
        store.set("test3", on_host1.clone()).await.unwrap();

        let own = Record::new().with("v", "host2-own");
        let host2 = storage("host2");
        host2.set("test3", own.clone()).unwrap();

        host1.fail_deletes(true);
        let err = store.add_node(host2.clone()).await.unwrap_err();

        assert_migration_failed(&err);
        assert_eq!(host2.get("test3"), Some(own));
        assert_eq!(host1.inner().get("test3").await.unwrap(), Some(on_host1.clone()));
        assert_eq!(store.members().await.len(), 1);
        assert_eq!(store.get("test3").await.unwrap(), Some(on_host1));
    }

    #[tokio::test]
    async fn test_rollback_restores_destination_copies_in_journal() {
        // A key host2 claims that migrates after test3.
        let later = (0..)
            .map(|i| format!("test3-{i}"))
            .find(|key| {
                let slot = slot_for(key, RING_SIZE);
                slot >= 39909 || slot < 2751
            })
            .unwrap();

        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let on_host1 = Record::new().with("v", "on-host1");
        cluster.store().set("test3", on_host1.clone()).await.unwrap();
        cluster.store().set(&later, Record::new().with("v", "later")).await.unwrap();

        let own = Record::new().with("v", "host2-own");
        let flaky = cluster.add_faulty("host2");
        flaky.inner().set("test3", own.clone()).await.unwrap();
        flaky.fail_key(later.clone());

        let err = cluster.join(flaky.clone()).await.unwrap_err();

        assert_migration_failed(&err);
        assert_eq!(cluster.store().metrics().keys_rolled_back, 1);
        assert_eq!(cluster.node("host2").unwrap().keys(), vec!["test3"]);
        assert_eq!(cluster.node("host2").unwrap().get("test3"), Some(own));
        assert_eq!(cluster.node("host1").unwrap().get("test3"), Some(on_host1));
        assert_eq!(cluster.node("host1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_leave_forgets_declared_kinds() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        let flaky = cluster.add_faulty("host2");
        cluster.join(flaky.clone()).await.unwrap();

        let mut on_host1 = 0;
        for i in 0..40i64 {
            let key = format!("key-{i}");
            if cluster.store().owner_of(&key).await.unwrap().host == "host1" {
                cluster.store().set(&key, Record::new().with("fresh", i)).await.unwrap();
                on_host1 += 1;
            }
        }
        assert!(on_host1 > 1);
        assert_eq!(cluster.node("host2").unwrap().attribute_kind("fresh"), None);

        flaky.fail_sets_after(1);
        let err = cluster.remove_host("host1").await.unwrap_err();

        assert_migration_failed(&err);
        assert_eq!(cluster.store().metrics().keys_rolled_back, 1);
        assert_eq!(cluster.node("host1").unwrap().len(), on_host1);
        assert_eq!(cluster.node("host2").unwrap().attribute_kind("fresh"), None);
        assert!(cluster.node("host2").unwrap().is_empty());

        // host2 owns test3 and accepts a new kind for the attribute.
        flaky.heal();
        cluster
            .store()
            .set("test3", Record::new().with("fresh", "text"))
            .await
            .unwrap();
        assert_eq!(
            cluster.node("host2").unwrap().attribute_kind("fresh"),
            Some(ScalarKind::String)
        );
    }

    #[tokio::test]
    async fn test_failed_join_keeps_existing_kinds() {
        let mut cluster = TestCluster::new(&["host1"]).await.unwrap();
        fill(&cluster, 100).await;

        // host2 declared `team` itself before joining.
        let flaky = cluster.add_faulty("host2");
        flaky
            .inner()
            .set("local", Record::new().with("team", "green"))
            .await
            .unwrap();
        flaky.fail_sets_after(3);

        cluster.join(flaky.clone()).await.unwrap_err();

        let host2 = cluster.node("host2").unwrap();
        assert_eq!(host2.keys(), vec!["local"]);
        assert_eq!(host2.attribute_kind("team"), Some(ScalarKind::String));
        assert_eq!(host2.attribute_kind("index"), None);
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    fn storage(host: &str) -> Arc<StorageNode> {
        Arc::new(StorageNode::new(NodeInfo::new(host, host)))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writes_during_membership_changes() {
        let store = Arc::new(ShardedStore::with_defaults());
        let nodes: Vec<Arc<StorageNode>> =
            ["host1", "host2", "host3", "host4"].iter().map(|h| storage(h)).collect();
        store.add_node(nodes[0].clone()).await.unwrap();

        let mut writers = Vec::new();
        for w in 0..4 {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..250 {
                    let key = format!("w{w}-{i}");
                    store.set(&key, record_for(i)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        for node in &nodes[1..] {
            store.add_node(node.clone() as SharedNode).await.unwrap();
            tokio::task::yield_now().await;
        }
        store.rm_node("host1").await.unwrap();

        for writer in writers {
            writer.await.unwrap();
        }

        let total: usize = nodes.iter().map(|n| n.len()).sum();
        assert_eq!(total, 1000);
        assert!(nodes[0].is_empty());
        for node in &nodes[1..] {
            for key in node.keys() {
                assert_eq!(store.owner_of(&key).await.unwrap().host, node.info().host);
            }
        }
        for w in 0..4 {
            for i in 0..250 {
                let key = format!("w{w}-{i}");
                assert_eq!(store.get(&key).await.unwrap(), Some(record_for(i)));
            }
        }
    }
}
