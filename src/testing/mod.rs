//! Testing utilities for the sharded store.
//!
//! This module provides:
//! - [`FaultyNode`], a node client that injects failures
//! - [`TestCluster`], a store plus the in-process nodes behind it
//! - Integration tests covering routing, migration and workloads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TestCluster                             │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐ │
//! │  │                     ShardedStore                           │ │
//! │  └───────────────────────────────────────────────────────────┘ │
//! │           │                    │                    │          │
//! │           ▼                    ▼                    ▼          │
//! │   ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    │
//! │   │ StorageNode  │    │  FaultyNode  │    │ StorageNode  │    │
//! │   │              │    │ ┌──────────┐ │    │              │    │
//! │   │              │    │ │ Storage  │ │    │              │    │
//! │   │              │    │ │   Node   │ │    │              │    │
//! │   └──────────────┘    │ └──────────┘ │    └──────────────┘    │
//! │                       └──────────────┘                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ringkv::testing::TestCluster;
//! use ringkv::Record;
//!
//! let mut cluster = TestCluster::new(&["host1", "host2"]).await?;
//! cluster.store().set("test1", Record::new().with("prop1", "yoyo")).await?;
//!
//! // Add a node whose writes start failing after 5 keys.
//! let flaky = cluster.add_faulty("host3");
//! flaky.fail_sets_after(5);
//! assert!(cluster.join(flaky).await.is_err());
//! assert!(cluster.misplaced_keys().await?.is_empty());
//! ```

mod faulty;

mod migration_tests;

pub use faulty::{FaultStats, FaultyNode, CORRUPTION_MARKER};

use crate::config::RingConfig;
use crate::error::Result;
use crate::node::{SharedNode, StorageNode};
use crate::store::ShardedStore;
use crate::types::{NodeInfo, Slot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A store together with the in-process nodes behind it.
#[derive(Debug)]
pub struct TestCluster {
    store: ShardedStore,

    /// Storage of every node that was handed out, by host.
    nodes: BTreeMap<String, Arc<StorageNode>>,

    /// Hosts currently in the ring.
    members: Vec<String>,

    /// When the cluster was created.
    pub started_at: Instant,
}

impl TestCluster {
    /// Create a cluster with default configuration and the given hosts.
    pub async fn new(hosts: &[&str]) -> Result<Self> {
        Self::with_config(RingConfig::default(), hosts).await
    }

    /// Create a cluster with custom configuration.
    pub async fn with_config(config: RingConfig, hosts: &[&str]) -> Result<Self> {
        let mut cluster = Self {
            store: ShardedStore::new(config)?,
            nodes: BTreeMap::new(),
            members: Vec::new(),
            started_at: Instant::now(),
        };
        for host in hosts {
            cluster.add_host(host).await?;
        }
        Ok(cluster)
    }

    /// The store under test.
    pub fn store(&self) -> &ShardedStore {
        &self.store
    }

    /// Storage of the node with `host`, including nodes that left the ring.
    pub fn node(&self, host: &str) -> Option<&Arc<StorageNode>> {
        self.nodes.get(host)
    }

    /// Hosts currently in the ring, in join order.
    pub fn hosts(&self) -> &[String] {
        &self.members
    }

    /// Create a plain storage node for `host` and join it.
    pub async fn add_host(&mut self, host: &str) -> Result<Slot> {
        let node = self.storage(host);
        self.join(node).await
    }

    /// Create a storage node for `host` wrapped in a [`FaultyNode`]. The
    /// node is not joined; configure its faults, then call [`join`](Self::join).
    pub fn add_faulty(&mut self, host: &str) -> Arc<FaultyNode> {
        Arc::new(FaultyNode::new(self.storage(host)))
    }

    /// Join an arbitrary client to the ring.
    pub async fn join(&mut self, client: SharedNode) -> Result<Slot> {
        let host = client.info().host.clone();
        let slot = self.store.add_node(client).await?;
        self.members.push(host);
        Ok(slot)
    }

    /// Remove `host` from the ring. Its storage stays reachable through
    /// [`node`](Self::node).
    pub async fn remove_host(&mut self, host: &str) -> Result<Slot> {
        let slot = self.store.rm_node(host).await?;
        self.members.retain(|h| h != host);
        Ok(slot)
    }

    /// Records held across every node handed out.
    pub fn total_records(&self) -> usize {
        self.nodes.values().map(|n| n.len()).sum()
    }

    /// Records held per host, for hosts that hold any.
    pub fn record_counts(&self) -> BTreeMap<String, usize> {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.is_empty())
            .map(|(host, n)| (host.clone(), n.len()))
            .collect()
    }

    /// Keys stored on a node other than their owner, as `(key, host)`.
    pub async fn misplaced_keys(&self) -> Result<Vec<(String, String)>> {
        let mut misplaced = Vec::new();
        for (host, node) in &self.nodes {
            for key in node.keys() {
                if &self.store.owner_of(&key).await?.host != host {
                    misplaced.push((key, host.clone()));
                }
            }
        }
        Ok(misplaced)
    }

    /// Time since the cluster was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn storage(&mut self, host: &str) -> Arc<StorageNode> {
        let node = Arc::new(StorageNode::new(NodeInfo::new(host, host)));
        self.nodes.insert(host.to_string(), node.clone());
        node
    }
}
