//! Client-facing sharded store.
//!
//! # Architecture
//!
//! ```text
//!                 set / get / delete          reverse_lookup
//!                        │                          │
//!                        ▼                          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ShardedStore                          │
//! │   RwLock<Arc<HashRing<SharedNode>>>    FanOut (policy, T/O)  │
//! │        │ read: route by key               │ read: every node │
//! │        │ write: add_node / rm_node        │                  │
//! │        ▼                                  ▼                  │
//! │   MigrationCoordinator  ──plan/execute/rollback──▶ nodes     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data operations hold a read guard on the membership for their whole
//! duration. A membership change takes the write guard, builds the next
//! ring on a copy, migrates, and only then swaps the copy in. Readers never
//! see a half-applied change and a failed migration leaves the published
//! ring untouched.

mod router;

pub use router::{FanOut, ReverseLookup, UnreachableNode};

use crate::config::RingConfig;
use crate::error::Result;
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::node::SharedNode;
use crate::partitioning::{slot_for, HashRing};
use crate::rebalancing::MigrationCoordinator;
use crate::types::{NodeInfo, Record, Scalar, Slot};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A key-value store sharded over a consistent-hash ring.
#[derive(Debug)]
pub struct ShardedStore {
    config: RingConfig,
    ring: RwLock<Arc<HashRing<SharedNode>>>,
    migrations: MigrationCoordinator,
    fan_out: FanOut,
    metrics: Arc<StoreMetrics>,
}

impl ShardedStore {
    /// Create an empty store.
    pub fn new(config: RingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create an empty store with the default configuration.
    pub fn with_defaults() -> Self {
        Self::build(RingConfig::default())
    }

    fn build(config: RingConfig) -> Self {
        let metrics = Arc::new(StoreMetrics::new());
        Self {
            ring: RwLock::new(Arc::new(HashRing::new(config.ring_size))),
            migrations: MigrationCoordinator::new(config.verify_migration, metrics.clone()),
            fan_out: FanOut::new(config.lookup_policy, config.node_timeout),
            metrics,
            config,
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Current metric values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Slot an identifier hashes to on this store's ring.
    pub fn slot_of(&self, id: &str) -> Slot {
        slot_for(id, self.config.ring_size)
    }

    /// Consistent snapshot of the current membership.
    pub async fn snapshot(&self) -> Arc<HashRing<SharedNode>> {
        self.ring.read().await.clone()
    }

    /// Members in ring order, with their slots.
    pub async fn members(&self) -> Vec<(Slot, NodeInfo)> {
        self.ring
            .read()
            .await
            .iter()
            .map(|(slot, node)| (slot, node.info().clone()))
            .collect()
    }

    /// Number of members.
    pub async fn len(&self) -> usize {
        self.ring.read().await.len()
    }

    /// Whether the ring has no members.
    pub async fn is_empty(&self) -> bool {
        self.ring.read().await.is_empty()
    }

    /// Node that currently owns `key`.
    pub async fn route(&self, key: &str) -> Result<SharedNode> {
        let ring = self.ring.read().await;
        Ok(ring.owner(key)?.clone())
    }

    /// Routing reference of the node that currently owns `key`.
    pub async fn owner_of(&self, key: &str) -> Result<NodeInfo> {
        let ring = self.ring.read().await;
        Ok(ring.owner(key)?.info().clone())
    }

    /// Write or overwrite the record under `key`.
    pub async fn set(&self, key: &str, record: Record) -> Result<()> {
        let ring = self.ring.read().await;
        let node = ring.owner(key)?;
        debug!(key, host = %node.info().host, "Routing set");

        node.set(key, record).await?;
        self.metrics.sets.inc();
        Ok(())
    }

    /// Read the record under `key`.
    pub async fn get(&self, key: &str) -> Result<Option<Record>> {
        let ring = self.ring.read().await;
        let node = ring.owner(key)?;

        let record = node.get(key).await?;
        self.metrics.record_get(record.is_some());
        Ok(record)
    }

    /// Delete the record under `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let ring = self.ring.read().await;
        let node = ring.owner(key)?;

        let existed = node.delete(key).await?;
        self.metrics.deletes.inc();
        Ok(existed)
    }

    /// Keys across the ring whose record holds `value` under `attribute`.
    ///
    /// Keys are grouped by node in ring order. An empty ring yields no keys.
    pub async fn reverse_lookup(
        &self,
        value: impl Into<Scalar>,
        attribute: &str,
    ) -> Result<ReverseLookup> {
        let value = value.into();
        let ring = self.ring.read().await;

        let lookup = self.fan_out.reverse_lookup(&ring, &value, attribute).await?;
        self.metrics.record_lookup(lookup.is_partial());
        Ok(lookup)
    }

    /// Join `node` to the ring and move the keys it now owns onto it.
    ///
    /// Returns the slot it was placed at. On any error the ring and the
    /// data are as they were before the call.
    pub async fn add_node(&self, node: SharedNode) -> Result<Slot> {
        let mut ring = self.ring.write().await;
        let before = ring.clone();
        let mut after = (*before).clone();

        let slot = after.insert(node.clone())?;
        let report = match self.migrations.plan_join(&before, &after, slot).await? {
            Some(plan) => Some(self.migrations.execute(&plan).await?),
            None => None,
        };

        *ring = Arc::new(after);
        self.metrics.nodes_added.inc();
        self.metrics.members.set(ring.len() as i64);

        info!(
            host = %node.info().host,
            slot,
            members = ring.len(),
            moved = report.as_ref().map_or(0, |r| r.moved),
            "Node joined ring"
        );
        Ok(slot)
    }

    /// Take the node with `host` out of the ring, handing its keys to its
    /// successor. Returns the slot it occupied.
    ///
    /// The last member can only leave while it holds no keys. On any error
    /// the ring and the data are as they were before the call.
    pub async fn rm_node(&self, host: &str) -> Result<Slot> {
        let mut ring = self.ring.write().await;
        let mut after = (**ring).clone();

        let (slot, removed) = after.remove(host)?;
        let report = match self.migrations.plan_leave(&after, &removed, slot).await? {
            Some(plan) => Some(self.migrations.execute(&plan).await?),
            None => None,
        };

        *ring = Arc::new(after);
        self.metrics.nodes_removed.inc();
        self.metrics.members.set(ring.len() as i64);

        info!(
            host,
            slot,
            members = ring.len(),
            moved = report.as_ref().map_or(0, |r| r.moved),
            "Node left ring"
        );
        Ok(slot)
    }
}
