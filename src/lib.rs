//! Sharded key-value store with consistent-hash placement.
//!
//! This crate provides an embedded sharded store that uses:
//! - **A consistent-hash ring** (SHA-256 mod ring size) to place keys on nodes
//! - **Per-node reverse indexes** for lookup-by-value queries
//! - **Atomic membership changes** that migrate keys or roll back entirely
//!
//! # Features
//!
//! - Deterministic first-node-clockwise placement
//! - Join and leave move only the keys whose owner changes
//! - Failed migrations leave both the ring and the data untouched
//! - Attribute kinds fixed at first write, checked before any mutation
//! - Strict or lenient reverse-lookup fan-out with per-node timeouts
//!
//! # Example
//!
//! ```rust,no_run
//! use ringkv::{NodeInfo, Record, ShardedStore, StorageNode};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ShardedStore::with_defaults();
//!
//!     // Nodes are placed by hashing their host
//!     store.add_node(Arc::new(StorageNode::new(NodeInfo::new("a", "host1")))).await?;
//!     store.add_node(Arc::new(StorageNode::new(NodeInfo::new("b", "host2")))).await?;
//!
//!     // Keyed operations go to the owning node
//!     store
//!         .set("test3", Record::new().with("reverse", "lookup").with("prop2", "jobs"))
//!         .await?;
//!
//!     // Reverse lookups fan out to every node
//!     let found = store.reverse_lookup("lookup", "reverse").await?;
//!     assert_eq!(found.keys, vec!["test3"]);
//!
//!     store.delete("test3").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Application Layer                 │
//! └─────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │             ShardedStore API                │
//! │  • set / get / delete(key)                  │
//! │  • reverse_lookup(value, attribute)         │
//! │  • add_node / rm_node                       │
//! └─────────────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼───────────────┐
//!     ▼               ▼               ▼
//! ┌─────────┐   ┌───────────┐   ┌───────────┐
//! │HashRing │   │ Migration │   │NodeClient │
//! │placement│   │Coordinator│   │  (nodes)  │
//! └─────────┘   └───────────┘   └───────────┘
//! ```
//!
//! # Consistency Model
//!
//! - **Membership**: one change at a time; readers see the ring before or
//!   after a change, never during
//! - **Data operations**: wait for an in-flight migration to finish
//! - **Per node**: a record and its index entries change together

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod partitioning;
pub mod rebalancing;
pub mod store;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use config::{LookupPolicy, RingConfig};
pub use error::{Error, MembershipError, NetworkError, Result, StorageError};
pub use store::{ReverseLookup, ShardedStore, UnreachableNode};
pub use types::{NodeInfo, Record, Scalar, ScalarKind, Slot, RING_SIZE};

// Re-export node types
pub use node::{NodeClient, NodeStats, SharedNode, StorageNode};

// Re-export ring and migration types
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use partitioning::{slot_for, HashRing, RingMember};
pub use rebalancing::{MigrationCoordinator, MigrationReport};
