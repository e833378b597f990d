//! Storage node: primary table, secondary index and the call interface.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      StorageNode                           │
//! │                 (one RwLock over both)                     │
//! │  ┌──────────────────────┐   ┌───────────────────────────┐ │
//! │  │   primary table      │   │    SecondaryIndex         │ │
//! │  │  key → Record        │   │  attr → kind              │ │
//! │  │                      │   │  attr → value → [keys]    │ │
//! │  └──────────────────────┘   └───────────────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//!                             ▲
//!                             │ NodeClient (set/get/delete/
//!                             │  reverse_lookup_shard/keys)
//!                        ShardedStore
//! ```
//!
//! Type checking happens before any mutation: the first write of an
//! attribute on a node fixes its [`ScalarKind`](crate::ScalarKind), later
//! writes of another kind fail with `TypeMismatch` and change nothing.

mod client;
mod index;
mod storage;

pub use client::{NodeClient, SharedNode};
pub use index::SecondaryIndex;
pub use storage::{NodeStats, StorageNode};
