//! Partitioning module for placing keys on storage nodes.
//!
//! Keys and nodes are hashed onto a fixed ring of slots (2^16 by default).
//! Each node holds one slot; a key belongs to the first node clockwise.
//!
//! # Architecture
//!
//! ```text
//! slot 0                                                   slot 65535
//!   │                                                          │
//!   ├──────●────────────●──────────────●──────────────●────────┤
//!        host2        host4          host1          host3
//!        (2751)      (19568)        (39909)        (51338)
//!
//!   key "test1" → 28692 → first slot > 28692 → host1
//!   key "test3" → 51731 → no slot > 51731    → wrap → host2
//! ```
//!
//! # Example
//!
//! ```rust
//! use ringkv::partitioning::HashRing;
//! use ringkv::{NodeInfo, RING_SIZE};
//!
//! let mut ring = HashRing::new(RING_SIZE);
//! ring.insert(NodeInfo::new("first", "host1")).unwrap();
//! ring.insert(NodeInfo::new("second", "host2")).unwrap();
//!
//! assert_eq!(ring.owner("test1").unwrap().name, "first");
//! ```

mod hashring;
mod placement;

pub use hashring::{HashRing, RingMember};
pub use placement::{slot_for, successor_index};
