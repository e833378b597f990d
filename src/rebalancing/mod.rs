//! Rebalancing module for moving keys during membership changes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  MigrationCoordinator                        │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │  Phase 1: Plan                                        │  │
//! │  │  - join: successor's keys now owned by the newcomer   │  │
//! │  │  - leave: every key of the leaving node               │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                          ↓                                   │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │  Phase 2: Move, one key at a time                     │  │
//! │  │  - get from source, set on destination                │  │
//! │  │  - get from destination and compare                   │  │
//! │  │  - delete from source, append to journal              │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                          ↓ (any failure)                     │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │  Rollback: replay the journal backwards               │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The caller publishes the new membership only after Phase 2 succeeds.

mod coordinator;
mod transfer;

pub use coordinator::MigrationCoordinator;
pub use transfer::{MigrationReport, TransferEntry, TransferKind, TransferPlan, TransferProgress};
