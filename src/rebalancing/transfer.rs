//! Data transfer types for migrations.
//!
//! A [`TransferPlan`] names one source, one destination and the keys that
//! move between them. Executing it fills a [`TransferProgress`] whose
//! journal is what rollback replays in reverse.

use crate::node::NodeClient;
use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A record moving between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEntry {
    /// The key.
    pub key: String,
    /// The full record as read from the source.
    pub record: Record,
    /// What the destination held under the key before the move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Record>,
}

impl TransferEntry {
    /// Create a new transfer entry.
    pub fn new(key: impl Into<String>, record: Record) -> Self {
        Self {
            key: key.into(),
            record,
            previous: None,
        }
    }

    /// Remember the record the destination held before the move.
    pub fn with_previous(mut self, previous: Option<Record>) -> Self {
        self.previous = previous;
        self
    }
}

/// Why a transfer is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// A node joined and claims part of its successor's range.
    Join,
    /// A node is leaving and hands everything to its successor.
    Leave,
}

/// Keys to move from one node to another.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    /// Why the keys move.
    pub kind: TransferKind,
    /// Node currently holding the keys.
    pub source: Arc<dyn NodeClient>,
    /// Node that owns the keys under the new membership.
    pub destination: Arc<dyn NodeClient>,
    /// Keys to move.
    pub keys: Vec<String>,
}

impl TransferPlan {
    /// Number of keys to move.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing needs to move.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Progress of a running transfer.
#[derive(Debug)]
pub struct TransferProgress {
    /// Keys planned.
    pub total: usize,
    /// Entries fully moved (written, verified, removed from source), in order.
    pub journal: Vec<TransferEntry>,
    /// Planned keys that had disappeared from the source by the time they
    /// were read.
    pub skipped: usize,
    started_at: Instant,
}

impl TransferProgress {
    /// Start tracking a transfer of `total` keys.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            journal: Vec::with_capacity(total),
            skipped: 0,
            started_at: Instant::now(),
        }
    }

    /// Number of keys moved so far.
    pub fn moved(&self) -> usize {
        self.journal.len()
    }

    /// Progress percentage.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            ((self.moved() + self.skipped) as f64 / self.total as f64) * 100.0
        }
    }

    /// Time since the transfer started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Summary of a completed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Host of the node keys moved from.
    pub source: String,
    /// Host of the node keys moved to.
    pub destination: String,
    /// Keys moved.
    pub moved: usize,
    /// Planned keys that were already gone.
    pub skipped: usize,
}
