//! Per-node storage: primary table plus secondary index.

use crate::error::StorageError;
use crate::node::index::SecondaryIndex;
use crate::types::{NodeInfo, Record, Scalar, ScalarKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Primary and secondary state, guarded together.
#[derive(Debug, Default)]
struct NodeState {
    primary: HashMap<String, Record>,
    index: SecondaryIndex,
}

/// A single storage node.
///
/// The primary table and the secondary index share one lock, so readers
/// never observe a record without its index entries or the reverse.
pub struct StorageNode {
    info: NodeInfo,
    state: RwLock<NodeState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time counters for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Records in the primary table.
    pub record_count: usize,
    /// `(attribute, value, key)` entries in the secondary index.
    pub index_entries: usize,
    /// `get` calls that found a record.
    pub hits: u64,
    /// `get` calls that found nothing.
    pub misses: u64,
}

impl StorageNode {
    /// Create an empty node.
    pub fn new(info: NodeInfo) -> Self {
        Self {
            info,
            state: RwLock::new(NodeState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Routing reference of this node.
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// Write or overwrite the record for `key`.
    ///
    /// Every attribute is checked against its declared kind before anything
    /// changes; a mismatch leaves primary and index state untouched.
    pub fn set(&self, key: &str, record: Record) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.index.validate(&record)?;

        let NodeState { primary, index } = &mut *state;
        if let Some(previous) = primary.get(key) {
            index.remove(key, previous, Some(&record));
        }
        index.insert(key, &record);
        primary.insert(key.to_string(), record);

        trace!(node = %self.info.host, key, "stored record");
        Ok(())
    }

    /// Look up the record for `key`.
    pub fn get(&self, key: &str) -> Option<Record> {
        let result = self.state.read().primary.get(key).cloned();
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Remove the record for `key` and every index entry naming it.
    ///
    /// Returns whether a record existed. Index entries are scrubbed either
    /// way.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.write();
        let NodeState { primary, index } = &mut *state;

        match primary.remove(key) {
            Some(record) => {
                index.remove(key, &record, None);
                trace!(node = %self.info.host, key, "deleted record");
                true
            }
            None => {
                let cleaned = index.scrub(key);
                if cleaned > 0 {
                    trace!(node = %self.info.host, key, cleaned, "scrubbed stale index entries");
                }
                false
            }
        }
    }

    /// Keys on this node whose record holds `value` for `attribute`.
    ///
    /// Entries whose record is gone or no longer matches are filtered out.
    pub fn reverse_lookup_shard(&self, value: &Scalar, attribute: &str) -> Vec<String> {
        let state = self.state.read();
        state
            .index
            .lookup(attribute, value)
            .iter()
            .filter(|key| {
                state
                    .primary
                    .get(key.as_str())
                    .and_then(|record| record.get(attribute))
                    == Some(value)
            })
            .cloned()
            .collect()
    }

    /// Every key held by this node, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.state.read().primary.keys().cloned().collect()
    }

    /// Whether the node holds a record for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.state.read().primary.contains_key(key)
    }

    /// Declared kind of an attribute on this node.
    pub fn attribute_kind(&self, attribute: &str) -> Option<ScalarKind> {
        self.state.read().index.kind_of(attribute)
    }

    /// Attributes whose kind is declared on this node.
    pub fn declared_attributes(&self) -> Vec<String> {
        self.state.read().index.declared().map(str::to_string).collect()
    }

    /// Drop the declared kind of `attribute` when no record uses it.
    ///
    /// Returns whether the declaration was dropped.
    pub fn forget_attribute(&self, attribute: &str) -> bool {
        let forgotten = self.state.write().index.forget(attribute);
        if forgotten {
            trace!(node = %self.info.host, attribute, "forgot attribute kind");
        }
        forgotten
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.state.read().primary.len()
    }

    /// Whether the node holds no records.
    pub fn is_empty(&self) -> bool {
        self.state.read().primary.is_empty()
    }

    /// Current statistics.
    pub fn stats(&self) -> NodeStats {
        let state = self.state.read();
        NodeStats {
            record_count: state.primary.len(),
            index_entries: state.index.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for StorageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageNode")
            .field("info", &self.info)
            .field("record_count", &self.len())
            .finish()
    }
}
