//! Metrics for monitoring the sharded store.
//!
//! Counters and gauges are plain atomics; [`StoreMetrics::snapshot`] copies
//! them into a [`MetricsSnapshot`] for reporting.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    StoreMetrics                       │
//! │  requests: sets, gets, misses, deletes, lookups       │
//! │  topology: nodes added/removed, members               │
//! │  migration: started, completed, failed, keys, undo    │
//! └──────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Create a counter at zero.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can go up and down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    /// Create a gauge at zero.
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Set to `value`.
    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Metrics for a [`ShardedStore`](crate::ShardedStore).
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// `set` calls that succeeded.
    pub sets: Counter,
    /// `get` calls.
    pub gets: Counter,
    /// `get` calls that found no record.
    pub get_misses: Counter,
    /// `delete` calls.
    pub deletes: Counter,
    /// Reverse lookups issued.
    pub reverse_lookups: Counter,
    /// Reverse lookups that returned without every node.
    pub partial_lookups: Counter,
    /// Nodes added to the ring.
    pub nodes_added: Counter,
    /// Nodes removed from the ring.
    pub nodes_removed: Counter,
    /// Current number of ring members.
    pub members: Gauge,
    /// Membership changes that needed a migration.
    pub migrations_started: Counter,
    /// Migrations that completed.
    pub migrations_completed: Counter,
    /// Migrations that failed and were rolled back.
    pub migrations_failed: Counter,
    /// Keys moved between nodes.
    pub keys_migrated: Counter,
    /// Keys moved back to their source during rollback.
    pub keys_rolled_back: Counter,
}

impl StoreMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a `get`.
    pub fn record_get(&self, found: bool) {
        self.gets.inc();
        if !found {
            self.get_misses.inc();
        }
    }

    /// Record a reverse lookup and whether it was partial.
    pub fn record_lookup(&self, partial: bool) {
        self.reverse_lookups.inc();
        if partial {
            self.partial_lookups.inc();
        }
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sets: self.sets.get(),
            gets: self.gets.get(),
            get_misses: self.get_misses.get(),
            deletes: self.deletes.get(),
            reverse_lookups: self.reverse_lookups.get(),
            partial_lookups: self.partial_lookups.get(),
            nodes_added: self.nodes_added.get(),
            nodes_removed: self.nodes_removed.get(),
            members: self.members.get().max(0) as u64,
            migrations_started: self.migrations_started.get(),
            migrations_completed: self.migrations_completed.get(),
            migrations_failed: self.migrations_failed.get(),
            keys_migrated: self.keys_migrated.get(),
            keys_rolled_back: self.keys_rolled_back.get(),
        }
    }
}

/// Plain copy of [`StoreMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sets: u64,
    pub gets: u64,
    pub get_misses: u64,
    pub deletes: u64,
    pub reverse_lookups: u64,
    pub partial_lookups: u64,
    pub nodes_added: u64,
    pub nodes_removed: u64,
    pub members: u64,
    pub migrations_started: u64,
    pub migrations_completed: u64,
    pub migrations_failed: u64,
    pub keys_migrated: u64,
    pub keys_rolled_back: u64,
}

impl MetricsSnapshot {
    /// Fraction of `get` calls that found a record.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            (self.gets - self.get_misses) as f64 / self.gets as f64
        }
    }
}
