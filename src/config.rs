//! Configuration types for the sharded store.

use crate::error::{Error, Result};
use crate::types::RING_SIZE;
use std::time::Duration;

/// How a reverse lookup treats nodes that fail to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupPolicy {
    /// Any node failure fails the whole lookup.
    Strict,
    /// Failed nodes are skipped and reported alongside the partial result.
    #[default]
    Lenient,
}

/// Main configuration for a [`ShardedStore`](crate::ShardedStore).
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Number of slots on the ring. Fixed for the ring's lifetime.
    pub ring_size: u64,

    /// Failure policy for reverse-lookup fan-out.
    pub lookup_policy: LookupPolicy,

    /// Per-node timeout for fan-out calls. `None` waits indefinitely.
    pub node_timeout: Option<Duration>,

    /// Read each migrated record back from its destination before
    /// deleting it from the source.
    pub verify_migration: bool,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            ring_size: RING_SIZE,
            lookup_policy: LookupPolicy::default(),
            node_timeout: None,
            verify_migration: true,
        }
    }
}

impl RingConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of ring slots.
    pub fn with_ring_size(mut self, ring_size: u64) -> Self {
        self.ring_size = ring_size;
        self
    }

    /// Set the reverse-lookup failure policy.
    pub fn with_lookup_policy(mut self, policy: LookupPolicy) -> Self {
        self.lookup_policy = policy;
        self
    }

    /// Set the per-node fan-out timeout.
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    /// Enable or disable read-back verification during migration.
    pub fn with_verify_migration(mut self, verify: bool) -> Self {
        self.verify_migration = verify;
        self
    }

    /// Check the configuration for values the ring cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.ring_size == 0 {
            return Err(Error::Config("ring_size must be at least 1".to_string()));
        }
        if self.node_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("node_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}
