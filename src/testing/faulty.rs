//! Failure injection for node clients.
//!
//! [`FaultyNode`] wraps any [`NodeClient`] and misbehaves on request. It can
//! stop accepting writes after a budget, refuse deletes, hand back altered
//! copies of what it was sent, drop off the network, or answer slowly.

use crate::error::{Error, NetworkError, Result};
use crate::node::{NodeClient, SharedNode};
use crate::types::{NodeInfo, Record, Scalar};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const UNLIMITED: u64 = u64::MAX;

/// Attribute added to records returned while reads are corrupted.
pub const CORRUPTION_MARKER: &str = "__corrupted";

/// Counts of calls seen and faults injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// Calls received.
    pub calls: u64,
    /// Calls that were failed or corrupted on purpose.
    pub injected: u64,
}

/// A [`NodeClient`] that injects faults in front of another client.
#[derive(Debug)]
pub struct FaultyNode {
    inner: SharedNode,
    unreachable: AtomicBool,
    corrupt_reads: AtomicBool,
    fail_deletes: AtomicBool,
    sets_remaining: AtomicU64,
    delay: RwLock<Option<Duration>>,
    failing_keys: RwLock<HashSet<String>>,
    corrupted_keys: RwLock<HashSet<String>>,
    calls: AtomicU64,
    injected: AtomicU64,
}

impl FaultyNode {
    /// Wrap `inner`. Faults are off until switched on.
    pub fn new(inner: SharedNode) -> Self {
        Self {
            inner,
            unreachable: AtomicBool::new(false),
            corrupt_reads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            sets_remaining: AtomicU64::new(UNLIMITED),
            delay: RwLock::new(None),
            failing_keys: RwLock::new(HashSet::new()),
            corrupted_keys: RwLock::new(HashSet::new()),
            calls: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &SharedNode {
        &self.inner
    }

    /// Let `n` more writes through, then fail every write.
    pub fn fail_sets_after(&self, n: u64) {
        self.sets_remaining.store(n, Ordering::SeqCst);
    }

    /// Return altered records from `get` for keys written through this
    /// client while enabled. Records already on the node read back intact.
    pub fn corrupt_reads(&self, enabled: bool) {
        self.corrupt_reads.store(enabled, Ordering::SeqCst);
    }

    /// Fail every `delete`.
    pub fn fail_deletes(&self, enabled: bool) {
        self.fail_deletes.store(enabled, Ordering::SeqCst);
    }

    /// Fail every call as if the node were off the network.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Sleep before answering each call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// Fail any write or read of `key`.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.write().insert(key.into());
    }

    /// Turn every fault off.
    pub fn heal(&self) {
        self.unreachable.store(false, Ordering::SeqCst);
        self.corrupt_reads.store(false, Ordering::SeqCst);
        self.fail_deletes.store(false, Ordering::SeqCst);
        self.sets_remaining.store(UNLIMITED, Ordering::SeqCst);
        *self.delay.write() = None;
        self.failing_keys.write().clear();
        self.corrupted_keys.write().clear();
    }

    /// Calls seen and faults injected so far.
    pub fn stats(&self) -> FaultStats {
        FaultStats {
            calls: self.calls.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
        }
    }

    async fn enter(&self, key: Option<&str>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(self.fault("node unreachable"));
        }
        if let Some(key) = key {
            if self.failing_keys.read().contains(key) {
                return Err(self.fault(&format!("injected failure for key {key}")));
            }
        }
        Ok(())
    }

    fn take_set_permit(&self) -> bool {
        self.sets_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                UNLIMITED => Some(n),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok()
    }

    fn fault(&self, reason: &str) -> Error {
        self.injected.fetch_add(1, Ordering::Relaxed);
        Error::Network(NetworkError::Unreachable {
            host: self.inner.info().host.clone(),
            reason: reason.to_string(),
        })
    }
}

#[async_trait]
impl NodeClient for FaultyNode {
    fn info(&self) -> &NodeInfo {
        self.inner.info()
    }

    async fn set(&self, key: &str, record: Record) -> Result<()> {
        self.enter(Some(key)).await?;
        if !self.take_set_permit() {
            return Err(self.fault("write budget exhausted"));
        }
        self.inner.set(key, record).await?;
        if self.corrupt_reads.load(Ordering::SeqCst) {
            self.corrupted_keys.write().insert(key.to_string());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.enter(Some(key)).await?;
        let record = self.inner.get(key).await?;

        if self.corrupt_reads.load(Ordering::SeqCst) && self.corrupted_keys.read().contains(key) {
            if let Some(record) = record {
                self.injected.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(record.with(CORRUPTION_MARKER, true)));
            }
        }
        Ok(record)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.enter(Some(key)).await?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(self.fault("delete refused"));
        }
        self.corrupted_keys.write().remove(key);
        self.inner.delete(key).await
    }

    async fn reverse_lookup_shard(&self, value: &Scalar, attribute: &str) -> Result<Vec<String>> {
        self.enter(None).await?;
        self.inner.reverse_lookup_shard(value, attribute).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.enter(None).await?;
        self.inner.keys().await
    }

    async fn len(&self) -> Result<usize> {
        self.enter(None).await?;
        self.inner.len().await
    }

    async fn declared_attributes(&self) -> Result<Vec<String>> {
        self.enter(None).await?;
        self.inner.declared_attributes().await
    }

    async fn forget_attribute(&self, attribute: &str) -> Result<bool> {
        self.enter(None).await?;
        self.inner.forget_attribute(attribute).await
    }
}
