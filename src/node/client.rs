//! Call interface the ring uses to reach a storage node.

use crate::error::Result;
use crate::node::storage::StorageNode;
use crate::partitioning::RingMember;
use crate::types::{NodeInfo, Record, Scalar};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a node client, as held by the ring.
pub type SharedNode = Arc<dyn NodeClient>;

/// Request/response access to one storage node.
///
/// The ring depends only on this trait. [`StorageNode`] implements it for
/// in-process use; an RPC client would implement it over its transport and
/// map transport failures to [`NetworkError`](crate::error::NetworkError).
#[async_trait]
pub trait NodeClient: Send + Sync + std::fmt::Debug {
    /// Routing reference of the node behind this client.
    fn info(&self) -> &NodeInfo;

    /// Write or overwrite a record.
    async fn set(&self, key: &str, record: Record) -> Result<()>;

    /// Read a record; `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// Delete a record; `false` when the key was absent.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys on the node whose record holds `value` for `attribute`.
    async fn reverse_lookup_shard(&self, value: &Scalar, attribute: &str) -> Result<Vec<String>>;

    /// Every key held by the node.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Number of records held by the node.
    async fn len(&self) -> Result<usize>;

    /// Attributes whose kind the node has declared.
    async fn declared_attributes(&self) -> Result<Vec<String>>;

    /// Drop the declared kind of `attribute` if no record on the node uses
    /// it. Returns whether the declaration was dropped.
    async fn forget_attribute(&self, attribute: &str) -> Result<bool>;
}

impl RingMember for SharedNode {
    fn host(&self) -> &str {
        &self.info().host
    }
}

#[async_trait]
impl NodeClient for StorageNode {
    fn info(&self) -> &NodeInfo {
        StorageNode::info(self)
    }

    async fn set(&self, key: &str, record: Record) -> Result<()> {
        StorageNode::set(self, key, record)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(StorageNode::get(self, key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(StorageNode::delete(self, key))
    }

    async fn reverse_lookup_shard(&self, value: &Scalar, attribute: &str) -> Result<Vec<String>> {
        Ok(StorageNode::reverse_lookup_shard(self, value, attribute))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(StorageNode::keys(self))
    }

    async fn len(&self) -> Result<usize> {
        Ok(StorageNode::len(self))
    }

    async fn declared_attributes(&self) -> Result<Vec<String>> {
        Ok(StorageNode::declared_attributes(self))
    }

    async fn forget_attribute(&self, attribute: &str) -> Result<bool> {
        Ok(StorageNode::forget_attribute(self, attribute))
    }
}
