//! Scatter-gather routing for reverse lookups.
//!
//! A reverse lookup cannot be routed by key, so it is sent to every member
//! at once and the per-node answers are concatenated in ring order.

use crate::config::LookupPolicy;
use crate::error::{Error, NetworkError, Result};
use crate::node::SharedNode;
use crate::partitioning::HashRing;
use crate::types::{NodeInfo, Scalar};
use futures::future::join_all;
use std::time::Duration;
use tracing::warn;

/// A node that failed to answer a fan-out call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreachableNode {
    /// The node that failed.
    pub node: NodeInfo,
    /// What went wrong.
    pub error: NetworkError,
}

/// Result of a reverse lookup across the ring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseLookup {
    /// Matching keys. Within a node, in the order they were indexed.
    pub keys: Vec<String>,
    /// Nodes that did not answer. Always empty under the strict policy.
    pub unreachable: Vec<UnreachableNode>,
}

impl ReverseLookup {
    /// Whether some nodes did not contribute.
    pub fn is_partial(&self) -> bool {
        !self.unreachable.is_empty()
    }

    /// Hosts of the nodes that did not answer.
    pub fn unreachable_hosts(&self) -> Vec<&str> {
        self.unreachable
            .iter()
            .map(|u| u.node.host.as_str())
            .collect()
    }
}

/// Fans reverse lookups out to every member.
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    policy: LookupPolicy,
    timeout: Option<Duration>,
}

impl FanOut {
    /// Create a fan-out with a failure policy and optional per-node timeout.
    pub fn new(policy: LookupPolicy, timeout: Option<Duration>) -> Self {
        Self { policy, timeout }
    }

    /// Ask every member of `ring` for keys holding `value` under `attribute`.
    ///
    /// Under [`LookupPolicy::Strict`] the first failing node (in ring order)
    /// fails the call. Under [`LookupPolicy::Lenient`] failing nodes are
    /// listed in [`ReverseLookup::unreachable`].
    pub async fn reverse_lookup(
        &self,
        ring: &HashRing<SharedNode>,
        value: &Scalar,
        attribute: &str,
    ) -> Result<ReverseLookup> {
        let calls = ring
            .iter()
            .map(|(_, node)| self.query(node, value, attribute));
        let answers = join_all(calls).await;

        let mut lookup = ReverseLookup::default();
        for ((_, node), answer) in ring.iter().zip(answers) {
            match answer {
                Ok(keys) => lookup.keys.extend(keys),
                Err(error) => match self.policy {
                    LookupPolicy::Strict => return Err(Error::Network(error)),
                    LookupPolicy::Lenient => {
                        warn!(
                            host = %node.info().host,
                            error = %error,
                            attribute,
                            "Node skipped in reverse lookup"
                        );
                        lookup.unreachable.push(UnreachableNode {
                            node: node.info().clone(),
                            error,
                        });
                    }
                },
            }
        }

        Ok(lookup)
    }

    async fn query(
        &self,
        node: &SharedNode,
        value: &Scalar,
        attribute: &str,
    ) -> std::result::Result<Vec<String>, NetworkError> {
        let host = &node.info().host;
        let call = node.reverse_lookup_shard(value, attribute);

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| NetworkError::Timeout { host: host.clone() })?,
            None => call.await,
        };

        result.map_err(|e| match e {
            Error::Network(network) => network,
            other => NetworkError::Unreachable {
                host: host.clone(),
                reason: other.to_string(),
            },
        })
    }
}
