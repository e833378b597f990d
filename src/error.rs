//! Error types for the sharded store.

use crate::types::{ScalarKind, Slot};
use thiserror::Error;

/// Result type alias for sharded store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sharded store.
///
/// A missing key is not an error: `get` returns `None` and `delete`
/// returns `false`.
#[derive(Error, Debug)]
pub enum Error {
    /// Ring membership and migration errors.
    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    /// Per-node storage errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Errors reaching a node through its client.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from a ring membership operation or routing.
    pub fn is_membership(&self) -> bool {
        matches!(self, Error::Membership(_))
    }

    /// Whether retrying the same call later may succeed.
    ///
    /// Node reachability problems are transient; type and membership
    /// violations are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Membership(MembershipError::MigrationFailed { .. })
        )
    }
}

/// Ring membership errors.
///
/// Any of these leaves the ring in the state it had before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// The ring has no members.
    #[error("hash ring is empty")]
    EmptyRing,

    /// Every slot of the ring is already taken.
    #[error("hash space is full: all {ring_size} slots occupied")]
    HashSpaceFull { ring_size: u64 },

    /// Another node already occupies the slot the incoming host hashes to.
    #[error("slot collision at {slot}: {incoming} collides with {existing}")]
    SlotCollision {
        slot: Slot,
        existing: String,
        incoming: String,
    },

    /// No member occupies the slot of the given host.
    #[error("node not found: {host} (slot {slot})")]
    NodeNotFound { host: String, slot: Slot },

    /// Key migration could not complete; the membership change was rolled back.
    #[error("migration failed: {reason}")]
    MigrationFailed { reason: String },
}

/// Storage layer errors raised by a single node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A value's kind differs from the kind declared for its attribute.
    #[error("type mismatch on attribute {attribute}: declared {declared}, got {actual}")]
    TypeMismatch {
        attribute: String,
        declared: ScalarKind,
        actual: ScalarKind,
    },

    /// A value that cannot be stored as a flat record.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Errors reaching a node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The node could not be reached or failed the call.
    #[error("node {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    /// The node did not answer within the configured timeout.
    #[error("node {host} timed out")]
    Timeout { host: String },
}

impl NetworkError {
    /// Host of the node that failed.
    pub fn host(&self) -> &str {
        match self {
            NetworkError::Unreachable { host, .. } | NetworkError::Timeout { host } => host,
        }
    }
}
