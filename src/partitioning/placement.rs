//! Placement math shared by routing and migration planning.

use crate::types::Slot;
use sha2::{Digest, Sha256};

/// Map an identifier (node host or key) to its slot on a ring of
/// `ring_size` slots.
///
/// The SHA-256 digest is read as a big-endian integer and reduced modulo
/// the ring size, so the result does not depend on the digest width.
pub fn slot_for(id: &str, ring_size: u64) -> Slot {
    debug_assert!(ring_size > 0);
    let digest = Sha256::digest(id.as_bytes());
    let modulus = u128::from(ring_size);
    let slot = digest
        .iter()
        .fold(0u128, |acc, &byte| ((acc << 8) | u128::from(byte)) % modulus);
    slot as Slot
}

/// Index of the first slot strictly greater than `slot` in the sorted
/// `slots`, wrapping to 0 past the end.
///
/// Returns `None` when `slots` is empty.
pub fn successor_index(slots: &[Slot], slot: Slot) -> Option<usize> {
    if slots.is_empty() {
        return None;
    }
    let idx = slots.partition_point(|&s| s <= slot);
    Some(idx % slots.len())
}
