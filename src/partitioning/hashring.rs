//! Consistent hash ring over a fixed-size slot space.
//!
//! Every member occupies exactly one slot, derived from its host. A key is
//! owned by the first member whose slot is strictly greater than the key's
//! slot, wrapping to the first member by index.

use crate::error::MembershipError;
use crate::partitioning::placement::{slot_for, successor_index};
use crate::types::{NodeInfo, Slot};
use std::collections::HashMap;

/// Anything that can sit on the ring.
pub trait RingMember {
    /// Host identity hashed to the member's slot.
    fn host(&self) -> &str;
}

impl RingMember for NodeInfo {
    fn host(&self) -> &str {
        &self.host
    }
}

/// An ordered membership snapshot.
///
/// `slots` is strictly increasing and `members[i]` sits at `slots[i]`.
/// Mutations happen on a clone that is published whole, so readers never
/// see a half-inserted member.
#[derive(Debug, Clone)]
pub struct HashRing<T> {
    ring_size: u64,
    slots: Vec<Slot>,
    members: Vec<T>,
}

impl<T: RingMember> HashRing<T> {
    /// Create an empty ring with `ring_size` slots.
    pub fn new(ring_size: u64) -> Self {
        Self {
            ring_size,
            slots: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Number of slots on the ring.
    pub fn ring_size(&self) -> u64 {
        self.ring_size
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Occupied slots, in ring order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Members with their slots, in ring order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        self.slots.iter().copied().zip(self.members.iter())
    }

    /// Slot an identifier hashes to on this ring.
    pub fn slot_of(&self, id: &str) -> Slot {
        slot_for(id, self.ring_size)
    }

    /// Member at an exact slot.
    pub fn member_at(&self, slot: Slot) -> Option<&T> {
        self.slots
            .binary_search(&slot)
            .ok()
            .map(|idx| &self.members[idx])
    }

    /// Index of the member owning `key`.
    pub fn owner_index(&self, key: &str) -> Result<usize, MembershipError> {
        successor_index(&self.slots, self.slot_of(key)).ok_or(MembershipError::EmptyRing)
    }

    /// Member owning `key`.
    pub fn owner(&self, key: &str) -> Result<&T, MembershipError> {
        self.owner_index(key).map(|idx| &self.members[idx])
    }

    /// Slot of the member owning `key`.
    pub fn owner_slot(&self, key: &str) -> Result<Slot, MembershipError> {
        self.owner_index(key).map(|idx| self.slots[idx])
    }

    /// Member that takes over keys landing just past `slot`.
    ///
    /// For a slot about to be inserted this is the member that currently
    /// holds the range the newcomer will claim.
    pub fn successor_of(&self, slot: Slot) -> Option<(Slot, &T)> {
        successor_index(&self.slots, slot).map(|idx| (self.slots[idx], &self.members[idx]))
    }

    /// Insert a member at the slot its host hashes to.
    ///
    /// Returns the slot. Fails without modifying the ring when the slot
    /// space is full or the slot is taken.
    pub fn insert(&mut self, member: T) -> Result<Slot, MembershipError> {
        if self.members.len() as u64 >= self.ring_size {
            return Err(MembershipError::HashSpaceFull {
                ring_size: self.ring_size,
            });
        }

        let slot = self.slot_of(member.host());
        match self.slots.binary_search(&slot) {
            Ok(idx) => Err(MembershipError::SlotCollision {
                slot,
                existing: self.members[idx].host().to_string(),
                incoming: member.host().to_string(),
            }),
            Err(idx) => {
                self.slots.insert(idx, slot);
                self.members.insert(idx, member);
                Ok(slot)
            }
        }
    }

    /// Remove the member whose host hashes to an occupied slot.
    ///
    /// Membership is matched by slot value, not by host string.
    pub fn remove(&mut self, host: &str) -> Result<(Slot, T), MembershipError> {
        if self.members.is_empty() {
            return Err(MembershipError::EmptyRing);
        }

        let slot = self.slot_of(host);
        match self.slots.binary_search(&slot) {
            Ok(idx) => {
                self.slots.remove(idx);
                let member = self.members.remove(idx);
                Ok((slot, member))
            }
            Err(_) => Err(MembershipError::NodeNotFound {
                host: host.to_string(),
                slot,
            }),
        }
    }

    /// Count how a sample of generated keys spreads over the members,
    /// keyed by member slot.
    pub fn distribution(&self, sample_size: usize) -> HashMap<Slot, usize> {
        let mut distribution = HashMap::new();

        for i in 0..sample_size {
            let key = format!("sample_key_{i}");
            if let Ok(slot) = self.owner_slot(&key) {
                *distribution.entry(slot).or_insert(0) += 1;
            }
        }

        distribution
    }
}
