//! The fixed-size active-sidechain slot table.

use serde::{Deserialize, Serialize};

use crate::types::{ActiveSidechain, Proposal, Slot};

/// One row of [`Registry::list_all`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot: Slot,
    pub is_active: bool,
    pub sidechain: Option<ActiveSidechain>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    slots: Vec<Option<ActiveSidechain>>,
}

impl Registry {
    pub fn new(max_active: u32) -> Self {
        Self {
            slots: vec![None; max_active as usize],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_active(&self, slot: Slot) -> bool {
        self.slots
            .get(slot as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, slot: Slot) -> Option<&ActiveSidechain> {
        self.slots.get(slot as usize).and_then(|s| s.as_ref())
    }

    pub fn list_all(&self) -> Vec<SlotInfo> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| SlotInfo {
                slot: i as Slot,
                is_active: s.is_some(),
                sidechain: s.clone(),
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn active_sidechains(&self) -> impl Iterator<Item = &ActiveSidechain> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Invariant 2: no two active sidechains may share `dedup_key()`.
    pub fn has_duplicate(&self, proposal: &Proposal) -> bool {
        self.active_sidechains()
            .any(|a| a.proposal.dedup_key() == proposal.dedup_key())
    }

    /// Same as [`Self::has_duplicate`] but ignores whatever currently
    /// occupies `excluding_slot` — used on the replacement path, where the
    /// incumbent being displaced must not count against its replacement.
    pub fn has_duplicate_excluding(&self, excluding_slot: Slot, proposal: &Proposal) -> bool {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as Slot != excluding_slot)
            .filter_map(|(_, s)| s.as_ref())
            .any(|a| a.proposal.dedup_key() == proposal.dedup_key())
    }

    pub fn activate(&mut self, slot: Slot, proposal: Proposal, activation_height: u32) {
        self.slots[slot as usize] = Some(ActiveSidechain {
            proposal,
            activation_height,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(slot: Slot, key_id: u8) -> Proposal {
        Proposal {
            slot,
            version: 0,
            title: "t".into(),
            description: "d".into(),
            deposit_script: vec![1, 2, 3],
            key_id: [key_id; 20],
            hash_id_1: None,
            hash_id_2: None,
        }
    }

    #[test]
    fn fresh_registry_has_no_active_sidechains() {
        let registry = Registry::new(256);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.list_all().len(), 256);
        assert!(!registry.is_active(0));
    }

    #[test]
    fn activate_fills_exactly_one_slot() {
        let mut registry = Registry::new(256);
        registry.activate(5, proposal(5, 1), 10);
        assert!(registry.is_active(5));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.get(5).unwrap().activation_height, 10);
    }

    #[test]
    fn duplicate_dedup_key_detected_across_slots() {
        let mut registry = Registry::new(256);
        registry.activate(0, proposal(0, 9), 1);
        assert!(registry.has_duplicate(&proposal(1, 9)));
        assert!(!registry.has_duplicate_excluding(0, &proposal(1, 9)));
    }
}
