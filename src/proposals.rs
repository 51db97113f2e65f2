//! Proposal Cache & Activation Engine: intake, ACK/miss tally, and
//! pruning of pending sidechain proposals. Promotion and replacement
//! themselves live in [`crate::scdb`], since they also need to consult
//! the [`crate::registry::Registry`].

use std::collections::HashSet;

use hashlink::LinkedHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    codec::proposal_identity_hash,
    config::Config,
    types::{ActivationStatus, Hash256, Proposal},
};

/// Pending proposals, insertion-ordered — `sidechainactivation_tests.cpp`'s
/// `proposal_multiple` checks `front()`/`back()` ordering after several
/// inserts, so plain hashing isn't enough.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCache {
    pending: LinkedHashMap<Hash256, ActivationStatus>,
}

impl ProposalCache {
    pub fn new() -> Self {
        Self {
            pending: LinkedHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, identity_hash: &Hash256) -> Option<&ActivationStatus> {
        self.pending.get(identity_hash)
    }

    pub fn statuses(&self) -> impl Iterator<Item = &ActivationStatus> {
        self.pending.values()
    }

    pub fn remove(&mut self, identity_hash: &Hash256) -> Option<ActivationStatus> {
        self.pending.remove(identity_hash)
    }

    /// One-proposal-per-block intake rule: a coinbase carrying zero or
    /// more-than-one `ProposalCommit` outputs contributes nothing.
    pub fn intake(&mut self, proposal_commits_in_block: &[Proposal], max_pending: u32) {
        let [proposal] = proposal_commits_in_block else {
            return;
        };
        if self.pending.len() as u32 >= max_pending {
            tracing::warn!(slot = proposal.slot, "proposal cache full, dropping intake");
            return;
        }
        let identity_hash = proposal_identity_hash(proposal);
        if self.pending.contains_key(&identity_hash) {
            return;
        }
        tracing::debug!(slot = proposal.slot, title = %proposal.title, "caching sidechain proposal");
        self.pending
            .insert(identity_hash, ActivationStatus::new(proposal.clone()));
    }

    /// Advances every pending proposal's tally by one block, then prunes
    /// anything whose cumulative miss count has run out. Returns the
    /// identity hashes that reached `activation_period` ACKs this block, in
    /// insertion order (earliest-inserted proposal first — the tie-break
    /// rule).
    ///
    /// `failure_count` is cumulative and never reset by an ACK, per the
    /// tally rule; once it exceeds `activation_max_failures` a proposal can
    /// never again close the gap to `activation_period`, so that's the only
    /// prune trigger needed (a separate "can't mathematically reach the
    /// target" check would never fire earlier than this one).
    pub fn tally(&mut self, acked: &HashSet<Hash256>, cfg: &Config) -> Vec<Hash256> {
        let mut ready = Vec::new();
        for (identity_hash, status) in self.pending.iter_mut() {
            status.age += 1;
            if acked.contains(identity_hash) {
                status.ack_count += 1;
                status.consecutive_acks += 1;
            } else {
                status.consecutive_acks = 0;
                status.failure_count += 1;
            }
            if status.ack_count >= cfg.activation_period {
                ready.push(*identity_hash);
            }
        }
        let pruned: Vec<Hash256> = self
            .pending
            .iter()
            .filter(|(_, status)| status.failure_count > cfg.activation_max_failures)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &pruned {
            tracing::debug!(?hash, "pruning sidechain proposal, too many cumulative misses");
            self.pending.remove(hash);
        }
        ready.retain(|hash| self.pending.contains_key(hash));
        ready
    }
}

impl Default for ProposalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(slot: u8, title: &str) -> Proposal {
        Proposal {
            slot,
            version: 0,
            title: title.into(),
            description: "d".into(),
            deposit_script: vec![1, 2, 3],
            key_id: [0x80, 0xdc, 0xa7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x44, 0xcd],
            hash_id_1: None,
            hash_id_2: None,
        }
    }

    #[test]
    fn more_than_one_proposal_commit_drops_both() {
        let mut cache = ProposalCache::new();
        cache.intake(&[proposal(0, "a"), proposal(1, "b")], 256);
        assert!(cache.is_empty());
    }

    #[test]
    fn single_proposal_commit_is_cached() {
        let mut cache = ProposalCache::new();
        cache.intake(&[proposal(0, "test")], 256);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn structurally_identical_proposal_is_not_duplicated() {
        let mut cache = ProposalCache::new();
        cache.intake(&[proposal(0, "test")], 256);
        cache.intake(&[proposal(0, "test")], 256);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut cache = ProposalCache::new();
        cache.intake(&[proposal(0, "first")], 256);
        cache.intake(&[proposal(1, "second")], 256);
        let titles: Vec<_> = cache.statuses().map(|s| s.proposal.title.clone()).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn exactly_activation_period_acks_reaches_threshold() {
        let mut cache = ProposalCache::new();
        let cfg = Config {
            activation_period: 5,
            ..Config::default()
        };
        cache.intake(&[proposal(0, "test")], 256);
        let identity_hash = crate::codec::proposal_identity_hash(&proposal(0, "test"));
        let acked: HashSet<Hash256> = std::iter::once(identity_hash).collect();
        let mut ready = Vec::new();
        for _ in 0..5 {
            ready = cache.tally(&acked, &cfg);
        }
        assert_eq!(ready, vec![identity_hash]);
    }

    #[test]
    fn one_miss_past_max_failures_prunes() {
        let mut cache = ProposalCache::new();
        let cfg = Config {
            activation_period: 5,
            activation_max_failures: 2,
            ..Config::default()
        };
        cache.intake(&[proposal(0, "test")], 256);
        let empty_acked = HashSet::new();
        for _ in 0..(cfg.activation_max_failures + 1) {
            cache.tally(&empty_acked, &cfg);
        }
        assert!(cache.is_empty());
    }
}
