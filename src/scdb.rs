//! The top-level SCDB: a block-linked cursor chain plus the local
//! (non-consensus) staging a node keeps while it mines its own block.
//!
//! `Scdb` owns its cursor chain directly and clones `Cursor` snapshots out
//! to callers — no global singleton, no `Arc<RwLock<_>>` threaded through
//! unrelated modules, per the redesign note on the source's pervasive
//! `scdb` global.

use std::collections::{HashMap, HashSet};

use hashlink::LinkedHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    codec::{self, Commitment},
    config::Config,
    proposals::ProposalCache,
    registry::{Registry, SlotInfo},
    types::{ActivationStatus, ActiveSidechain, Bundle, CustomVote, Hash256, Output, Proposal, Slot, VoteKind},
    votes::{CustomVoteStore, VoteEngine},
};

/// `apply()` was called with a `prev_hash` that disagrees with the current
/// cursor. No mutation happens; the caller must roll back first.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stale ancestor: block's expected previous hash does not match the current cursor")]
pub struct StaleAncestor;

/// `(last_block_hash, block_height, proposal_cache, registry,
/// per_sidechain_bundle_lists, activation_statuses)` — advanced
/// deterministically by [`Scdb::apply`], snapshotted so [`Scdb::rollback_to`]
/// can restore any ancestor exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    last_block_hash: Option<Hash256>,
    height: u32,
    proposal_cache: ProposalCache,
    registry: Registry,
    vote_engine: VoteEngine,
}

impl Cursor {
    fn genesis(max_active: u32) -> Self {
        Self {
            last_block_hash: None,
            height: 0,
            proposal_cache: ProposalCache::new(),
            registry: Registry::new(max_active),
            vote_engine: VoteEngine::new(max_active),
        }
    }
}

/// Extracts and groups the typed commitments carried by one block's
/// coinbase outputs. Commitments that don't parse are already silently
/// `Commitment::None` (dropped) by [`codec::parse_commitment`].
struct BlockCommitments {
    proposals: Vec<Proposal>,
    acks: HashSet<Hash256>,
    bundle_votes: HashMap<Slot, (Hash256, VoteKind)>,
}

fn classify(outputs: &[Output]) -> BlockCommitments {
    let mut proposals = Vec::new();
    let mut acks = HashSet::new();
    let mut bundle_votes = HashMap::new();
    for output in outputs {
        match codec::parse_commitment(&output.script) {
            Commitment::ProposalCommit(proposal) => proposals.push(proposal),
            Commitment::ActivationAck(hash) => {
                acks.insert(hash);
            }
            Commitment::BundleVote {
                slot,
                bundle_hash,
                kind,
            } => {
                // "a single typed commitment may be present" per sidechain;
                // a second vote for an already-seen slot this block is
                // dropped, matching the consensus-silent-drop taxonomy.
                bundle_votes.entry(slot).or_insert((bundle_hash, kind));
            }
            Commitment::StateScript(_) | Commitment::BlindMerkleCommit { .. } | Commitment::None => {}
        }
    }
    BlockCommitments {
        proposals,
        acks,
        bundle_votes,
    }
}

impl Cursor {
    /// Fixed per-block order: proposals, then activation acks, then
    /// bundle votes, then the Tau reset.
    fn apply_block(&mut self, height: u32, new_hash: Hash256, outputs: &[Output], cfg: &Config) {
        let commitments = classify(outputs);

        self.proposal_cache
            .intake(&commitments.proposals, cfg.max_pending_proposals);

        let ready = self.proposal_cache.tally(&commitments.acks, cfg);
        for identity_hash in ready {
            let Some(status) = self.proposal_cache.get(&identity_hash) else {
                continue;
            };
            let slot = status.proposal.slot;
            let proposal = status.proposal.clone();
            if self.registry.get(slot).is_none() {
                if self.registry.has_duplicate(&proposal) {
                    tracing::warn!(slot, "dropping promotion, duplicate active sidechain params");
                    self.proposal_cache.remove(&identity_hash);
                    continue;
                }
                tracing::debug!(slot, title = %proposal.title, "activating sidechain");
                self.registry.activate(slot, proposal, height);
                self.proposal_cache.remove(&identity_hash);
            } else if status.consecutive_acks >= cfg.replacement_period {
                if self.registry.has_duplicate_excluding(slot, &proposal) {
                    tracing::warn!(slot, "dropping replacement, duplicate active sidechain params");
                    self.proposal_cache.remove(&identity_hash);
                    continue;
                }
                tracing::debug!(slot, title = %proposal.title, "replacing incumbent sidechain");
                self.registry.activate(slot, proposal, height);
                self.proposal_cache.remove(&identity_hash);
            }
            // Else: threshold reached but the replacement streak isn't
            // long enough yet; stays pending.
        }

        let active_slots: Vec<Slot> = self.registry.active_sidechains().map(|a| a.slot()).collect();
        self.vote_engine
            .apply_block(height, active_slots.into_iter(), &commitments.bundle_votes, cfg);

        self.height = height;
        self.last_block_hash = Some(new_hash);
    }
}

/// Local, non-consensus staging a node keeps while assembling its own next
/// block: a proposal it wants to broadcast, the proposal hashes it wants
/// to ACK, and its custom per-bundle vote overrides.
#[derive(Clone, Debug, Default)]
struct MiningStage {
    proposal_to_broadcast: Option<Proposal>,
    hashes_to_activate: LinkedHashSet<Hash256>,
    custom_votes: CustomVoteStore,
}

pub struct Scdb {
    config: Config,
    history: Vec<Cursor>,
    stage: MiningStage,
}

impl Scdb {
    pub fn new(config: Config) -> Self {
        let genesis = Cursor::genesis(config.max_active);
        Self {
            config,
            history: vec![genesis],
            stage: MiningStage::default(),
        }
    }

    fn current(&self) -> &Cursor {
        self.history.last().expect("history always has at least genesis")
    }

    /// Advances the state by one block. Fails without mutation if
    /// `expected_prev_hash` disagrees with the current cursor.
    pub fn apply(
        &mut self,
        height: u32,
        new_hash: Hash256,
        expected_prev_hash: Option<Hash256>,
        outputs: &[Output],
    ) -> Result<(), StaleAncestor> {
        if expected_prev_hash != self.current().last_block_hash {
            return Err(StaleAncestor);
        }
        let mut next = self.current().clone();
        next.apply_block(height, new_hash, outputs, &self.config);
        self.history.push(next);
        Ok(())
    }

    /// Restores state to the cursor whose `last_block_hash == hash`.
    /// Returns `false`, leaving state untouched, if no such cursor exists
    /// in this instance's history.
    pub fn rollback_to(&mut self, hash: Option<Hash256>) -> bool {
        match self.history.iter().rposition(|c| c.last_block_hash == hash) {
            Some(pos) => {
                self.history.truncate(pos + 1);
                true
            }
            None => false,
        }
    }

    // --- mining path ---

    pub fn next_state_script(&self) -> Vec<u8> {
        let cursor = self.current();
        let mut per_sidechain = Vec::new();
        for sidechain in cursor.registry.active_sidechains() {
            let slot = sidechain.slot();
            let votes: Vec<bool> = cursor
                .vote_engine
                .get_state(slot)
                .iter()
                .map(|bundle| {
                    let effective = self.stage.custom_votes.effective_vote(
                        slot,
                        bundle.bundle_hash,
                        self.config.default_bundle_vote.into(),
                    );
                    matches!(effective, VoteKind::Upvote)
                })
                .collect();
            per_sidechain.push(votes);
        }
        codec::emit_state_script(&per_sidechain)
    }

    pub fn generate_activation_commit(&self, proposal_hash: Hash256) -> Vec<u8> {
        codec::emit_commitment(&Commitment::ActivationAck(proposal_hash))
    }

    pub fn cache_proposal(&mut self, proposal: Proposal) {
        self.stage.proposal_to_broadcast = Some(proposal);
    }

    pub fn cache_hash_to_activate(&mut self, hash: Hash256) {
        self.stage.hashes_to_activate.insert(hash);
    }

    pub fn remove_hash_to_activate(&mut self, hash: Hash256) {
        self.stage.hashes_to_activate.remove(&hash);
    }

    pub fn cache_custom_votes(&mut self, votes: Vec<CustomVote>) {
        self.stage.custom_votes.cache(votes);
    }

    pub fn get_custom_vote_cache(&self) -> Vec<CustomVote> {
        self.stage.custom_votes.get_cache()
    }

    // --- query surface ---

    pub fn active_sidechain_count(&self) -> usize {
        self.current().registry.active_count()
    }

    pub fn get_sidechains(&self) -> Vec<SlotInfo> {
        self.current().registry.list_all()
    }

    pub fn get_active_sidechains(&self) -> Vec<ActiveSidechain> {
        self.current().registry.active_sidechains().cloned().collect()
    }

    pub fn get_activation_status(&self) -> Vec<ActivationStatus> {
        self.current().proposal_cache.statuses().cloned().collect()
    }

    pub fn get_state(&self, slot: Slot) -> Vec<Bundle> {
        self.current().vote_engine.get_state(slot).to_vec()
    }

    pub fn check_work_score(&self, slot: Slot, bundle_hash: Hash256) -> bool {
        self.current()
            .vote_engine
            .check_work_score(slot, bundle_hash, &self.config)
    }

    pub fn get_hash_block_last_seen(&self) -> Option<Hash256> {
        self.current().last_block_hash
    }

    pub fn height(&self) -> u32 {
        self.current().height
    }
}
