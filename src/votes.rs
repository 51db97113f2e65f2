//! Withdrawal Vote Engine: per-sidechain pending-bundle lists, work-score
//! tallying, Tau-period resets, and the local (non-consensus) custom vote
//! store consulted when this node mines its own block.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    types::{Bundle, BundleStatus, CustomVote, Hash256, Slot, VoteKind},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEngine {
    bundles: Vec<Vec<Bundle>>,
}

impl VoteEngine {
    pub fn new(max_active: u32) -> Self {
        Self {
            bundles: vec![Vec::new(); max_active as usize],
        }
    }

    pub fn get_state(&self, slot: Slot) -> &[Bundle] {
        self.bundles
            .get(slot as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn check_work_score(&self, slot: Slot, bundle_hash: Hash256, cfg: &Config) -> bool {
        self.get_state(slot)
            .iter()
            .find(|b| b.bundle_hash == bundle_hash)
            .map(|b| b.work_score >= cfg.min_work_score)
            .unwrap_or(false)
    }

    /// Processes one block's worth of bundle votes for active sidechains,
    /// then resets any sidechain whose bundle list is due for a Tau reset.
    ///
    /// `votes` carries at most one `(bundle_hash, kind)` per active slot,
    /// per §5's "a single typed commitment may be present" rule.
    pub fn apply_block(
        &mut self,
        height: u32,
        active_slots: impl Iterator<Item = Slot>,
        votes: &HashMap<Slot, (Hash256, VoteKind)>,
        cfg: &Config,
    ) {
        for slot in active_slots {
            let list = &mut self.bundles[slot as usize];
            // Approved bundles only live long enough to be queried for the
            // block in which they approved; drop them before this block's
            // work begins.
            list.retain(|b| b.status != BundleStatus::Approved);

            if let Some((bundle_hash, kind)) = votes.get(&slot) {
                match kind {
                    VoteKind::Upvote => {
                        if let Some(bundle) = list.iter_mut().find(|b| b.bundle_hash == *bundle_hash) {
                            bundle.work_score = (bundle.work_score + 1).min(cfg.max_work_score);
                        } else if (list.len() as u32) < cfg.max_bundles_per_sidechain {
                            list.push(Bundle {
                                bundle_hash: *bundle_hash,
                                work_score: 1,
                                age: 0,
                                status: BundleStatus::Pending,
                            });
                        }
                    }
                    VoteKind::Downvote => {
                        if let Some(bundle) = list.iter_mut().find(|b| b.bundle_hash == *bundle_hash) {
                            bundle.work_score = bundle.work_score.saturating_sub(1);
                        }
                    }
                    VoteKind::Abstain => {}
                }
            }

            for bundle in list.iter_mut() {
                bundle.age += 1;
                if bundle.status == BundleStatus::Pending && bundle.work_score >= cfg.min_work_score
                {
                    bundle.status = BundleStatus::Approved;
                }
            }

            if cfg.tau > 0 && height % cfg.tau == 0 {
                list.retain(|b| b.status != BundleStatus::Pending);
            }
        }
    }
}

/// The node operator's per-bundle voting overrides. Local state, not part
/// of the replayable consensus cursor.
#[derive(Clone, Debug, Default)]
pub struct CustomVoteStore {
    directives: HashMap<(Slot, Hash256), VoteKind>,
}

impl CustomVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&mut self, votes: Vec<CustomVote>) {
        for vote in votes {
            self.directives.insert((vote.slot, vote.bundle_hash), vote.vote);
        }
    }

    pub fn get_cache(&self) -> Vec<CustomVote> {
        self.directives
            .iter()
            .map(|(&(slot, bundle_hash), &vote)| CustomVote {
                slot,
                bundle_hash,
                vote,
            })
            .collect()
    }

    /// Effective vote for `(slot, bundle_hash)`: the custom override if one
    /// exists, else the node's configured default.
    pub fn effective_vote(&self, slot: Slot, bundle_hash: Hash256, default: VoteKind) -> VoteKind {
        self.directives
            .get(&(slot, bundle_hash))
            .copied()
            .unwrap_or(default)
    }
}
