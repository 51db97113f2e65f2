//! Plain value types shared across the SCDB state machine.
//!
//! Nothing here owns a transaction, a script interpreter, or a network
//! handle; everything the core exchanges with callers is one of the
//! plain types below, per the "pointer-graph ownership" re-architecture
//! note.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 256-bit digest: block hashes, proposal identity hashes, bundle hashes.
pub type Hash256 = [u8; 32];

/// A 160-bit digest: sidechain key/commit identifiers.
pub type Hash160 = [u8; 20];

/// Sidechain slot number, `0..MAX_ACTIVE`.
pub type Slot = u8;

/// Integer work-score / vote tally. Bounded in `[0, MAX_WORK_SCORE]`.
pub type Amount = u32;

/// One coinbase output as consumed from the block engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: i64,
    pub script: Vec<u8>,
}

/// A candidate sidechain, immutable once created.
///
/// Two proposals are equal iff every content field is equal; `identity_hash`
/// is a deterministic digest over all of them (see [`crate::codec::proposal_identity_hash`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub slot: Slot,
    pub version: u8,
    pub title: String,
    pub description: String,
    pub deposit_script: Vec<u8>,
    pub key_id: Hash160,
    pub hash_id_1: Option<Hash256>,
    pub hash_id_2: Option<Hash160>,
}

impl Proposal {
    /// The `(deposit_script, key_id, hash_id_1, hash_id_2)` tuple used by
    /// the registry's duplicate check (invariant 2).
    pub fn dedup_key(&self) -> (&[u8], Hash160, Option<Hash256>, Option<Hash160>) {
        (&self.deposit_script, self.key_id, self.hash_id_1, self.hash_id_2)
    }
}

/// A proposal that has been promoted into the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSidechain {
    pub proposal: Proposal,
    pub activation_height: u32,
}

impl ActiveSidechain {
    pub fn slot(&self) -> Slot {
        self.proposal.slot
    }
}

/// UPVOTE / DOWNVOTE / ABSTAIN, the only three bundle-vote kinds the wire
/// format carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteKind {
    Upvote,
    Downvote,
    Abstain,
}

/// The node's configured default vote, consulted when no [`CustomVote`]
/// overrides it for a given `(slot, bundle_hash)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum BundleVotePolicy {
    Upvote,
    Abstain,
    Downvote,
}

impl From<BundleVotePolicy> for VoteKind {
    fn from(policy: BundleVotePolicy) -> Self {
        match policy {
            BundleVotePolicy::Upvote => VoteKind::Upvote,
            BundleVotePolicy::Abstain => VoteKind::Abstain,
            BundleVotePolicy::Downvote => VoteKind::Downvote,
        }
    }
}

impl fmt::Display for BundleVotePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BundleVotePolicy::Upvote => "upvote",
            BundleVotePolicy::Abstain => "abstain",
            BundleVotePolicy::Downvote => "downvote",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleStatus {
    Pending,
    Approved,
    Rejected,
}

/// One withdrawal bundle ("WT^") in flight for a sidechain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_hash: Hash256,
    pub work_score: Amount,
    pub age: u32,
    pub status: BundleStatus,
}

/// A node operator's per-bundle voting directive, consulted only when the
/// node is assembling its own next block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVote {
    pub slot: Slot,
    pub bundle_hash: Hash256,
    pub vote: VoteKind,
}

/// Per-pending-proposal activation bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationStatus {
    pub proposal: Proposal,
    pub ack_count: u32,
    pub age: u32,
    /// Cumulative miss count, never reset on an ACK.
    pub failure_count: u32,
    /// Consecutive ACK streak, reset on any miss — gates the replacement
    /// path's `REPLACEMENT_PERIOD` requirement. Not part of the tally rule
    /// itself, just bookkeeping `scdb` needs to evaluate it.
    pub consecutive_acks: u32,
}

impl ActivationStatus {
    pub fn new(proposal: Proposal) -> Self {
        Self {
            proposal,
            ack_count: 0,
            age: 0,
            failure_count: 0,
            consecutive_acks: 0,
        }
    }
}
