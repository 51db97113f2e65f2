//! The Sidechain Database (SCDB): a deterministic, replayable state
//! machine advanced block-by-block by miner-committed signals. Tracks
//! sidechain proposal/activation, the active-sidechain registry, and
//! per-sidechain withdrawal-bundle voting, plus the wire-level commitment
//! codec used to read and write it all from coinbase outputs.
//!
//! The base UTXO/PoW consensus engine, P2P stack, wallet, block assembly,
//! GUI and RPC plumbing are external collaborators; this crate only ever
//! exchanges plain value types with them (see [`types`]).

pub mod codec;
pub mod config;
pub mod proposals;
pub mod registry;
pub mod scdb;
pub mod types;
pub mod votes;

pub use config::Config;
pub use scdb::{Cursor, Scdb, StaleAncestor};
pub use types::{
    ActivationStatus, ActiveSidechain, Bundle, BundleStatus, BundleVotePolicy, CustomVote, Hash160,
    Hash256, Output, Proposal, Slot, VoteKind,
};
