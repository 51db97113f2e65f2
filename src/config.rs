//! Process-wide tunables, collected into one `clap`-derived struct at the
//! edge rather than scattered through the core (cf. the teacher's
//! `cli::Config`).

use std::path::PathBuf;

use clap::Parser;

use crate::types::BundleVotePolicy;

#[derive(Parser, Clone, Debug)]
pub struct Config {
    /// Newline-delimited JSON block feed to replay. Use `-` for stdin.
    #[arg(default_value = "-", long)]
    pub blocks: PathBuf,

    /// Log level.
    #[arg(default_value_t = tracing::Level::DEBUG, long)]
    pub log_level: tracing::Level,

    /// Vote applied to a bundle when no `CustomVote` overrides it.
    #[arg(default_value_t = BundleVotePolicy::Abstain, long, value_enum)]
    pub default_bundle_vote: BundleVotePolicy,

    /// Size of the sidechain registry.
    #[arg(default_value_t = 256, long)]
    pub max_active: u32,

    /// ACKs a proposal needs (not necessarily consecutive) to be eligible
    /// for promotion.
    #[arg(default_value_t = 100, long)]
    pub activation_period: u32,

    /// Consecutive misses that prune a pending proposal.
    #[arg(default_value_t = 13, long)]
    pub activation_max_failures: u32,

    /// Consecutive ACKs a proposal needs, on top of `activation_period`, to
    /// displace an incumbent in an occupied slot.
    #[arg(default_value_t = 200, long)]
    pub replacement_period: u32,

    /// Work score at which a withdrawal bundle is approved.
    #[arg(default_value_t = 100, long)]
    pub min_work_score: u32,

    /// Upper bound on any bundle's work score.
    #[arg(default_value_t = 200, long)]
    pub max_work_score: u32,

    /// Block interval after which unapproved bundles are discarded.
    #[arg(default_value_t = 500, long)]
    pub tau: u32,

    /// Bundles coexisting per sidechain.
    #[arg(default_value_t = 3, long)]
    pub max_bundles_per_sidechain: u32,

    /// Pending proposals coexisting in the cache.
    #[arg(default_value_t = 256, long)]
    pub max_pending_proposals: u32,

    /// Highest accepted proposal version.
    #[arg(default_value_t = 0, long)]
    pub sidechain_version_max: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocks: PathBuf::from("-"),
            log_level: tracing::Level::DEBUG,
            default_bundle_vote: BundleVotePolicy::Abstain,
            max_active: 256,
            activation_period: 100,
            activation_max_failures: 13,
            replacement_period: 200,
            min_work_score: 100,
            max_work_score: 200,
            tau: 500,
            max_bundles_per_sidechain: 3,
            max_pending_proposals: 256,
            sidechain_version_max: 0,
        }
    }
}
