//! Black-box scenarios exercised only through the public crate API,
//! grounded on `sidechaindb_tests.cpp` and `sidechainactivation_tests.cpp`.

use drivenet_scdb::{codec, BundleVotePolicy, Config, Output, Proposal, Scdb, VoteKind};

fn height_hash(height: u32) -> [u8; 32] {
    codec::sha256d(&height.to_le_bytes())
}

fn proposal(slot: u8, title: &str) -> Proposal {
    Proposal {
        slot,
        version: 0,
        title: title.to_string(),
        description: "a test sidechain".to_string(),
        deposit_script: vec![0xa9, 0x14],
        key_id: [
            0x80, 0xdc, 0xa7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x44, 0xcd,
        ],
        hash_id_1: None,
        hash_id_2: None,
    }
}

/// `sidechainactivation_tests.cpp::proposal_perblock_limit`, via the
/// end-to-end `apply` path rather than `ProposalCache` directly.
#[test]
fn two_proposal_commits_in_one_block_are_both_dropped() {
    let mut scdb = Scdb::new(Config::default());
    let outputs = vec![
        Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::ProposalCommit(proposal(0, "a"))),
        },
        Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::ProposalCommit(proposal(1, "b"))),
        },
    ];
    scdb.apply(1, height_hash(1), None, &outputs).unwrap();
    assert!(scdb.get_activation_status().is_empty());
    assert_eq!(scdb.active_sidechain_count(), 0);
}

/// Scenario 6 from the testable-properties list: work-score gating at the
/// exact `MIN_WORK_SCORE` boundary.
#[test]
fn work_score_gating_boundary() {
    let cfg = Config {
        min_work_score: 100,
        activation_period: 1,
        ..Config::default()
    };
    let mut scdb = Scdb::new(cfg.clone());
    let p = proposal(0, "test");
    let identity_hash = codec::proposal_identity_hash(&p);

    scdb.apply(
        1,
        height_hash(1),
        None,
        &[Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::ProposalCommit(p)),
        }],
    )
    .unwrap();
    scdb.apply(
        2,
        height_hash(2),
        Some(height_hash(1)),
        &[Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::ActivationAck(identity_hash)),
        }],
    )
    .unwrap();
    assert_eq!(scdb.active_sidechain_count(), 1);

    let bundle_hash = [0x55; 32];
    let mut prev = height_hash(2);
    for i in 0..100u32 {
        let h = 3 + i;
        let hash = height_hash(h);
        scdb.apply(
            h,
            hash,
            Some(prev),
            &[Output {
                value: 0,
                script: codec::emit_commitment(&codec::Commitment::BundleVote {
                    slot: 0,
                    bundle_hash,
                    kind: VoteKind::Upvote,
                }),
            }],
        )
        .unwrap();
        prev = hash;
    }
    assert!(scdb.check_work_score(0, bundle_hash));

    // A freshly-started bundle with only half the required upvotes must
    // not yet pass the gate.
    let other_bundle = [0x66; 32];
    for i in 0..50u32 {
        let h = 103 + i;
        let hash = height_hash(h);
        scdb.apply(
            h,
            hash,
            Some(prev),
            &[Output {
                value: 0,
                script: codec::emit_commitment(&codec::Commitment::BundleVote {
                    slot: 0,
                    bundle_hash: other_bundle,
                    kind: VoteKind::Upvote,
                }),
            }],
        )
        .unwrap();
        prev = hash;
    }
    assert!(!scdb.check_work_score(0, other_bundle));
}

/// Default-vote policy feeds into the emitted state script when no custom
/// vote overrides a bundle.
#[test]
fn default_bundle_vote_policy_drives_state_script() {
    let cfg = Config {
        activation_period: 1,
        default_bundle_vote: BundleVotePolicy::Upvote,
        ..Config::default()
    };
    let mut scdb = Scdb::new(cfg.clone());
    let p = proposal(0, "test");
    let identity_hash = codec::proposal_identity_hash(&p);
    scdb.apply(
        1,
        height_hash(1),
        None,
        &[Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::ProposalCommit(p)),
        }],
    )
    .unwrap();
    scdb.apply(
        2,
        height_hash(2),
        Some(height_hash(1)),
        &[Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::ActivationAck(identity_hash)),
        }],
    )
    .unwrap();
    scdb.apply(
        3,
        height_hash(3),
        Some(height_hash(2)),
        &[Output {
            value: 0,
            script: codec::emit_commitment(&codec::Commitment::BundleVote {
                slot: 0,
                bundle_hash: [0x01; 32],
                kind: VoteKind::Upvote,
            }),
        }],
    )
    .unwrap();

    // Default policy is UPVOTE and nothing overrides it: the emitted
    // script must VERIFY the lone pending bundle.
    let script = scdb.next_state_script();
    assert!(script.contains(&codec::VERIFY));
    assert!(!script.contains(&codec::REJECT));
}
