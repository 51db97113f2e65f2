//! Wire-level commitment codec: coinbase output scripts in, typed
//! [`Commitment`] values out, and the reverse (emission).
//!
//! Every commitment kind is `OP_RETURN` followed by a one-byte magic tag,
//! a one-byte version, then a typed payload — the "inheritance-heavy
//! script types" redesign note calls for exactly this: one tagged variant
//! per commitment kind and a single parse/emit pair covering the grammar,
//! rather than a class hierarchy. The state script is the one exception:
//! its on-chain grammar is `OP_RETURN VERSION VDELIM …` with no tag byte,
//! since it's the one commitment a full node (not a miner) must also be
//! able to reconstruct byte-for-byte. Parsing never panics; anything that
//! doesn't match a known layout is silently `Commitment::None`, per the
//! consensus-silent-drop taxonomy.

use byteorder::{LittleEndian, WriteBytesExt};
use nom::{
    bytes::complete::{tag, take},
    combinator::{eof, map, verify},
    number::complete::{le_u16, u8 as nom_u8},
    IResult,
};
use sha2::{Digest, Sha256};

use crate::types::{Hash160, Hash256, Proposal, Slot, VoteKind};

pub const OP_RETURN: u8 = 0x6a;

const TAG_PROPOSAL: u8 = 0xd1;
const TAG_ACK: u8 = 0xd2;
const TAG_BUNDLE_VOTE: u8 = 0xd3;

/// The only version this crate emits or accepts.
pub const SCDB_VERSION: u8 = 0;

pub const VDELIM: u8 = 0xf0;
pub const SC_DELIM: u8 = 0xf1;
pub const WT_DELIM: u8 = 0xf2;
pub const VERIFY: u8 = 0xf3;
pub const REJECT: u8 = 0xf4;

const BMM_PREFIX: [u8; 3] = [0x00, 0xbf, 0x00];
const BMM_PREV_BLOCK_TAG: u8 = 0x04;

/// Double SHA-256, matching the base chain's hashing convention.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let once = Sha256::digest(data);
    let twice = Sha256::digest(once);
    twice.into()
}

/// Deterministic identity digest over every content field of a proposal.
pub fn proposal_identity_hash(proposal: &Proposal) -> Hash256 {
    let mut buf = Vec::new();
    buf.push(proposal.slot);
    buf.push(proposal.version);
    buf.extend_from_slice(&(proposal.title.len() as u16).to_le_bytes());
    buf.extend_from_slice(proposal.title.as_bytes());
    buf.extend_from_slice(&(proposal.description.len() as u16).to_le_bytes());
    buf.extend_from_slice(proposal.description.as_bytes());
    buf.extend_from_slice(&(proposal.deposit_script.len() as u16).to_le_bytes());
    buf.extend_from_slice(&proposal.deposit_script);
    buf.extend_from_slice(&proposal.key_id);
    match proposal.hash_id_1 {
        Some(h) => {
            buf.push(1);
            buf.extend_from_slice(&h);
        }
        None => buf.push(0),
    }
    match proposal.hash_id_2 {
        Some(h) => {
            buf.push(1);
            buf.extend_from_slice(&h);
        }
        None => buf.push(0),
    }
    sha256d(&buf)
}

/// Bitcoin's `CScriptNum` minimal push encoding: little-endian magnitude,
/// sign in the high bit of the last byte, an extra `0x00`/`0x80` byte
/// appended only when the magnitude would otherwise look signed.
pub fn scriptnum_encode(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let neg = n < 0;
    let mut abs_val = n.unsigned_abs();
    let mut out = Vec::new();
    while abs_val > 0 {
        out.push((abs_val & 0xff) as u8);
        abs_val >>= 8;
    }
    if out.last().copied().unwrap_or(0) & 0x80 != 0 {
        out.push(if neg { 0x80 } else { 0x00 });
    } else if neg {
        *out.last_mut().expect("non-zero n pushed at least one byte") |= 0x80;
    }
    out
}

pub fn scriptnum_decode(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let mut result: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        result |= (b as i64) << (8 * i);
    }
    let last = *bytes.last().expect("checked non-empty above");
    if last & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        result &= !sign_bit;
        result = -result;
    }
    result
}

/// The typed sum every coinbase output (or critical-data blob, for
/// [`Commitment::BlindMerkleCommit`]) decodes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commitment {
    ProposalCommit(Proposal),
    ActivationAck(Hash256),
    BundleVote {
        slot: Slot,
        bundle_hash: Hash256,
        kind: VoteKind,
    },
    /// The token stream following `VDELIM`, verbatim.
    StateScript(Vec<u8>),
    BlindMerkleCommit {
        slot: Slot,
        prev_block_ref: [u8; 4],
        hash_critical: Hash256,
    },
    None,
}

fn length_prefixed(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = le_u16(input)?;
    take(len as usize)(input)
}

fn opt_hash<const N: usize>(input: &[u8]) -> IResult<&[u8], Option<[u8; N]>> {
    let (input, present) = nom_u8(input)?;
    match present {
        0 => Ok((input, None)),
        1 => {
            let (input, bytes) = take(N)(input)?;
            let mut arr = [0u8; N];
            arr.copy_from_slice(bytes);
            Ok((input, Some(arr)))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn parse_proposal_commit(input: &[u8]) -> IResult<&[u8], Commitment> {
    let (input, slot) = nom_u8(input)?;
    let (input, version) = nom_u8(input)?;
    let (input, title) = length_prefixed(input)?;
    let (input, description) = length_prefixed(input)?;
    let (input, deposit_script) = length_prefixed(input)?;
    let (input, key_id) = take(20usize)(input)?;
    let (input, hash_id_1) = opt_hash::<32>(input)?;
    let (input, hash_id_2) = opt_hash::<20>(input)?;
    let (input, ()) = eof(input).map(|(i, _)| (i, ()))?;
    let title = String::from_utf8_lossy(title).into_owned();
    let description = String::from_utf8_lossy(description).into_owned();
    let mut key_id_arr: Hash160 = [0u8; 20];
    key_id_arr.copy_from_slice(key_id);
    let proposal = Proposal {
        slot,
        version,
        title,
        description,
        deposit_script: deposit_script.to_vec(),
        key_id: key_id_arr,
        hash_id_1,
        hash_id_2,
    };
    Ok((input, Commitment::ProposalCommit(proposal)))
}

fn parse_activation_ack(input: &[u8]) -> IResult<&[u8], Commitment> {
    let (input, hash) = take(32usize)(input)?;
    let (input, ()) = eof(input).map(|(i, _)| (i, ()))?;
    let mut arr: Hash256 = [0u8; 32];
    arr.copy_from_slice(hash);
    Ok((input, Commitment::ActivationAck(arr)))
}

fn parse_vote_kind(input: &[u8]) -> IResult<&[u8], VoteKind> {
    map(
        verify(nom_u8, |b| *b < 3),
        |b| match b {
            0 => VoteKind::Upvote,
            1 => VoteKind::Downvote,
            _ => VoteKind::Abstain,
        },
    )(input)
}

fn parse_bundle_vote(input: &[u8]) -> IResult<&[u8], Commitment> {
    let (input, slot) = nom_u8(input)?;
    let (input, bundle_hash) = take(32usize)(input)?;
    let (input, kind) = parse_vote_kind(input)?;
    let (input, ()) = eof(input).map(|(i, _)| (i, ()))?;
    let mut arr: Hash256 = [0u8; 32];
    arr.copy_from_slice(bundle_hash);
    Ok((
        input,
        Commitment::BundleVote {
            slot,
            bundle_hash: arr,
            kind,
        },
    ))
}

/// Parse one coinbase output script into its commitment, or
/// [`Commitment::None`] if the layout doesn't match anything known.
///
/// Never used for [`Commitment::BlindMerkleCommit`] — that lives in a
/// separate critical-data blob and is parsed with [`parse_bmm_request`].
pub fn parse_commitment(script: &[u8]) -> Commitment {
    let Some((OP_RETURN, rest)) = script.split_first().map(|(h, t)| (*h, t)) else {
        return Commitment::None;
    };
    // The state script carries no tag byte: `OP_RETURN VERSION VDELIM …`.
    if let [SCDB_VERSION, VDELIM, tokens @ ..] = rest {
        return Commitment::StateScript(tokens.to_vec());
    }
    let Some((tag_byte, rest)) = rest.split_first().map(|(h, t)| (*h, t)) else {
        return Commitment::None;
    };
    let Some((version, payload)) = rest.split_first().map(|(h, t)| (*h, t)) else {
        return Commitment::None;
    };
    if version != SCDB_VERSION {
        return Commitment::None;
    }
    let result = match tag_byte {
        TAG_PROPOSAL => parse_proposal_commit(payload),
        TAG_ACK => parse_activation_ack(payload),
        TAG_BUNDLE_VOTE => parse_bundle_vote(payload),
        _ => return Commitment::None,
    };
    match result {
        Ok((b"", commitment)) => commitment,
        _ => Commitment::None,
    }
}

/// Parse the BMM (blind merged mining) request sub-grammar embedded in a
/// coinbase's critical-data bytes. Distinct entry point from
/// [`parse_commitment`] since this blob is never `OP_RETURN`-prefixed.
pub fn parse_bmm_request(critical_data: &[u8]) -> Option<Commitment> {
    fn inner(input: &[u8]) -> IResult<&[u8], (Slot, [u8; 4])> {
        let (input, _) = tag(BMM_PREFIX)(input)?;
        let (input, push_len) = verify(nom_u8, |l| *l <= 2)(input)?;
        let (input, slot_bytes) = take(push_len as usize)(input)?;
        let (input, _) = tag([BMM_PREV_BLOCK_TAG])(input)?;
        let (input, prev_block_ref) = take(4usize)(input)?;
        let (input, ()) = eof(input).map(|(i, _)| (i, ()))?;
        let slot_val = scriptnum_decode(slot_bytes);
        let slot: Slot = match u8::try_from(slot_val) {
            Ok(s) if slot_val >= 0 => s,
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    slot_bytes,
                    nom::error::ErrorKind::Verify,
                )))
            }
        };
        let mut prev = [0u8; 4];
        prev.copy_from_slice(prev_block_ref);
        Ok((input, (slot, prev)))
    }
    match inner(critical_data) {
        Ok((b"", (slot, prev_block_ref))) => Some(Commitment::BlindMerkleCommit {
            slot,
            prev_block_ref,
            hash_critical: sha256d(critical_data),
        }),
        _ => None,
    }
}

fn push_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.write_u16::<LittleEndian>(data.len() as u16)
        .expect("writing to a Vec<u8> cannot fail");
    buf.extend_from_slice(data);
}

/// Emit the coinbase output bytes for a commitment. The inverse of
/// [`parse_commitment`] for every variant except [`Commitment::BlindMerkleCommit`],
/// whose emission is critical-data bytes rather than an `OP_RETURN` script.
pub fn emit_commitment(commitment: &Commitment) -> Vec<u8> {
    match commitment {
        Commitment::None => Vec::new(),
        Commitment::ProposalCommit(proposal) => {
            let mut buf = vec![OP_RETURN, TAG_PROPOSAL, SCDB_VERSION];
            buf.push(proposal.slot);
            buf.push(proposal.version);
            push_length_prefixed(&mut buf, proposal.title.as_bytes());
            push_length_prefixed(&mut buf, proposal.description.as_bytes());
            push_length_prefixed(&mut buf, &proposal.deposit_script);
            buf.extend_from_slice(&proposal.key_id);
            match proposal.hash_id_1 {
                Some(h) => {
                    buf.push(1);
                    buf.extend_from_slice(&h);
                }
                None => buf.push(0),
            }
            match proposal.hash_id_2 {
                Some(h) => {
                    buf.push(1);
                    buf.extend_from_slice(&h);
                }
                None => buf.push(0),
            }
            buf
        }
        Commitment::ActivationAck(hash) => {
            let mut buf = vec![OP_RETURN, TAG_ACK, SCDB_VERSION];
            buf.extend_from_slice(hash);
            buf
        }
        Commitment::BundleVote {
            slot,
            bundle_hash,
            kind,
        } => {
            let mut buf = vec![OP_RETURN, TAG_BUNDLE_VOTE, SCDB_VERSION, *slot];
            buf.extend_from_slice(bundle_hash);
            buf.push(match kind {
                VoteKind::Upvote => 0,
                VoteKind::Downvote => 1,
                VoteKind::Abstain => 2,
            });
            buf
        }
        Commitment::StateScript(tokens) => {
            // No tag byte: `OP_RETURN VERSION VDELIM …` is the canonical
            // on-chain grammar, tag-less unlike every other commitment kind.
            let mut buf = vec![OP_RETURN, SCDB_VERSION, VDELIM];
            buf.extend_from_slice(tokens);
            buf
        }
        Commitment::BlindMerkleCommit {
            slot,
            prev_block_ref,
            ..
        } => {
            let mut buf = Vec::from(BMM_PREFIX);
            let slot_bytes = scriptnum_encode(*slot as i64);
            buf.push(slot_bytes.len() as u8);
            buf.extend_from_slice(&slot_bytes);
            buf.push(BMM_PREV_BLOCK_TAG);
            buf.extend_from_slice(prev_block_ref);
            buf
        }
    }
}

/// Emit the canonical state script for an ordered list of per-sidechain
/// vote vectors (one inner `Vec<bool>` per active sidechain in slot order,
/// `true` meaning VERIFY for that bundle position).
pub fn emit_state_script(per_sidechain_votes: &[Vec<bool>]) -> Vec<u8> {
    let mut tokens = Vec::new();
    for (i, bundle_votes) in per_sidechain_votes.iter().enumerate() {
        if i > 0 {
            tokens.push(SC_DELIM);
        }
        for (j, &verify) in bundle_votes.iter().enumerate() {
            if j > 0 {
                tokens.push(WT_DELIM);
            }
            tokens.push(if verify { VERIFY } else { REJECT });
        }
    }
    if tokens.is_empty() {
        return Vec::new();
    }
    emit_commitment(&Commitment::StateScript(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scdb_emits_empty_script() {
        assert_eq!(emit_state_script(&[]), Vec::<u8>::new());
    }

    #[test]
    fn three_sidechains_one_upvoted_bundle_each() {
        let votes = vec![vec![true], vec![true], vec![true]];
        let script = emit_state_script(&votes);
        let expected = vec![
            OP_RETURN,
            SCDB_VERSION,
            VDELIM,
            VERIFY,
            SC_DELIM,
            VERIFY,
            SC_DELIM,
            VERIFY,
        ];
        assert_eq!(script, expected);
    }

    #[test]
    fn three_sidechains_three_bundles_first_up_rest_down() {
        let votes = vec![
            vec![true, false, false],
            vec![true, false, false],
            vec![true, false, false],
        ];
        let script = emit_state_script(&votes);
        let expected = vec![
            OP_RETURN,
            SCDB_VERSION,
            VDELIM,
            VERIFY,
            WT_DELIM,
            REJECT,
            WT_DELIM,
            REJECT,
            SC_DELIM,
            VERIFY,
            WT_DELIM,
            REJECT,
            WT_DELIM,
            REJECT,
            SC_DELIM,
            VERIFY,
            WT_DELIM,
            REJECT,
            WT_DELIM,
            REJECT,
        ];
        assert_eq!(script, expected);
    }

    fn sample_proposal() -> Proposal {
        Proposal {
            slot: 0,
            version: 0,
            title: "test".to_string(),
            description: "a test sidechain".to_string(),
            deposit_script: vec![0xa9, 0x14],
            key_id: [0x11; 20],
            hash_id_1: Some([0x22; 32]),
            hash_id_2: None,
        }
    }

    #[test]
    fn proposal_commit_round_trips() {
        let commitment = Commitment::ProposalCommit(sample_proposal());
        let emitted = emit_commitment(&commitment);
        assert_eq!(parse_commitment(&emitted), commitment);
    }

    #[test]
    fn activation_ack_round_trips() {
        let commitment = Commitment::ActivationAck([0x33; 32]);
        let emitted = emit_commitment(&commitment);
        assert_eq!(parse_commitment(&emitted), commitment);
    }

    #[test]
    fn bundle_vote_round_trips() {
        let commitment = Commitment::BundleVote {
            slot: 7,
            bundle_hash: [0x44; 32],
            kind: VoteKind::Downvote,
        };
        let emitted = emit_commitment(&commitment);
        assert_eq!(parse_commitment(&emitted), commitment);
    }

    #[test]
    fn state_script_round_trips() {
        let commitment = Commitment::StateScript(vec![VERIFY, SC_DELIM, REJECT]);
        let emitted = emit_commitment(&commitment);
        assert_eq!(parse_commitment(&emitted), commitment);
    }

    #[test]
    fn garbage_script_parses_to_none() {
        assert_eq!(parse_commitment(&[0x01, 0x02, 0x03]), Commitment::None);
        assert_eq!(parse_commitment(&[]), Commitment::None);
    }

    #[test]
    fn bmm_request_round_trips() {
        let commitment = Commitment::BlindMerkleCommit {
            slot: 200,
            prev_block_ref: *b"abcd",
            hash_critical: [0u8; 32],
        };
        let emitted = emit_commitment(&commitment);
        let parsed = parse_bmm_request(&emitted).unwrap();
        match parsed {
            Commitment::BlindMerkleCommit {
                slot,
                prev_block_ref,
                hash_critical,
            } => {
                assert_eq!(slot, 200);
                assert_eq!(prev_block_ref, *b"abcd");
                assert_eq!(hash_critical, sha256d(&emitted));
            }
            other => panic!("expected BlindMerkleCommit, got {other:?}"),
        }
    }

    #[test]
    fn bmm_request_zero_push_is_slot_zero() {
        let mut data = Vec::from(BMM_PREFIX);
        data.push(0x00);
        data.push(BMM_PREV_BLOCK_TAG);
        data.extend_from_slice(b"xyzw");
        let parsed = parse_bmm_request(&data).unwrap();
        assert_eq!(
            parsed,
            Commitment::BlindMerkleCommit {
                slot: 0,
                prev_block_ref: *b"xyzw",
                hash_critical: sha256d(&data),
            }
        );
    }

    #[test]
    fn bmm_request_rejects_bad_prefix() {
        assert!(parse_bmm_request(&[0x00, 0x00, 0x00, 0x00, 0x04, 1, 2, 3, 4]).is_none());
    }

    #[test]
    fn scriptnum_round_trips_boundary_values() {
        for n in [0i64, 1, -1, 127, 128, -128, 255, -255, 256] {
            let encoded = scriptnum_encode(n);
            assert_eq!(scriptnum_decode(&encoded), n, "n={n}");
        }
    }
}
