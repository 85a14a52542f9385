//! The wire-level vote data model: block identifiers, the three vote
//! variants, and signed messages.
//!
//! The signed-payload layout in [`SignedPayload`] is bit-exact per `spec.md`
//! §6 and MUST NOT change without breaking interop with other
//! implementations of this protocol.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A 32-byte block hash. Opaque to this crate — hashing itself is a
/// collaborator concern (the `Chain`/`BlockTree` interfaces of `spec.md`
/// §6), never computed here.
pub type Hash = [u8; 32];

/// A 32-byte authority (voter) identifier.
pub type AuthorityId = [u8; 32];

/// A 64-byte Ed25519-shaped signature. Verified and produced only through
/// [`crate::crypto::CryptoProvider`] — never inspected byte-by-byte here.
pub type Signature = [u8; 64];

/// `(number, hash)` pair identifying a block.
///
/// Equality is on both fields; ordering is lexicographic on
/// `(number, hash)`, used only to break ties deterministically in tests and
/// logs — finality decisions never depend on hash ordering (`spec.md`
/// §4.4.2's tie-break is by weight, not hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockInfo {
  pub number: u64,
  pub hash: Hash,
}

impl BlockInfo {
  pub fn new(number: u64, hash: Hash) -> Self {
    Self { number, hash }
  }
}

impl PartialOrd for BlockInfo {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for BlockInfo {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.number, self.hash).cmp(&(other.number, other.hash))
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}:{}", self.number, bs58::encode(self.hash).into_string())
  }
}

/// Tag byte for each vote variant. Load-bearing for the signed payload
/// (`spec.md` §3/§6) — never renumber these.
pub const PREVOTE_TAG: u8 = 0;
pub const PRECOMMIT_TAG: u8 = 1;
pub const PRIMARY_PROPOSE_TAG: u8 = 2;

/// One of the three messages cast during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
  Prevote(BlockInfo),
  Precommit(BlockInfo),
  PrimaryPropose(BlockInfo),
}

impl Vote {
  pub fn target(&self) -> BlockInfo {
    match *self {
      Vote::Prevote(b) | Vote::Precommit(b) | Vote::PrimaryPropose(b) => b,
    }
  }

  pub fn tag(&self) -> u8 {
    match self {
      Vote::Prevote(_) => PREVOTE_TAG,
      Vote::Precommit(_) => PRECOMMIT_TAG,
      Vote::PrimaryPropose(_) => PRIMARY_PROPOSE_TAG,
    }
  }
}

/// The two vote types that feed the vote graph and trackers. `PrimaryPropose`
/// is not one of these: it never accumulates weight, it only seeds the
/// prevote target (`spec.md` §4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteType {
  Prevote,
  Precommit,
}

impl fmt::Display for VoteType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VoteType::Prevote => write!(f, "prevote"),
      VoteType::Precommit => write!(f, "precommit"),
    }
  }
}

/// A vote plus its signature and signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
  pub message: Vote,
  pub signature: Signature,
  pub id: AuthorityId,
}

impl SignedMessage {
  pub fn target(&self) -> BlockInfo {
    self.message.target()
  }
}

/// The exact byte layout signed for any vote, per `spec.md` §6: the
/// concatenation produced by canonically encoding
/// `(variant_tag: u8, message: Vote, round_number: u64, voter_set_id: u64)`
/// in that order. `bincode` is used as the canonical encoder — `spec.md`
/// leaves the wire format open except for this exact tuple shape.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SignedPayload {
  pub variant_tag: u8,
  pub message: Vote,
  pub round_number: u64,
  pub voter_set_id: u64,
}

impl SignedPayload {
  pub fn new(message: Vote, round_number: u64, voter_set_id: u64) -> Self {
    Self { variant_tag: message.tag(), message, round_number, voter_set_id }
  }

  /// Canonical bytes signed by a voter and checked by a verifier.
  pub fn encode(&self) -> Vec<u8> {
    bincode::serialize(self).expect("in-memory encode of a plain tuple cannot fail")
  }
}

/// A pair of signed messages proving the same voter cast two different
/// votes of the same type in the same round.
///
/// Invariant (checked by [`crate::vote_tracker::VoteTracker::push`], not by
/// this type's constructor): both carry the same variant tag and voter id,
/// and differ in `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Equivocation {
  pub first: SignedMessage,
  pub second: SignedMessage,
}
