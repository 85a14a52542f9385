//! Collaborator traits and wire types at the boundary of this crate.
//!
//! `spec.md` §6 deliberately keeps these abstract: block storage, networking,
//! and the authority-set source of truth all live outside this crate. The
//! shape mirrors the teacher's `consensus::block::Block` trait (an
//! associated-type interface the consensus core is generic over) rather
//! than depending on any concrete chain implementation.

use async_trait::async_trait;

use crate::error::GraphError;
use crate::vote::{AuthorityId, BlockInfo, Hash, SignedMessage};
use crate::voter_set::VoterSet;

/// Read-only access to block ancestry. The only chain operation the vote
/// graph and round logic need.
#[async_trait]
pub trait Chain: Send + Sync {
  /// The ancestry from `block` back to (and including) `base`, nearest-first
  /// — `result[0] == block`, `result.last() == Some(&base)`. Returns
  /// [`GraphError::UnknownAncestry`] if `block` is not a descendant of `base`.
  async fn get_ancestry(&self, base: Hash, block: Hash) -> Result<Vec<Hash>, GraphError>;

  /// Whether `block` is known to be part of the best chain the caller
  /// should be proposing from, used to seed a round's primary proposal.
  async fn best_chain_containing(&self, base: Hash) -> Option<BlockInfo>;

  /// True if `left` is an ancestor of (or equal to) `right`.
  async fn is_equal_or_descendant_of(&self, left: Hash, right: Hash) -> bool;
}

/// Source of truth for the current and pending authority sets.
#[async_trait]
pub trait AuthorityManager: Send + Sync {
  async fn current_set(&self) -> VoterSet;

  /// A scheduled or forced authority-set change enacted at or below
  /// `finalized_number`, if one is due.
  async fn pending_change(&self, finalized_number: u64) -> Option<AuthoritySetChange>;

  async fn enact_change(&self, change: AuthoritySetChange);
}

/// A change to the voter set, normal (`delay` blocks after finalizing
/// `effective_at`) or forced (enacted at import time of `effective_at`
/// regardless of finalization).
#[derive(Debug, Clone)]
pub struct AuthoritySetChange {
  pub effective_at: BlockInfo,
  pub delay: u64,
  pub forced: bool,
  pub next_authorities: Vec<(AuthorityId, u64)>,
  pub next_set_id: u64,
}

/// Sends protocol messages to peers. Transport is entirely out of scope
/// (`spec.md` §1); this is the seam a libp2p/substrate-network layer would
/// implement.
#[async_trait]
pub trait Transmitter: Send + Sync {
  async fn broadcast_vote(&self, round_number: u64, set_id: u64, message: SignedMessage);
  async fn send_commit(&self, commit: FullCommitMessage);
  async fn send_catch_up_request(&self, request: CatchUpRequest);
  async fn send_catch_up_response(&self, to: AuthorityId, response: CatchUpResponse);
}

/// Persists and restores round/justification state across restarts.
/// Mirrors the role of the teacher's `storage.rs` key-value abstraction,
/// narrowed to what the finality core itself needs to survive a restart.
#[async_trait]
pub trait Storage: Send + Sync {
  async fn persist_round_state(&self, round_number: u64, set_id: u64, bytes: Vec<u8>) -> Result<(), String>;
  async fn load_round_state(&self, round_number: u64, set_id: u64) -> Result<Option<Vec<u8>>, String>;
  async fn persist_justification(&self, justification: &GrandpaJustification) -> Result<(), String>;
}

/// A proof that `target` was finalized: the supermajority of precommits
/// that justify it.
#[derive(Debug, Clone)]
pub struct GrandpaJustification {
  pub round_number: u64,
  pub set_id: u64,
  pub target: BlockInfo,
  pub precommits: Vec<SignedMessage>,
}

/// The minimal commit message gossiped once a round finalizes a block.
#[derive(Debug, Clone)]
pub struct Commit {
  pub target: BlockInfo,
  pub precommits: Vec<SignedMessage>,
}

/// A commit plus the round/set context it was produced under, as actually
/// transmitted on the wire.
#[derive(Debug, Clone)]
pub struct FullCommitMessage {
  pub round_number: u64,
  pub set_id: u64,
  pub commit: Commit,
}

/// Request for a peer believed to be further along to send a catch-up.
#[derive(Debug, Clone, Copy)]
pub struct CatchUpRequest {
  pub round_number: u64,
  pub set_id: u64,
}

/// Enough state for a lagging voter to reconstruct the sender's completed
/// round (`spec.md` §4.6.7): both vote sets, the block the sending round
/// finalized (`best_final_candidate` in `spec.md`'s wire shape), and the
/// base the round's vote graph started from (not named in `spec.md`'s wire
/// shape, but required for the receiver to rebuild that graph from scratch
/// rather than trusting a bare finalized block with no ancestry proof).
#[derive(Debug, Clone)]
pub struct CatchUpResponse {
  pub round_number: u64,
  pub set_id: u64,
  pub prevotes: Vec<SignedMessage>,
  pub precommits: Vec<SignedMessage>,
  pub base: BlockInfo,
  pub best_final_candidate: BlockInfo,
}
