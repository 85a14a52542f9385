//! Error taxonomy for the finality core.
//!
//! Each fallible surface gets its own `thiserror` enum rather than one
//! crate-wide error, following the shape of `Keypair`'s `KeypairError` in
//! the node this crate was extracted from: a small enum named after the
//! component, with enough context in each variant for the call site to log
//! it directly.

use thiserror::Error;

use crate::vote::BlockInfo;

/// Errors returned by [`crate::vote_graph::VoteGraph`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GraphError {
  #[error("block {0:?} is below the graph base")]
  ReceivedBlockLessThanBase(BlockInfo),

  #[error("new base {new:?} is not an ancestor of the old base {old:?}")]
  NewerBaseThanOld { old: BlockInfo, new: BlockInfo },

  #[error("no entry found for block {0:?}")]
  UnknownBlock(BlockInfo),

  #[error("chain collaborator could not produce an ancestry for {0:?}")]
  UnknownAncestry(BlockInfo),
}

/// Errors returned by [`crate::voter_set::VoterSet`] construction.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum VoterSetError {
  #[error("duplicate voter id in voter set")]
  DuplicateVoter,

  #[error("voter set must have at least one member")]
  Empty,
}

/// Errors surfaced while driving a single [`crate::round::VotingRound`].
#[derive(Debug, Error)]
pub enum RoundError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("primary proposal received from non-primary voter")]
  NotPrimary,

  #[error("chain collaborator has no block to propose from")]
  NoIncomingChain,
}

/// The §7 error taxonomy surfaced by the coordinator.
///
/// `BadMessage` and `ProtocolFault` are recoverable per-message faults;
/// `Transient` means the vote was deferred, not dropped; `Fatal` means the
/// coordinator has stopped and the process supervisor must decide whether
/// to restart it.
#[derive(Debug, Error)]
pub enum CoordinatorError {
  #[error("bad message from {peer:?}: {reason}")]
  BadMessage { peer: Option<[u8; 32]>, reason: String },

  #[error("protocol fault by {peer:?}: {reason}")]
  ProtocolFault { peer: Option<[u8; 32]>, reason: String },

  #[error("transient error, vote on {0:?} deferred: {1}")]
  Transient(BlockInfo, String),

  #[error("fatal error, coordinator halted: {0}")]
  Fatal(String),

  #[error(transparent)]
  Round(#[from] RoundError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  VoterSet(#[from] VoterSetError),
}
