//! GRANDPA finality gadget core: vote graph, voting round and
//! round-chaining coordinator.
//!
//! This crate implements the finality algorithm only — block production,
//! networking transport, storage backends and the authority-set source of
//! truth are collaborator traits (see [`interfaces`]) a host node supplies.

mod config;
mod coordinator;
mod crypto;
mod error;
mod interfaces;
mod justification_queue;
mod lru;
mod pending;
mod round;
mod vote;
mod vote_graph;
mod vote_tracker;
mod vote_weight;
mod voter_set;

#[cfg(test)]
pub mod testing;

pub use config::Config;
pub use coordinator::{guess_set_id, Coordinator, DispatchContext, NullBlockFetcher};
pub use crypto::VoteCryptoProvider;
pub use error::{CoordinatorError, GraphError, RoundError, VoterSetError};
pub use interfaces::{
  AuthorityManager, AuthoritySetChange, CatchUpRequest, CatchUpResponse, Chain, Commit, FullCommitMessage,
  GrandpaJustification, Storage, Transmitter,
};
pub use justification_queue::{BlockFetcher, JustificationSink, VerifiedJustificationQueue};
pub use lru::SmallLruCache;
pub use pending::PendingVotes;
pub use round::{MovableRoundState, Phase, VotingRound};
pub use vote::{AuthorityId, BlockInfo, Equivocation, Hash, Signature, SignedMessage, Vote, VoteType};
pub use vote_graph::{Subchain, VoteGraph};
pub use vote_tracker::VoteTracker;
pub use vote_weight::VoteWeight;
pub use voter_set::{VoterInfo, VoterSet};
