//! An in-memory parent-pointer [`Chain`], and no-op [`Transmitter`]/[`Storage`]
//! /[`AuthorityManager`] stand-ins for round and coordinator tests.
//!
//! The chain itself is shaped like the teacher's `consensus::forktree::TreeNode`
//! (a parent-pointer tree with a head), narrowed to the read-only ancestry
//! queries `spec.md` §6's `Chain` interface needs (`SPEC_FULL.md` §A.4).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GraphError;
use crate::interfaces::{
  AuthorityManager, AuthoritySetChange, CatchUpRequest, CatchUpResponse, Chain, FullCommitMessage,
  GrandpaJustification, Storage, Transmitter,
};
use crate::vote::{AuthorityId, BlockInfo, Hash, SignedMessage};
use crate::voter_set::VoterSet;

struct ChainInner {
  parent_of: HashMap<Hash, Hash>,
  numbers: HashMap<Hash, u64>,
  head: BlockInfo,
}

/// A chain built purely by calling [`InMemoryChain::extend`] — there is no
/// block production or import pipeline here, only the ancestry bookkeeping
/// `VotingRound`/`VoteGraph` need to drive from test scenarios.
pub struct InMemoryChain {
  inner: Mutex<ChainInner>,
}

impl InMemoryChain {
  pub fn new(genesis: BlockInfo) -> Self {
    let mut numbers = HashMap::new();
    numbers.insert(genesis.hash, genesis.number);
    Self { inner: Mutex::new(ChainInner { parent_of: HashMap::new(), numbers, head: genesis }) }
  }

  /// Appends a block with `hash` as a child of `parent`, making it the new
  /// head returned by [`Chain::best_chain_containing`].
  pub fn extend(&self, parent: BlockInfo, hash: Hash) -> BlockInfo {
    let mut inner = self.inner.lock().unwrap();
    let block = BlockInfo::new(parent.number + 1, hash);
    inner.parent_of.insert(hash, parent.hash);
    inner.numbers.insert(hash, block.number);
    inner.head = block;
    block
  }

  /// Same as [`InMemoryChain::extend`] but does not move the chain head —
  /// used to build a sibling fork alongside the current best chain.
  pub fn extend_fork(&self, parent: BlockInfo, hash: Hash) -> BlockInfo {
    let mut inner = self.inner.lock().unwrap();
    let block = BlockInfo::new(parent.number + 1, hash);
    inner.parent_of.insert(hash, parent.hash);
    inner.numbers.insert(hash, block.number);
    block
  }
}

#[async_trait]
impl Chain for InMemoryChain {
  async fn get_ancestry(&self, base: Hash, block: Hash) -> Result<Vec<Hash>, GraphError> {
    let inner = self.inner.lock().unwrap();
    let mut path = vec![block];
    let mut current = block;
    while current != base {
      match inner.parent_of.get(&current) {
        Some(&parent) => {
          path.push(parent);
          current = parent;
        }
        None => {
          let number = inner.numbers.get(&block).copied().unwrap_or(0);
          return Err(GraphError::UnknownAncestry(BlockInfo::new(number, block)));
        }
      }
    }
    Ok(path)
  }

  async fn best_chain_containing(&self, _base: Hash) -> Option<BlockInfo> {
    Some(self.inner.lock().unwrap().head)
  }

  async fn is_equal_or_descendant_of(&self, left: Hash, right: Hash) -> bool {
    if left == right {
      return true;
    }
    let inner = self.inner.lock().unwrap();
    let mut current = right;
    loop {
      match inner.parent_of.get(&current) {
        Some(&parent) if parent == left => return true,
        Some(&parent) => current = parent,
        None => return false,
      }
    }
  }
}

/// Drops every outbound message. Round/coordinator tests assert on state,
/// not on what would have gone out over the wire.
#[derive(Default)]
pub struct NullTransmitter;

#[async_trait]
impl Transmitter for NullTransmitter {
  async fn broadcast_vote(&self, _round_number: u64, _set_id: u64, _message: SignedMessage) {}
  async fn send_commit(&self, _commit: FullCommitMessage) {}
  async fn send_catch_up_request(&self, _request: CatchUpRequest) {}
  async fn send_catch_up_response(&self, _to: AuthorityId, _response: CatchUpResponse) {}
}

/// An in-memory key/value [`Storage`], standing in for the teacher's
/// `storage.rs` key/value abstraction in tests.
#[derive(Default)]
pub struct MemoryStorage {
  round_state: Mutex<HashMap<(u64, u64), Vec<u8>>>,
  justifications: Mutex<Vec<GrandpaJustification>>,
}

#[async_trait]
impl Storage for MemoryStorage {
  async fn persist_round_state(&self, round_number: u64, set_id: u64, bytes: Vec<u8>) -> Result<(), String> {
    self.round_state.lock().unwrap().insert((round_number, set_id), bytes);
    Ok(())
  }

  async fn load_round_state(&self, round_number: u64, set_id: u64) -> Result<Option<Vec<u8>>, String> {
    Ok(self.round_state.lock().unwrap().get(&(round_number, set_id)).cloned())
  }

  async fn persist_justification(&self, justification: &GrandpaJustification) -> Result<(), String> {
    self.justifications.lock().unwrap().push(justification.clone());
    Ok(())
  }
}

/// A static authority set with an optional single pending change, standing
/// in for the runtime-backed `AuthorityManager` in tests.
pub struct StaticAuthorityManager {
  current: Mutex<VoterSet>,
  pending: Mutex<Option<AuthoritySetChange>>,
}

impl StaticAuthorityManager {
  pub fn new(voter_set: VoterSet) -> Self {
    Self { current: Mutex::new(voter_set), pending: Mutex::new(None) }
  }

  pub fn schedule_change(&self, change: AuthoritySetChange) {
    *self.pending.lock().unwrap() = Some(change);
  }
}

#[async_trait]
impl AuthorityManager for StaticAuthorityManager {
  async fn current_set(&self) -> VoterSet {
    self.current.lock().unwrap().clone()
  }

  async fn pending_change(&self, finalized_number: u64) -> Option<AuthoritySetChange> {
    let pending = self.pending.lock().unwrap();
    match pending.as_ref() {
      Some(change) if change.effective_at.number.saturating_add(change.delay) <= finalized_number || change.forced => {
        Some(change.clone())
      }
      _ => None,
    }
  }

  async fn enact_change(&self, change: AuthoritySetChange) {
    let mut current = self.current.lock().unwrap();
    *current = VoterSet::new(change.next_set_id, change.next_authorities).expect("test fixture authority list is valid");
    *self.pending.lock().unwrap() = None;
  }
}
