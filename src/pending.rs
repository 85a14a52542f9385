//! Deferred votes: messages referencing a block this node has not imported
//! yet, held until the block arrives (or the entry ages out).
//!
//! Shaped after the teacher's `consensus::orphans::Orphans`, which holds
//! votes indexed by their unseen target block in a `HashMap<Hash, Vec<Vote>>`
//! alongside a timestamp per orphaned subtree. Here the map is indexed by
//! the missing block directly (the graph doesn't need an orphan subtree —
//! `VoteGraph::insert` already handles branch introduction once the
//! ancestry is known) and capacity-bounded per `spec.md` §7's Transient
//! category, evicting the oldest entry rather than growing unbounded.

use std::collections::HashMap;
use std::time::Instant;

use tracing::warn;

use crate::vote::{Hash, SignedMessage};

struct PendingEntry {
  votes: Vec<(u64, u64, SignedMessage)>,
  first_seen: Instant,
}

/// Holds votes whose target block has not been imported yet, bounded by
/// `capacity` distinct missing blocks. Each deferred vote keeps the
/// `(round_number, set_id)` it arrived addressed to, since a bare
/// [`SignedMessage`] does not carry that context on its own
/// (`crate::vote::SignedPayload` does, but only at signing/verification
/// time) and a resolved vote must be replayed against the same round.
pub struct PendingVotes {
  capacity: usize,
  by_missing_block: HashMap<Hash, PendingEntry>,
}

impl PendingVotes {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0);
    Self { capacity, by_missing_block: HashMap::with_capacity(capacity) }
  }

  /// Defers `message` (addressed to `round_number`/`set_id`) under
  /// `missing_block`, the ancestor it or its target needs that this node
  /// does not yet have.
  pub fn defer(&mut self, missing_block: Hash, round_number: u64, set_id: u64, message: SignedMessage) {
    if !self.by_missing_block.contains_key(&missing_block) && self.by_missing_block.len() >= self.capacity {
      self.evict_oldest();
    }

    self
      .by_missing_block
      .entry(missing_block)
      .or_insert_with(|| PendingEntry { votes: Vec::new(), first_seen: Instant::now() })
      .votes
      .push((round_number, set_id, message));
  }

  /// Removes and returns every vote that was waiting on `block`, once it
  /// has been imported.
  pub fn resolve(&mut self, block: &Hash) -> Option<Vec<(u64, u64, SignedMessage)>> {
    self.by_missing_block.remove(block).map(|entry| entry.votes)
  }

  pub fn len(&self) -> usize {
    self.by_missing_block.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_missing_block.is_empty()
  }

  fn evict_oldest(&mut self) {
    if let Some(&oldest) = self
      .by_missing_block
      .iter()
      .min_by_key(|(_, entry)| entry.first_seen)
      .map(|(hash, _)| hash)
    {
      warn!(capacity = self.capacity, "pending vote capacity reached, dropping oldest deferred block");
      self.by_missing_block.remove(&oldest);
    }
  }
}
