//! Per-round, per-vote-type bookkeeping of who voted for what, and
//! detection of double votes.
//!
//! Ported from the original's `VoteTracker<Vote>`: a map from voter id to
//! their single recorded vote, plus a second map holding the pair of
//! messages for anyone caught equivocating. `spec.md` §2 C3 calls the three
//! outcomes `FirstSeen`/`Duplicate`/`Equivocation`; the original calls them
//! `SUCCESS`/`DUPLICATED`/`VOTED_TWICE`.

use std::collections::{HashMap, HashSet};

use crate::vote::{AuthorityId, Equivocation, SignedMessage};

/// Outcome of pushing a vote into a [`VoteTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
  /// First vote of this type seen from this voter this round.
  FirstSeen,
  /// Identical to the vote already on file; ignored.
  Duplicate,
  /// Differs from the vote already on file: an equivocation.
  Equivocation,
}

/// Tracks one vote type (prevote or precommit) for one round.
///
/// `total_weight` counts each voter's weight at most once (`spec.md` §3): it
/// is credited on a voter's first vote and never touched again, including
/// when that voter later equivocates.
#[derive(Debug, Clone, Default)]
pub struct VoteTracker {
  votes: HashMap<AuthorityId, SignedMessage>,
  equivocations: HashMap<AuthorityId, Equivocation>,
  total_weight: u64,
}

impl VoteTracker {
  pub fn new() -> Self {
    Self { votes: HashMap::new(), equivocations: HashMap::new(), total_weight: 0 }
  }

  /// Records `message` (cast by a voter of `weight`) from its signer. Only
  /// the first two distinct votes from a voter are ever retained; a third
  /// (or later) distinct vote from an already-equivocating voter is reported
  /// as [`PushOutcome::Equivocation`] again but does not replace the
  /// recorded pair, matching the original's single `eq_votes_` slot per id
  /// (`spec.md` §4.2).
  pub fn push(&mut self, message: SignedMessage, weight: u64) -> PushOutcome {
    let id = message.id;
    match self.votes.get(&id) {
      None => {
        self.votes.insert(id, message);
        self.total_weight = self.total_weight.saturating_add(weight);
        PushOutcome::FirstSeen
      }
      Some(existing) if existing.message == message.message => PushOutcome::Duplicate,
      Some(existing) => {
        self.equivocations.entry(id).or_insert(Equivocation { first: *existing, second: message });
        PushOutcome::Equivocation
      }
    }
  }

  pub fn votes(&self) -> impl Iterator<Item = &SignedMessage> {
    self.votes.values()
  }

  pub fn vote_of(&self, id: &AuthorityId) -> Option<&SignedMessage> {
    self.votes.get(id)
  }

  pub fn equivocations(&self) -> impl Iterator<Item = &Equivocation> {
    self.equivocations.values()
  }

  pub fn is_equivocator(&self, id: &AuthorityId) -> bool {
    self.equivocations.contains_key(id)
  }

  pub fn equivocator_count(&self) -> usize {
    self.equivocations.len()
  }

  /// Sum of each distinct voter's weight, counted exactly once regardless
  /// of whether they later equivocated (`spec.md` §3/§8 property 3).
  pub fn total_weight(&self) -> u64 {
    self.total_weight
  }

  /// Every distinct message this tracker has ever accepted: each
  /// non-equivocating voter's single vote, plus both halves of every
  /// equivocation pair (`spec.md` §4.2).
  pub fn messages(&self) -> impl Iterator<Item = &SignedMessage> {
    let equivocator_ids: HashSet<AuthorityId> = self.equivocations.keys().copied().collect();
    self
      .votes
      .iter()
      .filter(move |(id, _)| !equivocator_ids.contains(*id))
      .map(|(_, message)| message)
      .chain(self.equivocations.values().flat_map(|eq| [&eq.first, &eq.second]))
  }
}
