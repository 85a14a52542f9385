//! One GRANDPA voting round: phase timers, our own proposal/prevote/precommit,
//! and the estimate/completability/finalization recomputation that runs after
//! every accepted vote.
//!
//! Ported from the original's `RoundState`/`VotingRound` pair (`round.hpp`,
//! `voting_round.hpp`, `voting_round_update.hpp`). Per `spec.md` §9's design
//! note, a round never holds a reference back to the coordinator — only to
//! the `Chain`/`Transmitter`/`VoteCryptoProvider` collaborators (`spec.md`
//! §6) — so the coordinator is free to retain a finished round independently
//! of whatever the round itself does next.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::crypto::VoteCryptoProvider;
use crate::error::RoundError;
use crate::interfaces::{CatchUpResponse, Chain, Transmitter};
use crate::vote::{AuthorityId, BlockInfo, SignedMessage, Vote, VoteType};
use crate::vote_graph::VoteGraph;
use crate::vote_tracker::{PushOutcome, VoteTracker};
use crate::vote_weight::VoteWeight;
use crate::voter_set::VoterSet;

/// The persisted checkpoint for one round (`spec.md` §3's `MovableRoundState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovableRoundState {
  pub round_number: u64,
  pub last_finalized_block: BlockInfo,
  pub votes: Vec<SignedMessage>,
  pub finalized: Option<BlockInfo>,
}

/// The phase a round is currently in (`spec.md` §4.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Start,
  Proposed,
  Prevoted,
  Precommitted,
  Completed,
}

/// One running GRANDPA round, generic over its collaborators the same way
/// the teacher's `consensus::Chain<D: BlockData>` is generic over its block
/// payload type.
pub struct VotingRound<C, T, P> {
  round_number: u64,
  voter_set: VoterSet,
  chain: Arc<C>,
  transmitter: Arc<T>,
  crypto: Arc<P>,
  config: Config,

  graph: VoteGraph,
  prevotes: VoteTracker,
  precommits: VoteTracker,
  prevote_equivocators: Vec<bool>,
  precommit_equivocators: Vec<bool>,
  historical_votes: Vec<SignedMessage>,

  primary_proposal: Option<BlockInfo>,
  our_prevote: Option<BlockInfo>,
  our_precommit: Option<BlockInfo>,

  phase: Phase,
  phase_deadline: Instant,

  prevote_ghost: Option<BlockInfo>,
  estimate: Option<BlockInfo>,
  finalized: Option<BlockInfo>,
  completable: bool,
}

impl<C, T, P> VotingRound<C, T, P>
where
  C: Chain,
  T: Transmitter,
  P: VoteCryptoProvider,
{
  /// Starts round `round_number`, its vote graph rooted at `base` (the
  /// previous round's finalized block, or genesis for round 0).
  pub fn new(
    round_number: u64,
    voter_set: VoterSet,
    base: BlockInfo,
    chain: Arc<C>,
    transmitter: Arc<T>,
    crypto: Arc<P>,
    config: Config,
  ) -> Self {
    let voter_count = voter_set.len();
    Self {
      round_number,
      graph: VoteGraph::new(base, voter_set.clone()),
      prevotes: VoteTracker::new(),
      precommits: VoteTracker::new(),
      prevote_equivocators: vec![false; voter_count],
      precommit_equivocators: vec![false; voter_count],
      historical_votes: Vec::new(),
      primary_proposal: None,
      our_prevote: None,
      our_precommit: None,
      phase: Phase::Start,
      phase_deadline: Instant::now(),
      prevote_ghost: None,
      estimate: None,
      finalized: None,
      completable: false,
      voter_set,
      chain,
      transmitter,
      crypto,
      config,
    }
  }

  /// Rebuilds a round from its persisted [`MovableRoundState`], replaying
  /// every recorded vote through the normal insertion path. Used on restart
  /// (`spec.md` §4.7.1) and to reconstruct a round from a catch-up response
  /// (`spec.md` §8 property 7).
  pub async fn from_movable_state(
    state: MovableRoundState,
    voter_set: VoterSet,
    chain: Arc<C>,
    transmitter: Arc<T>,
    crypto: Arc<P>,
    config: Config,
  ) -> Result<Self, RoundError> {
    let mut round = Self::new(
      state.round_number,
      voter_set,
      state.last_finalized_block,
      chain,
      transmitter,
      crypto,
      config,
    );
    for message in state.votes {
      let vote_type = match message.message {
        Vote::Prevote(_) => Some(VoteType::Prevote),
        Vote::Precommit(_) => Some(VoteType::Precommit),
        Vote::PrimaryPropose(_) => None,
      };
      if let Some(vote_type) = vote_type {
        round.record_vote(vote_type, message).await?;
      }
    }
    round.phase = Phase::Precommitted;
    Ok(round)
  }

  pub fn round_number(&self) -> u64 {
    self.round_number
  }

  pub fn set_id(&self) -> u64 {
    self.voter_set.set_id()
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn base(&self) -> BlockInfo {
    self.graph.base()
  }

  pub fn prevote_ghost(&self) -> Option<BlockInfo> {
    self.prevote_ghost
  }

  pub fn estimate(&self) -> Option<BlockInfo> {
    self.estimate
  }

  pub fn finalized(&self) -> Option<BlockInfo> {
    self.finalized
  }

  pub fn completable(&self) -> bool {
    self.completable
  }

  pub fn graph(&self) -> &VoteGraph {
    &self.graph
  }

  pub fn voter_set(&self) -> &VoterSet {
    &self.voter_set
  }

  /// Every vote this round has accepted, in receipt order
  /// (`SPEC_FULL.md` §B.1's historical vote log).
  pub fn historical_votes(&self) -> &[SignedMessage] {
    &self.historical_votes
  }

  /// The only authority allowed to cast [`Vote::PrimaryPropose`] this round
  /// (`spec.md` §4.6.2).
  pub fn primary_id(&self) -> AuthorityId {
    let index = (self.round_number % self.voter_set.len() as u64) as usize;
    self
      .voter_set
      .get_by_index(index)
      .expect("round_number % len() is always a valid index")
      .id
  }

  /// Builds the persisted checkpoint for this round (`spec.md` §3).
  pub fn movable_state(&self) -> MovableRoundState {
    let mut votes: Vec<SignedMessage> = self.prevotes.messages().copied().collect();
    votes.extend(self.precommits.messages().copied());
    MovableRoundState {
      round_number: self.round_number,
      last_finalized_block: self.graph.base(),
      votes,
      finalized: self.finalized,
    }
  }

  /// Assembles a response to a catch-up request for this (completed) round
  /// (`spec.md` §4.6.7). Returns `None` if this round never finalized.
  pub fn catch_up_response(&self) -> Option<CatchUpResponse> {
    let best_final_candidate = self.finalized?;
    let prevotes = self
      .prevotes
      .messages()
      .filter(|m| self.graph.is_equal_or_ancestor(m.target(), best_final_candidate))
      .copied()
      .collect();
    let precommits = self
      .precommits
      .messages()
      .filter(|m| self.graph.is_equal_or_ancestor(m.target(), best_final_candidate))
      .copied()
      .collect();
    Some(CatchUpResponse {
      round_number: self.round_number,
      set_id: self.voter_set.set_id(),
      prevotes,
      precommits,
      base: self.graph.base(),
      best_final_candidate,
    })
  }

  /// Accepts a primary proposal. Per `spec.md` §4.6.2, a proposal from any
  /// voter other than [`VotingRound::primary_id`] is a protocol fault and
  /// never affects the round.
  pub async fn on_primary_propose(&mut self, signed: SignedMessage) -> Result<(), RoundError> {
    if signed.id != self.primary_id() {
      return Err(RoundError::NotPrimary);
    }
    if let Vote::PrimaryPropose(block) = signed.message {
      debug!(round = self.round_number, block = %block, "primary proposal accepted");
      self.primary_proposal = Some(block);
      self.historical_votes.push(signed);
      self.maybe_advance_from_proposed().await?;
    }
    Ok(())
  }

  pub async fn on_prevote(&mut self, signed: SignedMessage) -> Result<(), RoundError> {
    self.record_vote(VoteType::Prevote, signed).await?;
    Ok(())
  }

  pub async fn on_precommit(&mut self, signed: SignedMessage) -> Result<(), RoundError> {
    self.record_vote(VoteType::Precommit, signed).await?;
    Ok(())
  }

  /// Casts our own prevote, if we hold a key in this round's voter set and
  /// have not already voted (`spec.md` §4.6.3).
  pub async fn prevote(&mut self) -> Result<Option<SignedMessage>, RoundError> {
    if self.our_prevote.is_some() {
      return Ok(None);
    }
    let local_id = match self.crypto.local_id() {
      Some(id) if self.voter_set.contains(&id) => id,
      _ => return Ok(None),
    };

    let base = self.graph.base();
    let best = self
      .chain
      .best_chain_containing(base.hash)
      .await
      .ok_or(RoundError::NoIncomingChain)?;

    let mut target = best;
    if let Some(proposal) = self.primary_proposal {
      if proposal.number > base.number
        && self.chain.is_equal_or_descendant_of(proposal.hash, best.hash).await
      {
        target = proposal;
      }
    }

    let signed = match self.crypto.sign(Vote::Prevote(target), self.round_number, self.voter_set.set_id()).await {
      Some(signed) => signed,
      None => return Ok(None),
    };
    debug_assert_eq!(signed.id, local_id);

    self.our_prevote = Some(target);
    self.record_vote(VoteType::Prevote, signed).await?;
    self.transmitter.broadcast_vote(self.round_number, self.voter_set.set_id(), signed).await;
    info!(round = self.round_number, target = %target, "cast prevote");
    Ok(Some(signed))
  }

  /// Casts our own precommit, once the prevote GHOST clears the threshold
  /// (`spec.md` §4.6.4).
  pub async fn precommit(&mut self) -> Result<Option<SignedMessage>, RoundError> {
    if self.our_precommit.is_some() {
      return Ok(None);
    }
    let local_id = match self.crypto.local_id() {
      Some(id) if self.voter_set.contains(&id) => id,
      _ => return Ok(None),
    };

    let ghost = match self.prevote_ghost {
      Some(ghost) => ghost,
      None => return Ok(None),
    };

    let signed = match self.crypto.sign(Vote::Precommit(ghost), self.round_number, self.voter_set.set_id()).await {
      Some(signed) => signed,
      None => return Ok(None),
    };
    debug_assert_eq!(signed.id, local_id);

    self.our_precommit = Some(ghost);
    self.record_vote(VoteType::Precommit, signed).await?;
    self.transmitter.broadcast_vote(self.round_number, self.voter_set.set_id(), signed).await;
    info!(round = self.round_number, target = %ghost, "cast precommit");
    Ok(Some(signed))
  }

  /// Drives the round's phase timers forward. Called repeatedly by the
  /// coordinator's main loop (and by the liveness watchdog, `spec.md`
  /// §4.7.1) with the current time; advisory per `spec.md` §4.6.1 — a vote
  /// arriving through [`VotingRound::on_prevote`]/[`VotingRound::on_precommit`]
  /// can make the next call to this function a no-op rather than the one
  /// that actually casts our vote.
  pub async fn tick(&mut self, now: Instant) -> Result<(), RoundError> {
    let span = info_span!("round_tick", round = self.round_number, set_id = self.voter_set.set_id());
    let _enter = span.enter();

    match self.phase {
      Phase::Start => {
        self.maybe_propose().await?;
        self.phase = Phase::Proposed;
        self.phase_deadline = now + self.config.round_duration * 2;
        self.maybe_advance_from_proposed().await?;
      }
      Phase::Proposed => {
        if now >= self.phase_deadline {
          self.prevote().await?;
          self.phase = Phase::Prevoted;
          self.phase_deadline = now + self.config.round_duration * 2;
        }
      }
      Phase::Prevoted => {
        if now >= self.phase_deadline {
          self.precommit().await?;
          self.phase = Phase::Precommitted;
        }
      }
      Phase::Precommitted => {
        if self.completable {
          info!(round = self.round_number, "round completable");
          self.phase = Phase::Completed;
        }
      }
      Phase::Completed => {}
    }
    Ok(())
  }

  async fn maybe_propose(&mut self) -> Result<(), RoundError> {
    let local_id = match self.crypto.local_id() {
      Some(id) => id,
      None => return Ok(()),
    };
    if local_id != self.primary_id() {
      return Ok(());
    }
    let base = self.graph.base();
    let best = match self.chain.best_chain_containing(base.hash).await {
      Some(best) => best,
      None => return Ok(()),
    };
    if best.number <= base.number {
      return Ok(());
    }
    if let Some(signed) = self
      .crypto
      .sign(Vote::PrimaryPropose(best), self.round_number, self.voter_set.set_id())
      .await
    {
      self.primary_proposal = Some(best);
      self.historical_votes.push(signed);
      self.transmitter.broadcast_vote(self.round_number, self.voter_set.set_id(), signed).await;
      info!(round = self.round_number, block = %best, "broadcast primary proposal");
    }
    Ok(())
  }

  /// A primary proposal arriving while the round is still waiting out its
  /// `Proposed` timer lets it move on immediately instead of waiting for
  /// `phase_deadline` — `spec.md` §4.6.1's `Proposed` exit condition is
  /// "proposal sent/received **or** timer fires", not the timer alone. An
  /// observer with no local key still advances here (it has no prevote of
  /// its own to cast, but nothing further gates its phase on this event
  /// either).
  async fn maybe_advance_from_proposed(&mut self) -> Result<(), RoundError> {
    if self.phase != Phase::Proposed || self.primary_proposal.is_none() {
      return Ok(());
    }
    self.prevote().await?;
    self.phase = Phase::Prevoted;
    self.phase_deadline = Instant::now() + self.config.round_duration * 2;
    Ok(())
  }

  async fn record_vote(&mut self, vote_type: VoteType, signed: SignedMessage) -> Result<(), RoundError> {
    let voter = match self.voter_set.get(&signed.id) {
      Some(voter) => *voter,
      None => {
        warn!(id = ?signed.id, "dropping vote from unknown voter");
        return Ok(());
      }
    };

    let outcome = self.tracker_mut(vote_type).push(signed, voter.weight);
    match outcome {
      PushOutcome::Duplicate => return Ok(()),
      PushOutcome::Equivocation => {
        warn!(round = self.round_number, id = ?signed.id, vote_type = %vote_type, "equivocation detected");
        self.equivocators_mut(vote_type)[voter.index] = true;
      }
      PushOutcome::FirstSeen => {}
    }

    let target = signed.target();
    let base = self.graph.base();
    let ancestry = if self.graph.contains(&target.hash) || target.hash == base.hash {
      Vec::new()
    } else {
      self.chain.get_ancestry(base.hash, target.hash).await?
    };

    self.graph.insert(vote_type, target, voter.index, voter.weight, &ancestry)?;
    self.historical_votes.push(signed);
    self.recompute();
    Ok(())
  }

  fn tracker_mut(&mut self, vote_type: VoteType) -> &mut VoteTracker {
    match vote_type {
      VoteType::Prevote => &mut self.prevotes,
      VoteType::Precommit => &mut self.precommits,
    }
  }

  fn equivocators_mut(&mut self, vote_type: VoteType) -> &mut [bool] {
    match vote_type {
      VoteType::Prevote => &mut self.prevote_equivocators,
      VoteType::Precommit => &mut self.precommit_equivocators,
    }
  }

  /// Recomputes `prevote_ghost`, `estimate`, `finalized` and `completable`
  /// from scratch (`spec.md` §4.6.5). Called after every accepted vote.
  fn recompute(&mut self) {
    let threshold = self.voter_set.threshold();
    let total_weight = self.voter_set.total_weight();
    let prevote_equivocators = self.prevote_equivocators.clone();
    let precommit_equivocators = self.precommit_equivocators.clone();
    let voter_set = self.voter_set.clone();

    let equivocator_prevote_weight: u64 = voter_set
      .iter()
      .filter(|v| prevote_equivocators.get(v.index).copied().unwrap_or(false))
      .map(|v| v.weight)
      .sum();

    {
      let voter_set = &voter_set;
      let equivocators = &prevote_equivocators;
      self.prevote_ghost = self.graph.find_ghost(VoteType::Prevote, None, |w| {
        w.total(VoteType::Prevote, equivocators, voter_set) >= threshold
      });
    }

    self.estimate = match self.prevote_ghost {
      None => None,
      Some(ghost) => {
        let estimate = self.graph.find_ancestor(VoteType::Prevote, ghost, |w| {
          total_weight.saturating_sub(w.sum(VoteType::Prevote)).saturating_add(equivocator_prevote_weight) < threshold
        });
        estimate.or(Some(self.graph.base()))
      }
    };

    self.finalized = match self.estimate {
      None => None,
      Some(estimate) => {
        let voter_set = &voter_set;
        let equivocators = &precommit_equivocators;
        self.graph.find_ghost(VoteType::Precommit, Some(estimate), |w| {
          w.total(VoteType::Precommit, equivocators, voter_set) >= threshold
        })
      }
    };

    self.completable = match (self.estimate, self.prevote_ghost) {
      (Some(estimate), Some(ghost)) if estimate.number < ghost.number => true,
      (Some(estimate), Some(ghost)) if estimate == ghost => {
        let still_contestable = self.graph.find_ghost(VoteType::Prevote, Some(estimate), |w| {
          total_weight.saturating_sub(w.sum(VoteType::Prevote)).saturating_add(equivocator_prevote_weight) < threshold
        });
        still_contestable == Some(estimate)
      }
      _ => false,
    };

    if let Some(finalized) = self.finalized {
      if finalized.number > self.graph.base().number {
        info!(round = self.round_number, finalized = %finalized, "round reached a new finalized block");
      }
    }
  }
}
