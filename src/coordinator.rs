//! The round-chaining coordinator: owns the current and previous
//! [`VotingRound`], persists their state, routes incoming votes and commits,
//! drives authority-set enactment, and runs the liveness watchdog
//! (`spec.md` §4.7).
//!
//! Ported from the original's `GrandpaImpl2` (`grandpa_impl_2.cpp`):
//! `makeInitialRound`/`makeNextRound` become [`Coordinator::start`] and the
//! private `advance_round`; `onVoteMessage`/`onFinalize` become
//! [`Coordinator::dispatch_vote`]/[`Coordinator::dispatch_commit`];
//! `readinessCheck`'s round-id comparison becomes
//! [`Coordinator::watchdog_tick`]. Unlike the original, rounds never hold a
//! strong reference back to this type (`spec.md` §9).

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::{verify_signed_message, VoteCryptoProvider};
use crate::error::CoordinatorError;
use crate::interfaces::{
  AuthorityManager, CatchUpRequest, CatchUpResponse, Chain, Commit, FullCommitMessage, GrandpaJustification, Storage,
  Transmitter,
};
use crate::justification_queue::{BlockFetcher, JustificationSink, VerifiedJustificationQueue};
use crate::lru::SmallLruCache;
use crate::pending::PendingVotes;
use crate::round::{MovableRoundState, Phase, VotingRound};
use crate::vote::{AuthorityId, BlockInfo, Hash, SignedMessage, Vote};
use crate::voter_set::VoterSet;

/// Commit gossip is widely rebroadcast; this bounds how many distinct
/// recent `(round_number, set_id)` targets are remembered to short-circuit
/// re-verifying a duplicate (`SPEC_FULL.md` §C, `src/lru.rs`'s cache).
const RECENT_COMMIT_CACHE_SIZE: usize = 16;

/// Per-dispatch bookkeeping threaded through `on_*` calls in place of the
/// original's thread-local `GrandpaContext` (`spec.md` §9;
/// `SPEC_FULL.md` §B.2): which peer sent the batch, which blocks this
/// dispatch discovered it is missing, and the diagnostic counters the
/// original also kept.
#[derive(Debug, Default, Clone)]
pub struct DispatchContext {
  pub peer: Option<AuthorityId>,
  pub missing_blocks: HashSet<Hash>,
  pub checked_signatures: u64,
  pub invalid_signatures: u64,
  pub unknown_voters: u64,
}

impl DispatchContext {
  pub fn for_peer(peer: AuthorityId) -> Self {
    Self { peer: Some(peer), ..Self::default() }
  }

  /// Emits a single summary line for everything this dispatch observed.
  /// Called by the caller once a batch of messages has been routed.
  pub fn log_summary(&self) {
    debug!(
      peer = ?self.peer,
      missing_blocks = self.missing_blocks.len(),
      checked_signatures = self.checked_signatures,
      invalid_signatures = self.invalid_signatures,
      unknown_voters = self.unknown_voters,
      "dispatch batch complete"
    );
  }
}

/// Brute-forces the authority-set id a justification was produced under, for
/// wire formats that omit it: re-verifies the first precommit's signature
/// against ascending set ids up to the justification's block number
/// (`original_source/.../guess_set_id.hpp`; `SPEC_FULL.md` §B.3).
pub async fn guess_set_id<P: VoteCryptoProvider>(crypto: &P, justification: &GrandpaJustification) -> Option<u64> {
  let first = justification.precommits.first()?;
  for set_id in 0..=justification.target.number {
    if verify_signed_message(crypto, first, justification.round_number, set_id).await {
      return Some(set_id);
    }
  }
  None
}

/// Delegates [`JustificationSink::finalize`] to a [`Storage`] implementor's
/// [`Storage::persist_justification`] — the only "hand it to finalization"
/// action this crate's collaborator interfaces expose (`spec.md` §6).
struct StorageJustificationSink<St>(Arc<St>);

#[async_trait::async_trait]
impl<St: Storage> JustificationSink for StorageJustificationSink<St> {
  async fn finalize(&self, justification: &GrandpaJustification) -> Result<(), String> {
    self.0.persist_justification(justification).await
  }
}

/// Requests nothing. Used where the host node has no synchronizer wired up
/// yet (tests, or a deployment that only ever receives already-contiguous
/// justifications).
#[derive(Default)]
pub struct NullBlockFetcher;

#[async_trait::async_trait]
impl BlockFetcher for NullBlockFetcher {
  async fn request_block(&self, _block: BlockInfo) {}
}

/// Owns round-chaining for one GRANDPA instance. Generic over its
/// collaborators the same way [`VotingRound`] is, so the hot dispatch path
/// never pays for dynamic dispatch (`spec.md` §5).
pub struct Coordinator<C, T, P, A, St, F = NullBlockFetcher> {
  chain: Arc<C>,
  transmitter: Arc<T>,
  crypto: Arc<P>,
  authority_manager: Arc<A>,
  storage: Arc<St>,
  config: Config,

  current_round: VotingRound<C, T, P>,
  previous_round: Option<VotingRound<C, T, P>>,
  pending: PendingVotes,
  justifications: VerifiedJustificationQueue<StorageJustificationSink<St>, F>,
  recent_commits: SmallLruCache<(u64, u64), BlockInfo>,

  round_id: u64,
  watchdog_last_round_id: u64,
  watchdog_last_check: Instant,
  round_started_at: Instant,
  catch_up_requested_for: Option<(u64, u64)>,
}

impl<C, T, P, A, St, F> Coordinator<C, T, P, A, St, F>
where
  C: Chain,
  T: Transmitter,
  P: VoteCryptoProvider,
  A: AuthorityManager,
  St: Storage,
  F: BlockFetcher,
{
  /// Starts the coordinator from `last_state` (the previous run's completed
  /// round, if the host found one under `kSetStateKey`) or builds round 0
  /// rooted at `genesis` (`spec.md` §4.7.1). The caller resolves which
  /// key/round-number to look for before constructing this value — the
  /// [`Storage`] interface as specified is a plain key/value map and has no
  /// "most recent" query of its own.
  pub async fn start(
    chain: Arc<C>,
    transmitter: Arc<T>,
    crypto: Arc<P>,
    authority_manager: Arc<A>,
    storage: Arc<St>,
    fetcher: F,
    config: Config,
    genesis: BlockInfo,
    last_state: Option<MovableRoundState>,
  ) -> Result<Self, CoordinatorError> {
    let voter_set = authority_manager.current_set().await;

    let current_round = match last_state {
      Some(state) => {
        let next_number = state.round_number + 1;
        let base = state.finalized.unwrap_or(state.last_finalized_block);
        VotingRound::new(next_number, voter_set.clone(), base, chain.clone(), transmitter.clone(), crypto.clone(), config.clone())
      }
      None => VotingRound::new(0, voter_set.clone(), genesis, chain.clone(), transmitter.clone(), crypto.clone(), config.clone()),
    };

    info!(round = current_round.round_number(), set_id = voter_set.set_id(), "grandpa coordinator starting");

    let justifications = VerifiedJustificationQueue::new(voter_set.set_id(), StorageJustificationSink(storage.clone()), fetcher);

    Ok(Self {
      chain,
      transmitter,
      crypto,
      authority_manager,
      storage,
      config: config.clone(),
      current_round,
      previous_round: None,
      pending: PendingVotes::new(config.pending_vote_capacity),
      justifications,
      recent_commits: SmallLruCache::new(RECENT_COMMIT_CACHE_SIZE),
      round_id: 0,
      watchdog_last_round_id: 0,
      watchdog_last_check: Instant::now(),
      round_started_at: Instant::now(),
      catch_up_requested_for: None,
    })
  }

  pub fn current_round(&self) -> &VotingRound<C, T, P> {
    &self.current_round
  }

  pub fn previous_round(&self) -> Option<&VotingRound<C, T, P>> {
    self.previous_round.as_ref()
  }

  pub fn round_id(&self) -> u64 {
    self.round_id
  }

  /// Drives the current round's phase timers and, once it completes,
  /// advances to the next round (`spec.md` §4.7.1).
  pub async fn tick(&mut self, now: Instant) -> Result<(), CoordinatorError> {
    self.current_round.tick(now).await?;
    if self.current_round.phase() == Phase::Completed {
      self.advance_round().await?;
    }
    Ok(())
  }

  /// Re-posts the current round's tick if the round-id counter has not
  /// advanced since the last watchdog check, recovering from a lost wakeup
  /// without restarting the process (`spec.md` §4.7.1). Also the trigger
  /// point for `config.catch_up_threshold`: a round stuck this long past
  /// its start is more likely stalled on a dropped message than merely
  /// slow, so ask a peer believed to be further along for a catch-up
  /// instead of waiting the round out.
  pub async fn watchdog_tick(&mut self, now: Instant) -> Result<(), CoordinatorError> {
    if now.duration_since(self.watchdog_last_check) < self.config.watchdog_interval {
      return Ok(());
    }
    self.watchdog_last_check = now;
    if self.watchdog_last_round_id == self.round_id {
      warn!(round = self.current_round.round_number(), "round did not complete in time, re-posting tick");
      self.current_round.tick(now).await?;
    }
    self.watchdog_last_round_id = self.round_id;

    let current_key = (self.current_round.round_number(), self.current_round.set_id());
    if now.duration_since(self.round_started_at) >= self.config.catch_up_threshold
      && self.current_round.phase() != Phase::Completed
      && self.catch_up_requested_for != Some(current_key)
    {
      warn!(round = current_key.0, set_id = current_key.1, "round stalled past catch_up_threshold, requesting catch-up");
      self
        .transmitter
        .send_catch_up_request(CatchUpRequest { round_number: current_key.0, set_id: current_key.1 })
        .await;
      self.catch_up_requested_for = Some(current_key);
    }
    Ok(())
  }

  /// Routes an incoming vote message to whichever of the current/previous
  /// round it belongs to, verifying the signature first (`spec.md` §4.7.2).
  /// Messages for any other round number are silently dropped.
  pub async fn dispatch_vote(
    &mut self,
    ctx: &mut DispatchContext,
    round_number: u64,
    set_id: u64,
    signed: SignedMessage,
  ) -> Result<(), CoordinatorError> {
    let matches_current = self.current_round.round_number() == round_number && self.current_round.set_id() == set_id;
    let matches_previous = self
      .previous_round
      .as_ref()
      .map(|r| r.round_number() == round_number && r.set_id() == set_id)
      .unwrap_or(false);

    if !matches_current && !matches_previous {
      debug!(round_number, set_id, "dropping vote for unknown round");
      return Ok(());
    }

    let voter_set = if matches_current { self.current_round.voter_set() } else { self.previous_round.as_ref().unwrap().voter_set() };
    if !voter_set.contains(&signed.id) {
      ctx.unknown_voters += 1;
      return Ok(());
    }

    ctx.checked_signatures += 1;
    if !verify_signed_message(self.crypto.as_ref(), &signed, round_number, set_id).await {
      ctx.invalid_signatures += 1;
      return Err(CoordinatorError::BadMessage { peer: ctx.peer, reason: "invalid signature on vote".to_string() });
    }

    let round = if matches_current { &mut self.current_round } else { self.previous_round.as_mut().unwrap() };
    let target = signed.target();
    let result = match signed.message {
      Vote::PrimaryPropose(_) => round.on_primary_propose(signed).await,
      Vote::Prevote(_) => round.on_prevote(signed).await,
      Vote::Precommit(_) => round.on_precommit(signed).await,
    };

    match result {
      Ok(()) => Ok(()),
      Err(err) => {
        if is_unknown_ancestry(&err) {
          ctx.missing_blocks.insert(target.hash);
          self.pending.defer(target.hash, round_number, set_id, signed);
          return Err(CoordinatorError::Transient(target, err.to_string()));
        }
        Err(CoordinatorError::Round(err))
      }
    }
  }

  /// Verifies and applies a `Commit`/`Fin` message (`spec.md` §4.7.2):
  /// every precommit must be signed by a known voter under `set_id`, target
  /// a descendant of (or equal to) the claimed finalized block, and the
  /// distinct signers' weight (equivocators counted once) must clear the
  /// set's threshold.
  pub async fn dispatch_commit(&mut self, commit: FullCommitMessage) -> Result<(), CoordinatorError> {
    let cache_key = (commit.round_number, commit.set_id);
    if self.recent_commits.get(&cache_key) == Some(&commit.commit.target) {
      debug!(round_number = commit.round_number, set_id = commit.set_id, "dropping duplicate commit already verified");
      return Ok(());
    }

    let voter_set = self.voter_set_for(commit.set_id)?;
    let justification = GrandpaJustification {
      round_number: commit.round_number,
      set_id: commit.set_id,
      target: commit.commit.target,
      precommits: commit.commit.precommits.clone(),
    };

    self.verify_commit(&voter_set, commit.round_number, &commit.commit).await?;
    self.justifications.add_verified(commit.set_id, justification).await;
    self.recent_commits.put(cache_key, commit.commit.target);
    Ok(())
  }

  async fn verify_commit(
    &self,
    voter_set: &VoterSet,
    round_number: u64,
    commit: &Commit,
  ) -> Result<(), CoordinatorError> {
    let mut seen = HashSet::new();
    let mut weight = 0u64;
    for precommit in &commit.precommits {
      let voter = voter_set.get(&precommit.id).ok_or_else(|| CoordinatorError::BadMessage {
        peer: None,
        reason: "commit precommit from unknown voter".to_string(),
      })?;
      if !verify_signed_message(self.crypto.as_ref(), precommit, round_number, voter_set.set_id()).await {
        return Err(CoordinatorError::BadMessage { peer: None, reason: "invalid signature in commit".to_string() });
      }
      if !self.chain.is_equal_or_descendant_of(commit.target.hash, precommit.target().hash).await {
        return Err(CoordinatorError::ProtocolFault {
          peer: None,
          reason: "commit precommit does not descend from the claimed target".to_string(),
        });
      }
      if seen.insert(precommit.id) {
        weight = weight.saturating_add(voter.weight);
      }
    }
    if weight < voter_set.threshold() {
      return Err(CoordinatorError::ProtocolFault { peer: None, reason: "commit weight below threshold".to_string() });
    }
    Ok(())
  }

  /// Assembles a response to a catch-up request, if this node still holds
  /// the requested (completed) round as its current or previous one
  /// (`spec.md` §4.6.7). Returns `None` for a round that matches neither,
  /// or one that has not finalized yet.
  pub fn handle_catch_up_request(&self, request: CatchUpRequest) -> Option<CatchUpResponse> {
    if self.current_round.round_number() == request.round_number && self.current_round.set_id() == request.set_id {
      return self.current_round.catch_up_response();
    }
    if let Some(previous) = &self.previous_round {
      if previous.round_number() == request.round_number && previous.set_id() == request.set_id {
        return previous.catch_up_response();
      }
    }
    None
  }

  /// Verifies every vote in a peer's catch-up response, reconstructs the
  /// round it describes, and — if that round is not behind what this node
  /// already has — adopts it as the current round (`spec.md` §4.6.7, §8
  /// scenario 4). No vote is replayed until every signature in the response
  /// has checked out.
  pub async fn handle_catch_up_response(&mut self, response: CatchUpResponse) -> Result<(), CoordinatorError> {
    if response.round_number < self.current_round.round_number() {
      debug!(round_number = response.round_number, "ignoring catch-up response for a round already behind us");
      return Ok(());
    }

    let voter_set = self.voter_set_for(response.set_id)?;
    for signed in response.prevotes.iter().chain(response.precommits.iter()) {
      if voter_set.get(&signed.id).is_none() {
        return Err(CoordinatorError::BadMessage {
          peer: None,
          reason: "catch-up response vote from unknown voter".to_string(),
        });
      }
      if !verify_signed_message(self.crypto.as_ref(), signed, response.round_number, response.set_id).await {
        return Err(CoordinatorError::BadMessage { peer: None, reason: "invalid signature in catch-up response".to_string() });
      }
    }

    let mut votes = response.prevotes.clone();
    votes.extend(response.precommits.clone());
    let state = MovableRoundState {
      round_number: response.round_number,
      last_finalized_block: response.base,
      votes,
      finalized: Some(response.best_final_candidate),
    };

    let reconstructed = VotingRound::from_movable_state(
      state,
      voter_set,
      self.chain.clone(),
      self.transmitter.clone(),
      self.crypto.clone(),
      self.config.clone(),
    )
    .await
    .map_err(|err| {
      if is_unknown_ancestry(&err) {
        CoordinatorError::Transient(response.best_final_candidate, err.to_string())
      } else {
        CoordinatorError::Round(err)
      }
    })?;

    if reconstructed.finalized() != Some(response.best_final_candidate) {
      return Err(CoordinatorError::ProtocolFault {
        peer: None,
        reason: "catch-up response votes do not actually finalize the claimed block".to_string(),
      });
    }

    info!(
      round = reconstructed.round_number(),
      finalized = %response.best_final_candidate,
      "adopted round from catch-up response"
    );
    self.previous_round = Some(mem::replace(&mut self.current_round, reconstructed));
    self.round_id += 1;
    self.round_started_at = Instant::now();
    self.catch_up_requested_for = None;
    Ok(())
  }

  fn voter_set_for(&self, set_id: u64) -> Result<VoterSet, CoordinatorError> {
    if self.current_round.set_id() == set_id {
      return Ok(self.current_round.voter_set().clone());
    }
    if let Some(previous) = &self.previous_round {
      if previous.set_id() == set_id {
        return Ok(previous.voter_set().clone());
      }
    }
    Err(CoordinatorError::BadMessage { peer: None, reason: format!("no known voter set for set_id {set_id}") })
  }

  /// Retries every vote that was deferred on a block this node has since
  /// imported, per `spec.md` §7's Transient category. The caller invokes
  /// this from its chain-import subscription.
  pub async fn notify_block_imported(&mut self, block: Hash) -> Result<(), CoordinatorError> {
    if let Some(votes) = self.pending.resolve(&block) {
      let mut ctx = DispatchContext::default();
      for (round_number, set_id, signed) in votes {
        self.dispatch_vote(&mut ctx, round_number, set_id, signed).await?;
      }
      ctx.log_summary();
    }
    self.justifications.notify_block_available(BlockInfo::new(0, block)).await;
    Ok(())
  }

  /// Persists the completed round, enacts a due authority-set change if
  /// any, and starts the next round (`spec.md` §4.7.1/§4.7.3).
  async fn advance_round(&mut self) -> Result<(), CoordinatorError> {
    let state = self.current_round.movable_state();
    self
      .storage
      .persist_round_state(state.round_number, self.current_round.set_id(), bincode::serialize(&state).expect("MovableRoundState always encodes"))
      .await
      .map_err(CoordinatorError::Fatal)?;

    let finalized = match self.current_round.finalized() {
      Some(finalized) => finalized,
      None => return Ok(()),
    };

    let (next_voter_set, next_round_number, next_base) = match self.authority_manager.pending_change(finalized.number).await {
      Some(change) => {
        self.authority_manager.enact_change(change).await;
        let voter_set = self.authority_manager.current_set().await;
        self.justifications.advance_set(voter_set.set_id()).await;
        info!(set_id = voter_set.set_id(), "authority set enacted");
        (voter_set, 0, finalized)
      }
      None => (self.current_round.voter_set().clone(), self.current_round.round_number() + 1, finalized),
    };

    let next_round = VotingRound::new(
      next_round_number,
      next_voter_set,
      next_base,
      self.chain.clone(),
      self.transmitter.clone(),
      self.crypto.clone(),
      self.config.clone(),
    );
    self.previous_round = Some(mem::replace(&mut self.current_round, next_round));
    self.round_id += 1;
    self.round_started_at = Instant::now();
    self.catch_up_requested_for = None;
    Ok(())
  }
}

fn is_unknown_ancestry(err: &crate::error::RoundError) -> bool {
  matches!(err, crate::error::RoundError::Graph(crate::error::GraphError::UnknownAncestry(_)))
}
