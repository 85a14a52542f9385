//! Orders and applies verified GRANDPA justifications strictly by
//! `(set_id, block_number)`, requesting missing ancestor blocks when a gap
//! appears and supporting a warp-sync bypass (`spec.md` §4.7.4).
//!
//! Ported from the original's `VerifiedJustificationQueue`
//! (`impl/verified_justification_queue.hpp`): the `expected_`/`verified_`/
//! `last_`/`required_` bookkeeping is kept, narrowed to what this crate can
//! act on without a concrete `BlockTree`/`Synchronizer` (`spec.md` §1's
//! out-of-scope list) — those become the two trait seams below.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::interfaces::GrandpaJustification;
use crate::vote::{BlockInfo, Hash};

/// Hands a justification whose precommits have already passed verification
/// (by the coordinator, per `spec.md` §4.7.2) off to whatever finalizes
/// blocks. Returns an error if the justified block is not yet known locally
/// — the queue treats that as a gap, not a fatal condition.
#[async_trait]
pub trait JustificationSink: Send + Sync {
  async fn finalize(&self, justification: &GrandpaJustification) -> Result<(), String>;
}

/// Requests a block this node is missing by hash, so a justification stuck
/// on an import gap can eventually be applied (`spec.md` §4.7.4's
/// sync-by-hash request).
#[async_trait]
pub trait BlockFetcher: Send + Sync {
  async fn request_block(&self, block: BlockInfo);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
  set_id: u64,
  block_number: u64,
}

/// A FIFO-by-order, not FIFO-by-arrival, application queue: justifications
/// can arrive in any order but are only ever applied smallest-key-first.
pub struct VerifiedJustificationQueue<S, F> {
  sink: S,
  fetcher: F,
  expected_set: u64,
  verified: BTreeMap<QueueKey, GrandpaJustification>,
  last_applied: Option<(u64, BlockInfo)>,
  required: Vec<BlockInfo>,
  warping: bool,
}

impl<S, F> VerifiedJustificationQueue<S, F>
where
  S: JustificationSink,
  F: BlockFetcher,
{
  pub fn new(expected_set: u64, sink: S, fetcher: F) -> Self {
    Self {
      sink,
      fetcher,
      expected_set,
      verified: BTreeMap::new(),
      last_applied: None,
      required: Vec::new(),
      warping: false,
    }
  }

  pub fn last_applied(&self) -> Option<(u64, BlockInfo)> {
    self.last_applied
  }

  pub fn is_warping(&self) -> bool {
    self.warping
  }

  pub fn pending_len(&self) -> usize {
    self.verified.len()
  }

  /// Enters warp mode: the next [`VerifiedJustificationQueue::add_verified`]
  /// call is accepted regardless of ordering and becomes the new trust
  /// anchor, discarding everything buffered so far. Ordinary sequential
  /// application resumes once that justification lands.
  pub fn warp(&mut self) {
    info!("justification queue entering warp mode");
    self.warping = true;
    self.verified.clear();
    self.required.clear();
  }

  /// Queues a justification that has already passed signature/threshold
  /// verification, applying as much of the now-contiguous prefix as
  /// possible.
  pub async fn add_verified(&mut self, set_id: u64, justification: GrandpaJustification) {
    if self.warping {
      self.warping = false;
      self.expected_set = set_id;
      self.apply(justification).await;
      return;
    }

    let key = QueueKey { set_id, block_number: justification.target.number };
    self.verified.insert(key, justification);
    self.verified_loop().await;
  }

  /// Buffers several already-verified justifications (e.g. from a
  /// catch-up response) before attempting to apply any of them, so the
  /// smallest `(set_id, block_number)` among the whole batch goes first
  /// even if a larger one was constructed earlier.
  pub async fn add_verified_batch(&mut self, items: Vec<(u64, GrandpaJustification)>) {
    for (set_id, justification) in items {
      let key = QueueKey { set_id, block_number: justification.target.number };
      self.verified.insert(key, justification);
    }
    self.verified_loop().await;
  }

  /// Called once the coordinator enacts an authority-set change, so
  /// anything buffered for the new set can now be tried.
  pub async fn advance_set(&mut self, set_id: u64) {
    if set_id > self.expected_set {
      self.expected_set = set_id;
    }
    self.verified_loop().await;
  }

  /// A previously-missing block has arrived; retry whatever justification
  /// was blocked on it.
  pub async fn notify_block_available(&mut self, block: BlockInfo) {
    self.required.retain(|b| *b != block);
    self.verified_loop().await;
  }

  async fn verified_loop(&mut self) {
    loop {
      if !self.required.is_empty() {
        return;
      }
      let next_key = match self.verified.keys().next().copied() {
        Some(key) => key,
        None => return,
      };
      if next_key.set_id < self.expected_set {
        self.verified.remove(&next_key);
        continue;
      }
      if next_key.set_id > self.expected_set {
        debug!(
          set_id = next_key.set_id,
          expected = self.expected_set,
          "justification queue waiting on authority-set enactment"
        );
        return;
      }
      let justification = self.verified.get(&next_key).expect("key just read from the same map").clone();
      if self.apply(justification).await {
        self.verified.remove(&next_key);
      } else {
        return;
      }
    }
  }

  async fn apply(&mut self, justification: GrandpaJustification) -> bool {
    match self.sink.finalize(&justification).await {
      Ok(()) => {
        self.last_applied = Some((justification.set_id, justification.target));
        true
      }
      Err(reason) => {
        warn!(block = %justification.target, reason, "justification blocked on missing block, requesting it");
        self.fetcher.request_block(justification.target).await;
        self.required.push(justification.target);
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  use crate::vote::{BlockInfo, SignedMessage, Vote};

  struct RecordingSink {
    finalized: Mutex<Vec<BlockInfo>>,
    refuse: Mutex<Vec<BlockInfo>>,
  }

  #[async_trait]
  impl JustificationSink for &RecordingSink {
    async fn finalize(&self, justification: &GrandpaJustification) -> Result<(), String> {
      if self.refuse.lock().unwrap().contains(&justification.target) {
        return Err("block not known locally".to_string());
      }
      self.finalized.lock().unwrap().push(justification.target);
      Ok(())
    }
  }

  struct NullFetcher;

  #[async_trait]
  impl BlockFetcher for NullFetcher {
    async fn request_block(&self, _block: BlockInfo) {}
  }

  fn block(n: u64, b: u8) -> BlockInfo {
    let mut h = [0u8; 32];
    h[0] = b;
    BlockInfo::new(n, h)
  }

  fn justification(set_id: u64, target: BlockInfo) -> GrandpaJustification {
    GrandpaJustification {
      round_number: target.number,
      set_id,
      target,
      precommits: vec![SignedMessage { message: Vote::Precommit(target), signature: [0u8; 64], id: [0u8; 32] }],
    }
  }

  #[tokio::test]
  async fn applies_out_of_order_arrivals_in_block_number_order() {
    let sink = RecordingSink { finalized: Mutex::new(Vec::new()), refuse: Mutex::new(Vec::new()) };
    let mut queue = VerifiedJustificationQueue::new(0, &sink, NullFetcher);

    let b2 = block(2, 2);
    let b1 = block(1, 1);
    queue.add_verified_batch(vec![(0, justification(0, b2)), (0, justification(0, b1))]).await;

    assert_eq!(*sink.finalized.lock().unwrap(), vec![b1, b2]);
    assert_eq!(queue.last_applied(), Some((0, b2)));
  }

  #[tokio::test]
  async fn gap_blocks_application_until_notified() {
    let b1 = block(1, 1);
    let b2 = block(2, 2);
    let sink = RecordingSink { finalized: Mutex::new(Vec::new()), refuse: Mutex::new(vec![b1]) };
    let mut queue = VerifiedJustificationQueue::new(0, &sink, NullFetcher);

    queue.add_verified(0, justification(0, b1)).await;
    queue.add_verified(0, justification(0, b2)).await;
    assert!(sink.finalized.lock().unwrap().is_empty());
    assert_eq!(queue.pending_len(), 2);

    sink.refuse.lock().unwrap().clear();
    queue.notify_block_available(b1).await;
    assert_eq!(*sink.finalized.lock().unwrap(), vec![b1, b2]);
  }

  #[tokio::test]
  async fn future_set_is_held_until_advance_set() {
    let sink = RecordingSink { finalized: Mutex::new(Vec::new()), refuse: Mutex::new(Vec::new()) };
    let mut queue = VerifiedJustificationQueue::new(0, &sink, NullFetcher);

    let target = block(1, 1);
    queue.add_verified(1, justification(1, target)).await;
    assert!(sink.finalized.lock().unwrap().is_empty());

    queue.advance_set(1).await;
    assert_eq!(*sink.finalized.lock().unwrap(), vec![target]);
  }

  #[tokio::test]
  async fn warp_accepts_next_justification_regardless_of_order() {
    let sink = RecordingSink { finalized: Mutex::new(Vec::new()), refuse: Mutex::new(Vec::new()) };
    let mut queue = VerifiedJustificationQueue::new(0, &sink, NullFetcher);

    let anchor = block(1_000, 9);
    queue.warp();
    assert!(queue.is_warping());
    queue.add_verified(50, justification(50, anchor)).await;

    assert!(!queue.is_warping());
    assert_eq!(queue.last_applied(), Some((50, anchor)));
  }
}
