//! Tunable parameters handed to the coordinator at construction.
//!
//! No file or CLI parsing happens inside this crate (out of scope per
//! `spec.md` §1) — this mirrors how the teacher's `consensus::Chain` takes
//! a single `&Genesis<D>` value rather than reading configuration itself.

use std::time::Duration;

/// The default liveness watchdog re-post interval (`spec.md` §4.7.1).
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct Config {
  /// The base round duration `T` that prevote/precommit timers scale from
  /// (`spec.md` §4.6.1).
  pub round_duration: Duration,
  /// How long the current round may run past its start before
  /// [`crate::coordinator::Coordinator::watchdog_tick`] gives up waiting on
  /// it and issues a catch-up request instead.
  pub catch_up_threshold: Duration,
  /// How often an unanswered round re-posts its last vote (`spec.md` §4.7.1).
  pub watchdog_interval: Duration,
  /// Maximum number of distinct missing blocks [`crate::pending::PendingVotes`]
  /// will hold deferred votes for before evicting the oldest.
  pub pending_vote_capacity: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      round_duration: Duration::from_secs(4),
      catch_up_threshold: Duration::from_secs(8),
      watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
      pending_vote_capacity: 256,
    }
  }
}
