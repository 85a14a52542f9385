//! Fixed voter sets and fork trees reused across round, graph, and
//! coordinator tests — in particular the four-voter equal-weight set and
//! the two fork shapes `spec.md` §8's scenarios 1-3 and 6 are worked
//! through on (`SPEC_FULL.md` §A.4).

use crate::testing::chain::InMemoryChain;
use crate::vote::{AuthorityId, BlockInfo, Hash};
use crate::voter_set::VoterSet;

fn id(b: u8) -> AuthorityId {
  let mut a = [0u8; 32];
  a[0] = b;
  a
}

/// Four voters, weight 1 each, set id 0. Threshold is 3 of 4.
pub fn four_equal_voters() -> VoterSet {
  VoterSet::new(0, vec![(id(1), 1), (id(2), 1), (id(3), 1), (id(4), 1)]).expect("fixture voter list is valid")
}

/// Five voters with uneven weights (3, 2, 1, 1, 1), set id 0. Threshold is
/// `floor(2*8/3)+1 == 6`, used by scenarios where a single heavy voter's
/// equivocation matters disproportionately.
pub fn five_weighted_voters() -> VoterSet {
  VoterSet::new(0, vec![(id(1), 3), (id(2), 2), (id(3), 1), (id(4), 1), (id(5), 1)])
    .expect("fixture voter list is valid")
}

pub fn hash(n: u8) -> Hash {
  [n; 32]
}

pub fn block(number: u64, n: u8) -> BlockInfo {
  BlockInfo::new(number, hash(n))
}

/// A single straight chain `G(0) <- A(1) <- B(2) <- C(3) <- D(4)`, as used
/// by the straightforward-finalization scenarios.
pub fn straight_chain() -> (InMemoryChain, [BlockInfo; 5]) {
  let genesis = block(0, 0);
  let chain = InMemoryChain::new(genesis);
  let a = chain.extend(genesis, hash(1));
  let b = chain.extend(a, hash(2));
  let c = chain.extend(b, hash(3));
  let d = chain.extend(c, hash(4));
  (chain, [genesis, a, b, c, d])
}

/// A forked chain used by `spec.md` §8 scenarios 1-3: a shared run up to
/// `B2`, which then splits into `C1` (continuing one branch) and `B2'`'s
/// sibling `D2` (a competing branch at the same height), mirroring the
/// kagome test fixture this crate's scenarios were distilled from
/// (`examples/original_source/core/consensus/grandpa/impl/vote_graph_impl.cpp`
/// gave the compressed-ancestry shape; the fork points themselves come
/// from `spec.md` §8's own diagrams).
pub fn forked_chain() -> (InMemoryChain, ForkedFixture) {
  let genesis = block(0, 0);
  let chain = InMemoryChain::new(genesis);
  let a1 = chain.extend(genesis, hash(11));
  let b2 = chain.extend(a1, hash(12));
  let c1 = chain.extend(b2, hash(13));
  let d1 = chain.extend(c1, hash(14));
  let b2_prime = chain.extend_fork(a1, hash(22));
  (chain, ForkedFixture { genesis, a1, b2, c1, d1, b2_prime })
}

pub struct ForkedFixture {
  pub genesis: BlockInfo,
  pub a1: BlockInfo,
  pub b2: BlockInfo,
  pub c1: BlockInfo,
  pub d1: BlockInfo,
  pub b2_prime: BlockInfo,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn four_equal_voters_threshold_is_three() {
    assert_eq!(four_equal_voters().threshold(), 3);
  }

  #[test]
  fn five_weighted_voters_threshold_is_six() {
    assert_eq!(five_weighted_voters().threshold(), 6);
  }
}
