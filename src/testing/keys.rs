//! Deterministic Ed25519 keypair generation for tests.
//!
//! Ports the teacher's `primitives::keys::Keypair` wrapper, but generates
//! from a seeded RNG rather than `SecretKey::from_bytes` literal arrays so
//! scenario tests can mint as many distinct voters as they need
//! (`SPEC_FULL.md` §A.4).

use ed25519_dalek::{Keypair as DalekKeypair, PublicKey, SecretKey};
use rand::{RngCore, SeedableRng};
use rand::rngs::StdRng;

use crate::vote::AuthorityId;

/// A keypair plus its 32-byte id, deterministic for a given `seed`.
pub struct Keypair {
  pub id: AuthorityId,
  pub dalek: DalekKeypair,
}

impl Keypair {
  pub fn from_seed(seed: u64) -> Self {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut secret_bytes = [0u8; 32];
    rng.fill_bytes(&mut secret_bytes);
    let secret = SecretKey::from_bytes(&secret_bytes).expect("32 bytes is always a valid seed");
    let public: PublicKey = (&secret).into();
    Self { id: public.to_bytes(), dalek: DalekKeypair { secret, public } }
  }
}

/// Deterministic keypairs for `n` distinct voters, seeded `0..n`.
pub fn keyring(n: u64) -> Vec<Keypair> {
  (0..n).map(Keypair::from_seed).collect()
}
