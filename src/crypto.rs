//! Signing and verification of [`SignedMessage`]s.
//!
//! The teacher's `consensus::vote::Vote` signs a concatenation of raw field
//! bytes directly with `ed25519_dalek`. This crate keeps the "sign a
//! concatenation of the vote's fields" shape but routes it through
//! [`SignedPayload::encode`] so the exact bytes signed are shared with
//! verification and are independent of any particular signature scheme —
//! the scheme itself is a collaborator concern (`spec.md` §6 C5).

use async_trait::async_trait;

use crate::vote::{AuthorityId, Signature, SignedMessage, SignedPayload, Vote};

/// Supplies signing and verification for one local voter's keypair plus
/// verification of any remote voter's signature.
///
/// A production node backs this with whatever signature scheme its
/// authority keys use (commonly Ed25519 or Sr25519 in this ecosystem);
/// `crate::testing::crypto` provides a real Ed25519 implementation and a
/// no-op always-valid one for tests that don't exercise signatures.
#[async_trait]
pub trait VoteCryptoProvider: Send + Sync {
  /// This node's own voting identity, if it is a voter in the current set.
  fn local_id(&self) -> Option<AuthorityId>;

  /// Signs `message` as cast in `round_number` under `voter_set_id`,
  /// returning a fully formed [`SignedMessage`]. Fails (returns `None`) if
  /// this node has no local voting identity.
  async fn sign(&self, message: Vote, round_number: u64, voter_set_id: u64) -> Option<SignedMessage>;

  /// Verifies that `signature` over the payload of `message` cast in
  /// `round_number` under `voter_set_id` was produced by `id`.
  async fn verify(
    &self,
    id: &AuthorityId,
    message: &Vote,
    round_number: u64,
    voter_set_id: u64,
    signature: &Signature,
  ) -> bool;
}

/// Verifies a received [`SignedMessage`] against the payload it claims to
/// attest to. A thin convenience wrapper so call sites at `round.rs` and
/// `coordinator.rs` don't reconstruct the payload by hand.
pub async fn verify_signed_message(
  crypto: &dyn VoteCryptoProvider,
  signed: &SignedMessage,
  round_number: u64,
  voter_set_id: u64,
) -> bool {
  crypto
    .verify(&signed.id, &signed.message, round_number, voter_set_id, &signed.signature)
    .await
}

/// Reconstructs the exact bytes a [`VoteCryptoProvider`] implementation
/// should sign or verify against.
pub fn payload_bytes(message: &Vote, round_number: u64, voter_set_id: u64) -> Vec<u8> {
  SignedPayload::new(*message, round_number, voter_set_id).encode()
}
