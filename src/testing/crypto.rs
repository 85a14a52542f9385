//! Two [`VoteCryptoProvider`] implementations for tests: a real Ed25519
//! one for signed-payload interop tests, and a no-op always-valid one for
//! round/graph unit tests that don't care about signatures
//! (`SPEC_FULL.md` §A.4).

use async_trait::async_trait;
use ed25519_dalek::{Signature as DalekSignature, Signer, Verifier};

use crate::crypto::{payload_bytes, VoteCryptoProvider};
use crate::testing::keys::Keypair;
use crate::vote::{AuthorityId, Signature, SignedMessage, Vote};

/// Signs and verifies with a real keypair, over the exact bytes `spec.md`
/// §6 specifies. Used to prove the signed-payload layout is interoperable,
/// not to exercise round/graph logic (that uses [`NoopCrypto`] instead).
pub struct Ed25519Crypto {
  local: Option<Keypair>,
}

impl Ed25519Crypto {
  pub fn new(local: Option<Keypair>) -> Self {
    Self { local }
  }
}

#[async_trait]
impl VoteCryptoProvider for Ed25519Crypto {
  fn local_id(&self) -> Option<AuthorityId> {
    self.local.as_ref().map(|k| k.id)
  }

  async fn sign(&self, message: Vote, round_number: u64, voter_set_id: u64) -> Option<SignedMessage> {
    let local = self.local.as_ref()?;
    let bytes = payload_bytes(&message, round_number, voter_set_id);
    let signature = local.dalek.sign(&bytes).to_bytes();
    Some(SignedMessage { message, signature, id: local.id })
  }

  async fn verify(
    &self,
    id: &AuthorityId,
    message: &Vote,
    round_number: u64,
    voter_set_id: u64,
    signature: &Signature,
  ) -> bool {
    let bytes = payload_bytes(message, round_number, voter_set_id);
    let public = match ed25519_dalek::PublicKey::from_bytes(id) {
      Ok(public) => public,
      Err(_) => return false,
    };
    let signature = match DalekSignature::from_bytes(signature) {
      Ok(signature) => signature,
      Err(_) => return false,
    };
    public.verify(&bytes, &signature).is_ok()
  }
}

/// Always reports `verify() == true` and signs with an all-zero signature.
/// Used by round/graph tests that exercise voting logic without paying for
/// real signature checks.
pub struct NoopCrypto {
  local: Option<AuthorityId>,
}

impl NoopCrypto {
  pub fn new(local: Option<AuthorityId>) -> Self {
    Self { local }
  }
}

#[async_trait]
impl VoteCryptoProvider for NoopCrypto {
  fn local_id(&self) -> Option<AuthorityId> {
    self.local
  }

  async fn sign(&self, message: Vote, _round_number: u64, _voter_set_id: u64) -> Option<SignedMessage> {
    self.local.map(|id| SignedMessage { message, signature: [0u8; 64], id })
  }

  async fn verify(
    &self,
    _id: &AuthorityId,
    _message: &Vote,
    _round_number: u64,
    _voter_set_id: u64,
    _signature: &Signature,
  ) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::keys::Keypair;
  use crate::vote::BlockInfo;

  #[tokio::test]
  async fn ed25519_round_trips_through_payload_bytes() {
    let key = Keypair::from_seed(1);
    let id = key.id;
    let crypto = Ed25519Crypto::new(Some(key));
    let message = Vote::Prevote(BlockInfo::new(4, [7u8; 32]));
    let signed = crypto.sign(message, 5, 1).await.unwrap();
    assert!(crypto.verify(&id, &message, 5, 1, &signed.signature).await);
    assert!(!crypto.verify(&id, &message, 6, 1, &signed.signature).await, "round_number must be covered");
  }
}
