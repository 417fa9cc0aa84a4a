//! Ed25519 signatures and the signer/verifier capability seams.
//!
//! Signing is deterministic: one key and one message always yield the same 64
//! bytes. Verification is strict (`verify_strict`) and answers `Ok(false)` for
//! any well-formed signature that does not check out. Only malformed lengths
//! or a public key that is not a curve point produce an error.
//!
//! [`CombinedSigner`] and [`CombinedVerifier`] concatenate member signatures
//! so a second algorithm family can be added without changing callers.
//! Verification of a combined signature requires every member to accept.

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::{
    error::{Result, ShieldError},
    random::RandomSource,
};

/// Ed25519 public key length
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 signature length
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 seed length
pub const SEED_LEN: usize = 32;

/// Capability to produce detached signatures.
pub trait Signer: Send + Sync {
    /// Algorithm identifier.
    fn algorithm(&self) -> &'static str;

    /// Fixed length of every signature this signer produces.
    fn signature_len(&self) -> usize;

    /// Public key that verifies this signer's signatures.
    fn public_key(&self) -> Vec<u8>;

    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Capability to check detached signatures.
pub trait Verifier: Send + Sync {
    /// Fixed length of every signature this verifier accepts.
    fn signature_len(&self) -> usize;

    /// Check `signature` over `message`.
    ///
    /// `Ok(false)` for a wrong signature; `Err` only for malformed input.
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Ed25519 signing keypair.
///
/// The signing key is zeroized on drop.
pub struct SigningKeyPair {
    signing: SigningKey,
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair").field("public", &self.public_key()).finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generate a keypair from a fresh random seed.
    pub fn generate(rng: &impl RandomSource) -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        rng.fill_bytes(seed.as_mut_slice())?;
        Ok(Self::from_seed(&seed))
    }

    /// Deterministically derive a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        Self { signing: SigningKey::from_bytes(seed) }
    }

    /// Public key bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign `message`. Deterministic.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }

    /// Verifier for this keypair's signatures.
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier { key: self.signing.verifying_key() }
    }
}

impl Signer for SigningKeyPair {
    fn algorithm(&self) -> &'static str {
        "ed25519"
    }

    fn signature_len(&self) -> usize {
        SIGNATURE_LEN
    }

    fn public_key(&self) -> Vec<u8> {
        Self::public_key(self).to_vec()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(Self::sign(self, message).to_vec())
    }
}

/// Ed25519 verifier bound to one public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Parse a public key.
    ///
    /// # Errors
    ///
    /// `InvalidPublicKey` if `public_key` is not 32 bytes or not a curve point.
    pub fn new(public_key: &[u8]) -> Result<Self> {
        Ok(Self { key: parse_verifying_key(public_key)? })
    }

    /// Public key bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.key.to_bytes()
    }
}

impl Verifier for Ed25519Verifier {
    fn signature_len(&self) -> usize {
        SIGNATURE_LEN
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        let signature = parse_signature(signature)?;
        Ok(self.key.verify_strict(message, &signature).is_ok())
    }
}

/// Verify an Ed25519 `signature` over `message` under `public_key`.
///
/// # Errors
///
/// - `InvalidSignature` if `signature` is not 64 bytes
/// - `InvalidPublicKey` if `public_key` is not 32 bytes or not a curve point
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
    let signature = parse_signature(signature)?;
    let key = parse_verifying_key(public_key)?;
    Ok(key.verify_strict(message, &signature).is_ok())
}

/// Signs with every member and concatenates the signatures in order.
pub struct CombinedSigner {
    members: Vec<Box<dyn Signer>>,
}

impl CombinedSigner {
    /// Combine signers. Signatures are emitted in the given order.
    pub fn new(members: Vec<Box<dyn Signer>>) -> Self {
        Self { members }
    }

    /// Number of member signers.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Signer for CombinedSigner {
    fn algorithm(&self) -> &'static str {
        "combined"
    }

    fn signature_len(&self) -> usize {
        self.members.iter().map(|m| m.signature_len()).sum()
    }

    fn public_key(&self) -> Vec<u8> {
        self.members.iter().flat_map(|m| m.public_key()).collect()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let mut combined = Vec::with_capacity(self.signature_len());
        for member in &self.members {
            combined.extend_from_slice(&member.sign(message)?);
        }
        Ok(combined)
    }
}

/// Splits a combined signature by member length and requires every member to
/// accept its part.
///
/// A verifier with no members accepts nothing.
pub struct CombinedVerifier {
    members: Vec<Box<dyn Verifier>>,
}

impl CombinedVerifier {
    /// Combine verifiers in the order their signatures appear.
    pub fn new(members: Vec<Box<dyn Verifier>>) -> Self {
        Self { members }
    }
}

impl Verifier for CombinedVerifier {
    fn signature_len(&self) -> usize {
        self.members.iter().map(|m| m.signature_len()).sum()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        let expected = self.signature_len();
        if signature.len() != expected {
            return Err(ShieldError::InvalidSignature { expected, actual: signature.len() });
        }
        if self.members.is_empty() {
            return Ok(false);
        }

        // Every member runs, no early exit on rejection
        let mut accepted = true;
        let mut rest = signature;
        for member in &self.members {
            let (part, tail) = rest.split_at(member.signature_len());
            accepted &= member.verify(message, part)?;
            rest = tail;
        }
        Ok(accepted)
    }
}

fn parse_signature(bytes: &[u8]) -> Result<Signature> {
    let Ok(raw) = <[u8; SIGNATURE_LEN]>::try_from(bytes) else {
        return Err(ShieldError::InvalidSignature { expected: SIGNATURE_LEN, actual: bytes.len() });
    };
    Ok(Signature::from_bytes(&raw))
}

fn parse_verifying_key(bytes: &[u8]) -> Result<VerifyingKey> {
    let Ok(raw) = <[u8; PUBLIC_KEY_LEN]>::try_from(bytes) else {
        return Err(ShieldError::InvalidPublicKey);
    };
    VerifyingKey::from_bytes(&raw).map_err(|_| ShieldError::InvalidPublicKey)
}
