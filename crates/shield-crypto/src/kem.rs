//! X25519 key encapsulation.
//!
//! The encapsulator's public point is the ciphertext. Both sides run the same
//! Diffie-Hellman and feed the raw output through HKDF with
//! `info = "shield-kem-v1" ‖ encapsulator_pub ‖ decapsulator_pub`. Both
//! parties must order the two points the same way or the secrets diverge.
//!
//! ```text
//! Encapsulator (A)                         Decapsulator (B)
//!   DH(a, B_pub) ──┐                   ┌── DH(b, A_pub)
//!                  ▼                   ▼
//!   HKDF(info = tag ‖ A_pub ‖ B_pub) == HKDF(info = tag ‖ A_pub ‖ B_pub)
//! ```
//!
//! [`Encapsulator`] and [`Decapsulator`] are the seams for additional KEM
//! families. [`HybridKem`] combines two members so that recovering the secret
//! requires breaking both.

use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    error::{Result, ShieldError},
    kdf,
    random::RandomSource,
};

/// X25519 public key (and ciphertext) length
pub const PUBLIC_KEY_LEN: usize = 32;

/// Shared secret length
pub const SHARED_SECRET_LEN: usize = 32;

/// Domain tag for X25519 encapsulation
const KEM_INFO: &[u8] = b"shield-kem-v1";

/// Domain tag for combining two KEM secrets
const HYBRID_KEM_INFO: &[u8] = b"shield-hybrid-kem-v1";

/// X25519 KEM ciphertext: the encapsulator's public point.
pub type KemCiphertext = [u8; PUBLIC_KEY_LEN];

/// 32-byte secret agreed by a KEM or handshake.
///
/// Zeroized on drop. Equality is constant-time. Never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    /// Wrap raw secret bytes.
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Secret bytes.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SharedSecret {}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Capability to encapsulate a secret to a peer's public key.
pub trait Encapsulator: Send + Sync {
    /// Algorithm identifier.
    fn algorithm(&self) -> &'static str;

    /// Own public key, as sent to peers.
    fn public_key(&self) -> Vec<u8>;

    /// Length of a peer public key.
    fn public_key_len(&self) -> usize;

    /// Length of a ciphertext.
    fn ciphertext_len(&self) -> usize;

    /// Produce a ciphertext and the secret it encapsulates.
    fn encapsulate(&self, peer_public: &[u8]) -> Result<(Vec<u8>, SharedSecret)>;
}

/// Capability to recover a secret from a ciphertext.
pub trait Decapsulator: Send + Sync {
    /// Recover the secret encapsulated in `ciphertext`.
    fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret>;
}

/// X25519 keypair.
///
/// Ephemeral when created per exchange, static when used as a long-term
/// identity. Only the public point ever leaves this struct.
pub struct KemKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeyPair").field("public", self.public.as_bytes()).finish_non_exhaustive()
    }
}

impl KemKeyPair {
    /// Generate a fresh keypair.
    pub fn generate(rng: &impl RandomSource) -> Result<Self> {
        let mut scalar = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(scalar.as_mut_slice())?;
        Ok(Self::from_scalar(&scalar))
    }

    /// Rebuild a keypair from its private scalar.
    ///
    /// The argument is wiped once the keypair holds its own copy.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let bytes = Zeroizing::new(bytes);
        Self::from_scalar(&bytes)
    }

    /// The only copy of `scalar` outside the caller's buffer is the one moved
    /// into `StaticSecret`, which zeroizes on drop.
    fn from_scalar(scalar: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*scalar);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public point.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        *self.public.as_bytes()
    }

    /// Encapsulate to `peer_public` using this keypair as the encapsulator.
    ///
    /// Returns this keypair's public point as the ciphertext.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength` if `peer_public` is not 32 bytes
    /// - `InvalidPublicKey` if the peer point yields no contributory secret
    pub fn encapsulate(&self, peer_public: &[u8]) -> Result<(KemCiphertext, SharedSecret)> {
        let peer = parse_public(peer_public)?;
        let own = self.public_bytes();
        let secret = self.derive(&peer, &own, peer.as_bytes())?;
        Ok((own, secret))
    }

    /// Recover the secret from an encapsulator's ciphertext.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret> {
        let peer = parse_public(ciphertext)?;
        self.derive(&peer, peer.as_bytes(), &self.public_bytes())
    }

    /// DH with `peer`, then HKDF with `info = tag ‖ encapsulator ‖ decapsulator`.
    fn derive(
        &self,
        peer: &PublicKey,
        encapsulator: &[u8; PUBLIC_KEY_LEN],
        decapsulator: &[u8; PUBLIC_KEY_LEN],
    ) -> Result<SharedSecret> {
        // Zeroized on drop at the end of this scope
        let dh = self.secret.diffie_hellman(peer);
        if !dh.was_contributory() {
            tracing::warn!("rejected non-contributory X25519 public key");
            return Err(ShieldError::InvalidPublicKey);
        }

        let mut secret = SharedSecret([0u8; SHARED_SECRET_LEN]);
        kdf::derive_key_multi(
            dh.as_bytes(),
            &[KEM_INFO, encapsulator.as_slice(), decapsulator.as_slice()],
            &mut secret.0,
        )?;
        Ok(secret)
    }
}

impl Encapsulator for KemKeyPair {
    fn algorithm(&self) -> &'static str {
        "x25519"
    }

    fn public_key(&self) -> Vec<u8> {
        self.public_bytes().to_vec()
    }

    fn public_key_len(&self) -> usize {
        PUBLIC_KEY_LEN
    }

    fn ciphertext_len(&self) -> usize {
        PUBLIC_KEY_LEN
    }

    fn encapsulate(&self, peer_public: &[u8]) -> Result<(Vec<u8>, SharedSecret)> {
        let (ciphertext, secret) = Self::encapsulate(self, peer_public)?;
        Ok((ciphertext.to_vec(), secret))
    }
}

impl Decapsulator for KemKeyPair {
    fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret> {
        Self::decapsulate(self, ciphertext)
    }
}

/// Encapsulate to `peer_public` with a one-time keypair.
///
/// The ephemeral private scalar is dropped (and zeroized) before returning,
/// so the sender cannot recompute the secret later.
pub fn encapsulate_ephemeral(
    peer_public: &[u8],
    rng: &impl RandomSource,
) -> Result<(KemCiphertext, SharedSecret)> {
    KemKeyPair::generate(rng)?.encapsulate(peer_public)
}

/// Two KEMs whose secrets are combined with HKDF.
///
/// Public keys and ciphertexts are the concatenation of the members', first
/// member first. Every member must succeed.
pub struct HybridKem<A, B> {
    first: A,
    second: B,
}

impl<A, B> HybridKem<A, B>
where
    A: Encapsulator + Decapsulator,
    B: Encapsulator + Decapsulator,
{
    /// Combine two KEM members.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> Encapsulator for HybridKem<A, B>
where
    A: Encapsulator + Decapsulator,
    B: Encapsulator + Decapsulator,
{
    fn algorithm(&self) -> &'static str {
        "hybrid"
    }

    fn public_key(&self) -> Vec<u8> {
        let mut public = self.first.public_key();
        public.extend_from_slice(&self.second.public_key());
        public
    }

    fn public_key_len(&self) -> usize {
        self.first.public_key_len() + self.second.public_key_len()
    }

    fn ciphertext_len(&self) -> usize {
        self.first.ciphertext_len() + self.second.ciphertext_len()
    }

    fn encapsulate(&self, peer_public: &[u8]) -> Result<(Vec<u8>, SharedSecret)> {
        if peer_public.len() != self.public_key_len() {
            return Err(ShieldError::InvalidKeyLength {
                expected: self.public_key_len(),
                actual: peer_public.len(),
            });
        }
        let (first_public, second_public) = peer_public.split_at(self.first.public_key_len());

        let (mut ciphertext, first_secret) = self.first.encapsulate(first_public)?;
        let (second_ct, second_secret) = self.second.encapsulate(second_public)?;
        ciphertext.extend_from_slice(&second_ct);

        let secret = combine_secrets(&first_secret, &second_secret, &ciphertext)?;
        Ok((ciphertext, secret))
    }
}

impl<A, B> Decapsulator for HybridKem<A, B>
where
    A: Encapsulator + Decapsulator,
    B: Encapsulator + Decapsulator,
{
    fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret> {
        if ciphertext.len() != self.ciphertext_len() {
            return Err(ShieldError::InvalidKeyLength {
                expected: self.ciphertext_len(),
                actual: ciphertext.len(),
            });
        }
        let (first_ct, second_ct) = ciphertext.split_at(self.first.ciphertext_len());

        let first_secret = self.first.decapsulate(first_ct)?;
        let second_secret = self.second.decapsulate(second_ct)?;
        combine_secrets(&first_secret, &second_secret, ciphertext)
    }
}

/// HKDF over both member secrets, bound to the full ciphertext.
fn combine_secrets(
    first: &SharedSecret,
    second: &SharedSecret,
    ciphertext: &[u8],
) -> Result<SharedSecret> {
    let mut ikm = Zeroizing::new([0u8; 2 * SHARED_SECRET_LEN]);
    ikm[..SHARED_SECRET_LEN].copy_from_slice(first.as_bytes());
    ikm[SHARED_SECRET_LEN..].copy_from_slice(second.as_bytes());

    let mut secret = SharedSecret([0u8; SHARED_SECRET_LEN]);
    kdf::derive_key_multi(ikm.as_slice(), &[HYBRID_KEM_INFO, ciphertext], &mut secret.0)?;
    Ok(secret)
}

fn parse_public(bytes: &[u8]) -> Result<PublicKey> {
    let Ok(point) = <[u8; PUBLIC_KEY_LEN]>::try_from(bytes) else {
        return Err(ShieldError::InvalidKeyLength { expected: PUBLIC_KEY_LEN, actual: bytes.len() });
    };
    Ok(PublicKey::from(point))
}
