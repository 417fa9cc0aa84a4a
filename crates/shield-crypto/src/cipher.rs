//! Cascading authenticated encryption: AES-256-GCM inside ChaCha20-Poly1305.
//!
//! Confidentiality and integrity hold as long as either AEAD is unbroken.
//! The two layers use independent keys, independent random nonces and the
//! same associated data.
//!
//! # Wire Format
//!
//! ```text
//! ┌─────────┬──────────┬──────────┬─────────────────────────────────────┐
//! │ version │ nonce A  │ nonce B  │ ChaCha20-Poly1305(                  │
//! │ 1 byte  │ 12 bytes │ 12 bytes │   AES-256-GCM(plaintext) ‖ tag A    │
//! │         │          │          │ ) ‖ tag B                           │
//! └─────────┴──────────┴──────────┴─────────────────────────────────────┘
//! ```
//!
//! # Padding
//!
//! With a [`PaddingPolicy`] the inner plaintext becomes
//! `len_le32 ‖ plaintext ‖ random fill`, rounded up to the block size with at
//! least `min_padding` fill bytes. Padded ciphertexts carry
//! [`VERSION_PADDED`]; a cipher only accepts the version it produces.
//!
//! # Failure Semantics
//!
//! Inputs shorter than [`CascadeCipher::overhead`] are rejected as
//! `InvalidCiphertext` (length is public). Everything else, including an
//! unknown version byte, a tag mismatch at either layer, a wrong key or wrong
//! AAD, is reported as the single `AuthenticationFailed` error.

use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce as ChaChaNonce,
    aead::{Aead, KeyInit, Payload},
};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    error::{Result, ShieldError},
    kdf::{self, INFO_INNER_LAYER, INFO_OUTER_LAYER, PasswordKdfParams},
    random::{OsRandom, RandomSource},
};

/// Version byte of unpadded ciphertexts
pub const VERSION: u8 = 0x01;

/// Version byte of length-hiding padded ciphertexts
pub const VERSION_PADDED: u8 = 0x02;

/// Nonce length of both layers
pub const NONCE_LEN: usize = 12;

/// Authentication tag length of both layers
pub const TAG_LEN: usize = 16;

/// Layer key length
pub const KEY_LEN: usize = 32;

/// Version byte plus both nonces
pub const HEADER_LEN: usize = 1 + 2 * NONCE_LEN;

/// Little-endian plaintext length prepended when padding
const LENGTH_PREFIX_LEN: usize = 4;

/// Largest accepted padding block size and minimum fill
pub const MAX_PADDING_BLOCK: usize = 64 * 1024;

/// Length-hiding padding configuration.
///
/// Only constructible through [`PaddingPolicy::new`] or `Default`, so every
/// policy has a non-zero block size and a non-zero minimum fill, both at most
/// [`MAX_PADDING_BLOCK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingPolicy {
    block_size: usize,
    min_padding: usize,
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        Self { block_size: 64, min_padding: 16 }
    }
}

impl PaddingPolicy {
    /// Validate a padding policy.
    ///
    /// # Errors
    ///
    /// - `InvalidPadding` if either value is zero or exceeds
    ///   [`MAX_PADDING_BLOCK`]
    pub fn new(block_size: usize, min_padding: usize) -> Result<Self> {
        let in_range = |value: usize| (1..=MAX_PADDING_BLOCK).contains(&value);
        if !in_range(block_size) || !in_range(min_padding) {
            return Err(ShieldError::InvalidPadding);
        }
        Ok(Self { block_size, min_padding })
    }

    /// Framed plaintext is rounded up to a multiple of this size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Fewest random fill bytes ever appended.
    pub fn min_padding(&self) -> usize {
        self.min_padding
    }

    /// Length of the framed inner plaintext for `plaintext_len` input bytes.
    ///
    /// `None` if the framed length is not representable.
    pub fn padded_len(&self, plaintext_len: usize) -> Option<usize> {
        let framed = plaintext_len.checked_add(LENGTH_PREFIX_LEN + self.min_padding)?;
        framed.div_ceil(self.block_size).checked_mul(self.block_size)
    }
}

/// Two-layer AEAD with independent keys.
///
/// Stateless once constructed; safe to share between threads. Each call
/// draws two fresh nonces from the injected [`RandomSource`].
pub struct CascadeCipher<R: RandomSource = OsRandom> {
    inner: Aes256Gcm,
    outer: ChaCha20Poly1305,
    padding: Option<PaddingPolicy>,
    rng: R,
}

impl<R: RandomSource> std::fmt::Debug for CascadeCipher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeCipher")
            .field("version", &self.version())
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}

impl<R: RandomSource> CascadeCipher<R> {
    /// Create a cipher from two independent layer keys.
    ///
    /// # Errors
    ///
    /// - `KeyReuse` if both keys are identical
    pub fn new(inner_key: &[u8; KEY_LEN], outer_key: &[u8; KEY_LEN], rng: R) -> Result<Self> {
        if bool::from(inner_key.ct_eq(outer_key)) {
            return Err(ShieldError::KeyReuse);
        }

        Ok(Self {
            inner: Aes256Gcm::new(inner_key.into()),
            outer: ChaCha20Poly1305::new(outer_key.into()),
            padding: None,
            rng,
        })
    }

    /// Create a cipher from a 32-byte shared secret.
    ///
    /// Both layer keys come from separate HKDF calls with distinct `info`
    /// strings. This is the entry point for KEM outputs, handshake secrets and
    /// ratchet message keys.
    pub fn from_raw_secret(secret: &[u8], rng: R) -> Result<Self> {
        if secret.len() != KEY_LEN {
            return Err(ShieldError::InvalidKeyLength { expected: KEY_LEN, actual: secret.len() });
        }

        let inner_key = kdf::derive_key_array::<KEY_LEN>(secret, INFO_INNER_LAYER)?;
        let outer_key = kdf::derive_key_array::<KEY_LEN>(secret, INFO_OUTER_LAYER)?;
        Self::new(&inner_key, &outer_key, rng)
    }

    /// Create a cipher from a password with default Argon2id costs.
    ///
    /// The same password always yields the same cipher keys; see
    /// [`kdf::derive_password_keys`] for the trade-off.
    pub fn from_password(password: &[u8], rng: R) -> Result<Self> {
        Self::from_password_with_params(password, &PasswordKdfParams::default(), rng)
    }

    /// Create a cipher from a password with explicit Argon2id costs.
    pub fn from_password_with_params(
        password: &[u8],
        params: &PasswordKdfParams,
        rng: R,
    ) -> Result<Self> {
        let keys = kdf::derive_password_keys(password, params)?;
        Self::new(keys.inner(), keys.outer(), rng)
    }

    /// Enable length-hiding padding.
    #[must_use]
    pub fn with_padding(mut self, policy: PaddingPolicy) -> Self {
        self.padding = Some(policy);
        self
    }

    /// Version byte this cipher writes and accepts.
    pub fn version(&self) -> u8 {
        if self.padding.is_some() { VERSION_PADDED } else { VERSION }
    }

    /// Bytes added to every plaintext.
    ///
    /// Exact for unpadded ciphers. With padding this is the minimum; use
    /// [`Self::ciphertext_len`] for the exact size.
    pub fn overhead(&self) -> usize {
        HEADER_LEN + 2 * TAG_LEN + self.padding.map_or(0, |p| LENGTH_PREFIX_LEN + p.min_padding)
    }

    /// Exact ciphertext length for a plaintext of `plaintext_len` bytes.
    ///
    /// `None` if no ciphertext of that size is representable.
    pub fn ciphertext_len(&self, plaintext_len: usize) -> Option<usize> {
        let body = match self.padding {
            Some(policy) => policy.padded_len(plaintext_len)?,
            None => plaintext_len,
        };
        body.checked_add(HEADER_LEN + 2 * TAG_LEN)
    }

    /// Encrypt without associated data.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    /// Encrypt, binding `aad` into both layers.
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let framed = match self.padding {
            Some(policy) => Some(self.pad(plaintext, policy)?),
            None => None,
        };
        let body = framed.as_deref().map_or(plaintext, Vec::as_slice);

        let nonce_a: [u8; NONCE_LEN] = self.rng.random_array()?;
        let nonce_b: [u8; NONCE_LEN] = self.rng.random_array()?;

        let inner_ct = self
            .inner
            .encrypt(AesNonce::from_slice(&nonce_a), Payload { msg: body, aad })
            .map_err(|_| ShieldError::EncryptionFailed)?;
        let outer_ct = self
            .outer
            .encrypt(ChaChaNonce::from_slice(&nonce_b), Payload { msg: &inner_ct, aad })
            .map_err(|_| ShieldError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(HEADER_LEN + outer_ct.len());
        out.push(self.version());
        out.extend_from_slice(&nonce_a);
        out.extend_from_slice(&nonce_b);
        out.extend_from_slice(&outer_ct);
        Ok(out)
    }

    /// Decrypt a ciphertext produced without associated data.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(ciphertext, &[])
    }

    /// Decrypt, requiring the same `aad` that was used to encrypt.
    ///
    /// Opens the outer layer first, then the inner layer.
    pub fn decrypt_with_aad(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let minimum = self.overhead();
        if ciphertext.len() < minimum {
            return Err(ShieldError::InvalidCiphertext { minimum, actual: ciphertext.len() });
        }

        if ciphertext[0] != self.version() {
            return Err(rejected());
        }

        let (nonce_a, rest) = ciphertext[1..].split_at(NONCE_LEN);
        let (nonce_b, payload) = rest.split_at(NONCE_LEN);

        let inner_ct = self
            .outer
            .decrypt(ChaChaNonce::from_slice(nonce_b), Payload { msg: payload, aad })
            .map_err(|_| rejected())?;
        let body = self
            .inner
            .decrypt(AesNonce::from_slice(nonce_a), Payload { msg: &inner_ct, aad })
            .map_err(|_| rejected())?;

        match self.padding {
            Some(_) => unpad(&Zeroizing::new(body)),
            None => Ok(body),
        }
    }

    /// Frame the plaintext as `len_le32 ‖ plaintext ‖ random fill`.
    fn pad(&self, plaintext: &[u8], policy: PaddingPolicy) -> Result<Zeroizing<Vec<u8>>> {
        let declared = u32::try_from(plaintext.len()).map_err(|_| ShieldError::InvalidPadding)?;
        let total = policy.padded_len(plaintext.len()).ok_or(ShieldError::InvalidPadding)?;

        let mut framed = Zeroizing::new(Vec::with_capacity(total));
        framed.extend_from_slice(&declared.to_le_bytes());
        framed.extend_from_slice(plaintext);

        let fill_start = framed.len();
        framed.resize(total, 0);
        self.rng.fill_bytes(&mut framed[fill_start..])?;
        Ok(framed)
    }
}

/// Strip the length prefix and fill from a decrypted padded body.
fn unpad(body: &[u8]) -> Result<Vec<u8>> {
    let Some((prefix, rest)) = body.split_first_chunk::<LENGTH_PREFIX_LEN>() else {
        return Err(ShieldError::InvalidPadding);
    };

    let declared = u32::from_le_bytes(*prefix) as usize;
    if declared > rest.len() {
        return Err(ShieldError::InvalidPadding);
    }

    Ok(rest[..declared].to_vec())
}

/// Uniform rejection for every authentication-class failure.
fn rejected() -> ShieldError {
    tracing::debug!("cascade ciphertext rejected");
    ShieldError::AuthenticationFailed
}
