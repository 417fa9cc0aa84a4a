//! Shield Cryptographic Primitives
//!
//! Defense-in-depth building blocks: a two-layer cascading AEAD, an X25519
//! KEM, Ed25519 signatures, HKDF/Argon2id key derivation and a ratcheting
//! forward-secrecy session. Every operation is synchronous and performs no
//! I/O. Entropy comes from an injected [`RandomSource`] so tests can run
//! deterministically.
//!
//! # Key Lifecycle
//!
//! ```text
//! X25519 KEM (or handshake)          Password
//!        │                               │
//!        ▼                               ▼
//! Shared Secret (32 bytes)          Argon2id (64 bytes)
//!        │                               │
//!        ├──────────────┐                │
//!        ▼              ▼                ▼
//! HKDF "shield-session-v1"   HKDF "shield-aes" / "shield-chacha"
//!        │                               │
//!        ▼                               ▼
//! HMAC ratchet → message key ──→ Cascade Cipher (AES-256-GCM ∘ ChaCha20-Poly1305)
//! ```
//!
//! # Layering
//!
//! The KDF and KEM never import the cipher. The cipher is built from raw
//! secret bytes through [`CascadeCipher::from_raw_secret`], which any upstream
//! component can call.
//!
//! # Security
//!
//! Defense in depth:
//! - Two AEADs from different design families with independent keys and nonces
//! - Breaking one layer leaves the other intact
//!
//! Forward Secrecy:
//! - Session chain keys are zeroized as soon as the next one is derived
//! - Message keys are used once and zeroized
//!
//! Failure uniformity:
//! - Any tag mismatch at either layer, wrong key or wrong AAD is the same
//!   `AuthenticationFailed`
//! - Only public length checks produce specific errors

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod kem;
pub mod random;
pub mod session;
pub mod signature;

pub use cipher::{CascadeCipher, PaddingPolicy};
pub use error::{Result, ShieldError};
pub use kdf::{PasswordKdfParams, PasswordKeys, derive_key, derive_password_keys};
pub use kem::{
    Decapsulator, Encapsulator, HybridKem, KemCiphertext, KemKeyPair, SharedSecret,
    encapsulate_ephemeral,
};
pub use random::{OsRandom, RandomSource};
pub use session::{DuplexSession, Role, Session};
pub use signature::{
    CombinedSigner, CombinedVerifier, Ed25519Verifier, Signer, SigningKeyPair, Verifier, verify,
};

#[cfg(any(test, feature = "test-utils"))]
pub use random::SeededRandom;
