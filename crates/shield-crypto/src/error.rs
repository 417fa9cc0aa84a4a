//! Error types for Shield primitives

use thiserror::Error;

/// Errors from Shield cryptographic operations.
///
/// Length and shape errors carry the offending sizes; they depend only on
/// public input. Authentication outcomes never say which layer, key or AAD
/// was wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShieldError {
    /// Key material has the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Public key is well-sized but unusable (not a curve point, low order)
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Ciphertext is shorter than the fixed header and tags
    #[error("invalid ciphertext: need at least {minimum} bytes, got {actual}")]
    InvalidCiphertext {
        /// Minimum well-formed length
        minimum: usize,
        /// Actual length
        actual: usize,
    },

    /// Signature has the wrong length
    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignature {
        /// Expected signature length
        expected: usize,
        /// Actual signature length
        actual: usize,
    },

    /// An AEAD layer refused to seal the input (exceeds the cipher's limit)
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed at some cascade layer
    #[error("decryption failed")]
    AuthenticationFailed,

    /// Padded plaintext declares more bytes than it carries
    #[error("invalid padding")]
    InvalidPadding,

    /// Requested key material exceeds the HKDF expansion limit
    #[error("requested {requested} bytes of key material, limit is {limit}")]
    LengthExceeded {
        /// Requested output length
        requested: usize,
        /// Largest derivable output length
        limit: usize,
    },

    /// Key derivation could not produce the requested output
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed {
        /// Reason for the failure
        reason: String,
    },

    /// The same key was supplied for both cascade layers
    #[error("cascade layers require independent keys")]
    KeyReuse,

    /// Session message counter does not match the expected position
    #[error("message out of order: expected counter {expected}, got {received}")]
    OutOfOrder {
        /// Counter the session expects next
        expected: u64,
        /// Counter carried by the message
        received: u64,
    },

    /// Session counter cannot advance any further
    #[error("session counter exhausted, establish a new session")]
    CounterExhausted,

    /// Unrecognised protocol version byte
    #[error("unsupported version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// The randomness source failed to produce bytes
    #[error("randomness source unavailable")]
    RandomnessUnavailable,
}

impl ShieldError {
    /// Returns true if this error describes malformed public input.
    ///
    /// Input errors are safe to report in detail. Authentication failures
    /// must be surfaced to peers only as a generic failure.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::InvalidKeyLength { .. }
            | Self::InvalidCiphertext { .. }
            | Self::InvalidSignature { .. }
            | Self::LengthExceeded { .. }
            | Self::UnsupportedVersion(_) => true,

            Self::InvalidPublicKey
            | Self::EncryptionFailed
            | Self::AuthenticationFailed
            | Self::InvalidPadding
            | Self::KeyDerivationFailed { .. }
            | Self::KeyReuse
            | Self::OutOfOrder { .. }
            | Self::CounterExhausted
            | Self::RandomnessUnavailable => false,
        }
    }
}

/// Result alias for Shield operations.
pub type Result<T> = std::result::Result<T, ShieldError>;
