//! Handshake error types

use shield_crypto::ShieldError;
use thiserror::Error;

use crate::{messages::MessageType, state::HandshakeState};

/// Errors from the handshake state machines.
///
/// Every error except `InvalidState` moves the state machine to
/// [`HandshakeState::Failed`]. A failed handshake cannot be resumed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Underlying primitive failed (bad key, unsupported version, RNG)
    #[error(transparent)]
    Crypto(#[from] ShieldError),

    /// Operation not valid in the current state
    #[error("invalid state {state:?} for operation: {operation}")]
    InvalidState {
        /// Current state when the error occurred
        state: HandshakeState,
        /// Operation that was attempted
        operation: String,
    },

    /// Message bytes do not form a handshake message
    #[error("malformed handshake message: {reason}")]
    Malformed {
        /// What was wrong with the bytes
        reason: String,
    },

    /// Well-formed message that does not fit the current step
    #[error("unexpected {received:?} in state {state:?}")]
    UnexpectedMessage {
        /// State the message arrived in
        state: HandshakeState,
        /// Type of the message that arrived
        received: MessageType,
    },

    /// Peer's transcript signature did not verify
    #[error("peer signature verification failed")]
    BadSignature,

    /// Peer's signing key is not the pinned key
    #[error("peer signing key does not match the expected key")]
    PeerKeyMismatch,

    /// Key confirmation did not decrypt to the expected value
    #[error("key confirmation failed")]
    ConfirmationFailed,
}

impl HandshakeError {
    /// Returns true if the peer failed to prove who it is or what it saw.
    ///
    /// These must be reported to the peer only as a generic failure.
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            Self::BadSignature | Self::PeerKeyMismatch | Self::ConfirmationFailed => true,
            Self::Crypto(e) => matches!(e, ShieldError::AuthenticationFailed),
            Self::InvalidState { .. } | Self::Malformed { .. } | Self::UnexpectedMessage { .. } => {
                false
            },
        }
    }
}
