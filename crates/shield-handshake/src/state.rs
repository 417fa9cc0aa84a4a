//! Handshake states, configuration, actions and outcome.

use shield_crypto::{DuplexSession, RandomSource, Role, SharedSecret};

use crate::{error::HandshakeError, messages::HandshakeMessage, transcript::HASH_LEN};

/// Handshake state, shared by both roles.
///
/// ```text
/// Initiator: Init ──start──> AwaitingServerHello ──> AwaitingServerFinished ──> Complete
/// Responder: AwaitingClientHello ──> AwaitingClientFinished ──> Complete
///
/// Any verification or protocol error ──> Failed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Initiator created, `ClientHello` not yet sent
    Init,
    /// Initiator sent `ClientHello`
    AwaitingServerHello,
    /// Initiator sent `ClientFinished`
    AwaitingServerFinished,
    /// Responder waiting for the first message
    AwaitingClientHello,
    /// Responder sent `ServerHello`
    AwaitingClientFinished,
    /// Session secret established
    Complete,
    /// Handshake aborted
    Failed,
}

impl HandshakeState {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Handshake configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Ed25519 key the peer must present. `None` accepts any key that signs
    /// the transcript correctly.
    pub expected_peer: Option<[u8; 32]>,
}

impl HandshakeConfig {
    /// Configuration that pins the peer's signing key.
    pub fn pinned(peer_sign_public: [u8; 32]) -> Self {
        Self { expected_peer: Some(peer_sign_public) }
    }
}

/// Actions returned by the handshake state machines.
///
/// The driver executes these in order:
/// - `Send`: encode the message and deliver it to the peer
/// - `Complete`: the handshake succeeded; take the outcome
#[derive(Debug)]
pub enum HandshakeAction {
    /// Deliver this message to the peer
    Send(HandshakeMessage),
    /// Handshake finished
    Complete(HandshakeOutcome),
}

/// Result of a completed handshake.
///
/// Both sides hold equal `session_secret` and `transcript_hash` values.
#[derive(Debug)]
pub struct HandshakeOutcome {
    session_secret: SharedSecret,
    transcript_hash: [u8; HASH_LEN],
    peer_sign_public: [u8; 32],
    role: Role,
}

impl HandshakeOutcome {
    pub(crate) fn new(
        session_secret: SharedSecret,
        transcript_hash: [u8; HASH_LEN],
        peer_sign_public: [u8; 32],
        role: Role,
    ) -> Self {
        Self { session_secret, transcript_hash, peer_sign_public, role }
    }

    /// Secret bound to all four handshake messages.
    pub fn session_secret(&self) -> &SharedSecret {
        &self.session_secret
    }

    /// SHA-512 transcript hash over all four messages.
    pub fn transcript_hash(&self) -> &[u8; HASH_LEN] {
        &self.transcript_hash
    }

    /// Peer's verified Ed25519 key.
    pub fn peer_sign_public(&self) -> &[u8; 32] {
        &self.peer_sign_public
    }

    /// This side's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Build directional sessions for this side from the session secret.
    pub fn into_duplex<R: RandomSource + Clone>(
        self,
        rng: R,
    ) -> Result<DuplexSession<R>, HandshakeError> {
        Ok(DuplexSession::new(self.session_secret.as_bytes(), self.role, rng)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(HandshakeState::Complete.is_terminal());
        assert!(HandshakeState::Failed.is_terminal());
        assert!(!HandshakeState::Init.is_terminal());
        assert!(!HandshakeState::AwaitingClientFinished.is_terminal());
    }

    #[test]
    fn default_config_pins_nothing() {
        assert_eq!(HandshakeConfig::default().expected_peer, None);
        assert_eq!(HandshakeConfig::pinned([1; 32]).expected_peer, Some([1; 32]));
    }

    #[test]
    fn outcome_feeds_duplex_session() {
        let secret = [0x33; 32];
        let initiator = HandshakeOutcome::new(
            SharedSecret::from_bytes(secret),
            [0; HASH_LEN],
            [2; 32],
            Role::Initiator,
        );
        let responder = HandshakeOutcome::new(
            SharedSecret::from_bytes(secret),
            [0; HASH_LEN],
            [1; 32],
            Role::Responder,
        );

        let initiator = initiator.into_duplex(shield_crypto::OsRandom).unwrap();
        let responder = responder.into_duplex(shield_crypto::OsRandom).unwrap();

        let message = initiator.encrypt(b"first").unwrap();
        assert_eq!(responder.decrypt(&message).unwrap(), b"first");
    }
}
