//! Responder (server) side of the handshake.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────────────┐ ClientHello ┌────────────────────────┐ ClientFinished ┌──────────┐
//! │ AwaitingClientHello │────────────>│ AwaitingClientFinished │───────────────>│ Complete │
//! └─────────────────────┘             └────────────────────────┘                └──────────┘
//!            │                                    │
//!            │ unsupported version                │ bad signature / pin
//!            ↓                                    ↓
//!       ┌────────┐                           ┌────────┐
//!       │ Failed │                           │ Failed │
//!       └────────┘                           └────────┘
//! ```
//!
//! The responder encapsulates to the initiator's ephemeral KEM key with its
//! own fresh ephemeral keypair, so the shared secret depends on no long-term
//! key. Its long-term Ed25519 identity only signs the transcript.

use bytes::Bytes;
use shield_crypto::{
    OsRandom, RandomSource, Role, ShieldError, SharedSecret, SigningKeyPair, kem, signature,
};

use crate::{
    error::HandshakeError,
    messages::{
        ClientFinished, ClientHello, HandshakeMessage, PROTOCOL_VERSION, ServerFinished,
        ServerHello,
    },
    schedule,
    state::{HandshakeAction, HandshakeConfig, HandshakeOutcome, HandshakeState},
    transcript::Transcript,
};

/// Per-state data.
enum Stage {
    AwaitingClientHello,
    AwaitingClientFinished { shared: SharedSecret, peer_sign_public: [u8; 32] },
    Complete,
    Failed,
}

impl Stage {
    fn state(&self) -> HandshakeState {
        match self {
            Self::AwaitingClientHello => HandshakeState::AwaitingClientHello,
            Self::AwaitingClientFinished { .. } => HandshakeState::AwaitingClientFinished,
            Self::Complete => HandshakeState::Complete,
            Self::Failed => HandshakeState::Failed,
        }
    }
}

/// Handshake responder.
///
/// Starts in [`HandshakeState::AwaitingClientHello`]. Completes after
/// verifying `ClientFinished`, returning `ServerFinished` to send and the
/// outcome in one batch of actions.
pub struct Responder<R: RandomSource = OsRandom> {
    identity: SigningKeyPair,
    config: HandshakeConfig,
    transcript: Transcript,
    stage: Stage,
    rng: R,
}

impl<R: RandomSource> std::fmt::Debug for Responder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: RandomSource> Responder<R> {
    /// Create a responder waiting for `ClientHello`.
    pub fn new(identity: SigningKeyPair, config: HandshakeConfig, rng: R) -> Self {
        Self {
            identity,
            config,
            transcript: Transcript::new(),
            stage: Stage::AwaitingClientHello,
            rng,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.stage.state()
    }

    /// Process one received message.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` once the handshake has ended
    /// - `HandshakeError::Malformed` / `UnexpectedMessage` for bad input
    /// - `UnsupportedVersion` (as `HandshakeError::Crypto`) for a foreign
    ///   `ClientHello` version
    /// - `HandshakeError::BadSignature` / `PeerKeyMismatch` if the initiator
    ///   does not authenticate
    pub fn handle(&mut self, bytes: &[u8]) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if matches!(self.stage, Stage::Complete | Stage::Failed) {
            return Err(HandshakeError::InvalidState {
                state: self.state(),
                operation: "handle".to_string(),
            });
        }

        let result = HandshakeMessage::decode(bytes).and_then(|message| self.process(message));
        if let Err(e) = &result {
            tracing::warn!(error = %e, "responder handshake failed");
            self.stage = Stage::Failed;
        }
        result
    }

    fn process(
        &mut self,
        message: HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Failed);
        match (stage, message) {
            (Stage::AwaitingClientHello, HandshakeMessage::ClientHello(hello)) => {
                self.handle_client_hello(&hello)
            },
            (
                Stage::AwaitingClientFinished { shared, peer_sign_public },
                HandshakeMessage::ClientFinished(finished),
            ) => self.handle_client_finished(&shared, peer_sign_public, &finished),
            (stage, message) => Err(HandshakeError::UnexpectedMessage {
                state: stage.state(),
                received: message.message_type(),
            }),
        }
    }

    fn handle_client_hello(
        &mut self,
        hello: &ClientHello,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if hello.version != PROTOCOL_VERSION {
            return Err(ShieldError::UnsupportedVersion(hello.version).into());
        }

        self.transcript.absorb(&HandshakeMessage::ClientHello(hello.clone()).to_bytes());
        let (kem_ciphertext, shared) = kem::encapsulate_ephemeral(&hello.kem_public, &self.rng)?;

        let mut reply = ServerHello {
            version: PROTOCOL_VERSION,
            kem_ciphertext,
            sign_public: self.identity.public_key(),
            signature: [0u8; 64],
            nonce: self.rng.random_array()?,
        };
        let signed = self.transcript.hash_with(&reply.unsigned_bytes());
        reply.signature = self.identity.sign(&signed);

        let reply = HandshakeMessage::ServerHello(reply);
        self.transcript.absorb(&reply.to_bytes());

        self.stage = Stage::AwaitingClientFinished { shared, peer_sign_public: hello.sign_public };
        tracing::debug!(state = ?self.state(), "sent ServerHello");

        Ok(vec![HandshakeAction::Send(reply)])
    }

    fn handle_client_finished(
        &mut self,
        shared: &SharedSecret,
        peer_sign_public: [u8; 32],
        finished: &ClientFinished,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let th2 = self.transcript.hash();
        if !signature::verify(&th2, &finished.signature, &peer_sign_public)? {
            return Err(HandshakeError::BadSignature);
        }
        if self.config.expected_peer.is_some_and(|pinned| pinned != peer_sign_public) {
            return Err(HandshakeError::PeerKeyMismatch);
        }

        self.transcript.absorb(&HandshakeMessage::ClientFinished(finished.clone()).to_bytes());
        let th3 = self.transcript.hash();

        let confirmation = schedule::seal_confirmation(shared, &th3, &self.rng)?;
        let reply = HandshakeMessage::ServerFinished(ServerFinished {
            encrypted_confirmation: Bytes::from(confirmation),
        });
        self.transcript.absorb(&reply.to_bytes());

        let th4 = self.transcript.hash();
        let session_secret = schedule::session_secret(shared, &th4)?;

        self.stage = Stage::Complete;
        tracing::debug!(state = ?self.state(), "handshake complete");

        Ok(vec![
            HandshakeAction::Send(reply),
            HandshakeAction::Complete(HandshakeOutcome::new(
                session_secret,
                th4,
                peer_sign_public,
                Role::Responder,
            )),
        ])
    }
}
