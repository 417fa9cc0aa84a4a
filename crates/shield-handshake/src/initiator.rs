//! Initiator (client) side of the handshake.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ start ┌─────────────────────┐ ServerHello ┌────────────────────────┐
//! │ Init │──────>│ AwaitingServerHello │────────────>│ AwaitingServerFinished │
//! └──────┘       └─────────────────────┘             └────────────────────────┘
//!                           │                                 │            │
//!                           │ rejected ServerHello   mismatch │            │ ServerFinished
//!                           ↓                                 ↓            ↓
//!                      ┌────────┐                        ┌────────┐  ┌──────────┐
//!                      │ Failed │                        │ Failed │  │ Complete │
//!                      └────────┘                        └────────┘  └──────────┘
//! ```

use shield_crypto::{
    KemKeyPair, OsRandom, RandomSource, Role, ShieldError, SharedSecret, SigningKeyPair, signature,
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

/// Per-state data. Secrets live only as long as the state that needs them.
enum Stage {
    Init,
    AwaitingServerHello { kem: KemKeyPair },
    AwaitingServerFinished { shared: SharedSecret, peer_sign_public: [u8; 32] },
    Complete,
    Failed,
}

impl Stage {
    fn state(&self) -> HandshakeState {
        match self {
            Self::Init => HandshakeState::Init,
            Self::AwaitingServerHello { .. } => HandshakeState::AwaitingServerHello,
            Self::AwaitingServerFinished { .. } => HandshakeState::AwaitingServerFinished,
            Self::Complete => HandshakeState::Complete,
            Self::Failed => HandshakeState::Failed,
        }
    }
}

/// Handshake initiator.
///
/// Pure state machine: no I/O. The driver sends the messages in returned
/// [`HandshakeAction::Send`] actions and feeds received bytes to
/// [`handle`](Self::handle).
pub struct Initiator<R: RandomSource = OsRandom> {
    identity: SigningKeyPair,
    config: HandshakeConfig,
    transcript: Transcript,
    stage: Stage,
    rng: R,
}

impl<R: RandomSource> std::fmt::Debug for Initiator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: RandomSource> Initiator<R> {
    /// Create an initiator in [`HandshakeState::Init`].
    pub fn new(identity: SigningKeyPair, config: HandshakeConfig, rng: R) -> Self {
        Self { identity, config, transcript: Transcript::new(), stage: Stage::Init, rng }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.stage.state()
    }

    /// Send `ClientHello` with a fresh ephemeral KEM key.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if not in Init state
    pub fn start(&mut self) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if !matches!(self.stage, Stage::Init) {
            return Err(self.invalid_state("start"));
        }

        let result = self.send_client_hello();
        self.settle(result)
    }

    /// Process one received message.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if the handshake has not started or
    ///   already ended
    /// - `HandshakeError::Malformed` / `UnexpectedMessage` for bad input
    /// - `HandshakeError::BadSignature` / `PeerKeyMismatch` if the responder
    ///   does not authenticate
    /// - `HandshakeError::ConfirmationFailed` if key confirmation fails
    pub fn handle(&mut self, bytes: &[u8]) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if matches!(self.stage, Stage::Init | Stage::Complete | Stage::Failed) {
            return Err(self.invalid_state("handle"));
        }

        let result = HandshakeMessage::decode(bytes).and_then(|message| self.process(message));
        self.settle(result)
    }

    /// Any error leaves the initiator in `Failed`.
    fn settle(
        &mut self,
        result: Result<Vec<HandshakeAction>, HandshakeError>,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if let Err(e) = &result {
            tracing::warn!(error = %e, "initiator handshake failed");
            self.stage = Stage::Failed;
        }
        result
    }

    fn send_client_hello(&mut self) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let kem = KemKeyPair::generate(&self.rng)?;
        let hello = HandshakeMessage::ClientHello(ClientHello {
            version: PROTOCOL_VERSION,
            kem_public: kem.public_bytes(),
            sign_public: self.identity.public_key(),
            nonce: self.rng.random_array()?,
        });

        self.transcript.absorb(&hello.to_bytes());
        self.stage = Stage::AwaitingServerHello { kem };
        tracing::debug!(state = ?self.state(), "sent ClientHello");

        Ok(vec![HandshakeAction::Send(hello)])
    }

    fn process(
        &mut self,
        message: HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Failed);
        match (stage, message) {
            (Stage::AwaitingServerHello { kem }, HandshakeMessage::ServerHello(hello)) => {
                self.handle_server_hello(&kem, &hello)
            },
            (
                Stage::AwaitingServerFinished { shared, peer_sign_public },
                HandshakeMessage::ServerFinished(finished),
            ) => self.handle_server_finished(&shared, peer_sign_public, finished),
            (stage, message) => Err(HandshakeError::UnexpectedMessage {
                state: stage.state(),
                received: message.message_type(),
            }),
        }
    }

    fn handle_server_hello(
        &mut self,
        kem: &KemKeyPair,
        hello: &ServerHello,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        if hello.version != PROTOCOL_VERSION {
            return Err(ShieldError::UnsupportedVersion(hello.version).into());
        }
        if self.config.expected_peer.is_some_and(|pinned| pinned != hello.sign_public) {
            return Err(HandshakeError::PeerKeyMismatch);
        }

        let signed = self.transcript.hash_with(&hello.unsigned_bytes());
        if !signature::verify(&signed, &hello.signature, &hello.sign_public)? {
            return Err(HandshakeError::BadSignature);
        }

        self.transcript.absorb(&HandshakeMessage::ServerHello(hello.clone()).to_bytes());
        let shared = kem.decapsulate(&hello.kem_ciphertext)?;

        let th2 = self.transcript.hash();
        let finished =
            HandshakeMessage::ClientFinished(ClientFinished { signature: self.identity.sign(&th2) });
        self.transcript.absorb(&finished.to_bytes());

        self.stage = Stage::AwaitingServerFinished { shared, peer_sign_public: hello.sign_public };
        tracing::debug!(state = ?self.state(), "verified ServerHello, sent ClientFinished");

        Ok(vec![HandshakeAction::Send(finished)])
    }

    fn handle_server_finished(
        &mut self,
        shared: &SharedSecret,
        peer_sign_public: [u8; 32],
        finished: ServerFinished,
    ) -> Result<Vec<HandshakeAction>, HandshakeError> {
        let th3 = self.transcript.hash();
        schedule::open_confirmation(shared, &th3, &finished.encrypted_confirmation, &self.rng)?;

        self.transcript.absorb(&HandshakeMessage::ServerFinished(finished).to_bytes());

        let th4 = self.transcript.hash();
        let session_secret = schedule::session_secret(shared, &th4)?;

        self.stage = Stage::Complete;
        tracing::debug!(state = ?self.state(), "handshake complete");

        Ok(vec![HandshakeAction::Complete(HandshakeOutcome::new(
            session_secret,
            th4,
            peer_sign_public,
            Role::Initiator,
        ))])
    }

    fn invalid_state(&self, operation: &str) -> HandshakeError {
        HandshakeError::InvalidState { state: self.state(), operation: operation.to_string() }
    }
}
