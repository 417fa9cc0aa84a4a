//! Shield Handshake
//!
//! Four-message mutually authenticated key agreement that feeds a
//! [`shield_crypto::DuplexSession`].
//!
//! # Protocol
//!
//! ```text
//! Initiator                                             Responder
//!   │ ClientHello { ver, kem_public, sign_public, nonce }     │
//!   │────────────────────────────────────────────────────────>│ encapsulate to kem_public
//!   │                                                         │ sign H(transcript ‖ SH*)
//!   │ ServerHello { ver, kem_ct, sign_public, sig, nonce }    │
//!   │<────────────────────────────────────────────────────────│
//!   │ verify sig, decapsulate, sign H(transcript)             │
//!   │ ClientFinished { sig }                                  │
//!   │────────────────────────────────────────────────────────>│ verify sig
//!   │ ServerFinished { Enc(confirm_key, "shield-server-finished", aad = th3) }
//!   │<────────────────────────────────────────────────────────│
//!   │ check confirmation                                      │
//!   ▼                                                         ▼
//!   session_secret = HKDF(shared, "shield-hs-session" ‖ th4)
//! ```
//!
//! `SH*` is `ServerHello` without its signature field. `th3` is the transcript
//! hash through `ClientFinished` and `th4` through `ServerFinished`.
//!
//! # Security
//!
//! - Mutual authentication: each side signs the transcript with its Ed25519
//!   identity; [`HandshakeConfig::expected_peer`] pins the peer's key
//! - Forward secrecy: the KEM uses two ephemeral X25519 keys
//! - Key confirmation: the initiator only completes after proving the
//!   responder derived the same shared secret over the same transcript
//! - Transcript binding: the session secret covers every message byte
//!
//! Both state machines are pure (no I/O) and return [`HandshakeAction`]s for
//! the driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod initiator;
pub mod messages;
pub mod responder;
mod schedule;
pub mod state;
pub mod transcript;

pub use error::HandshakeError;
pub use initiator::Initiator;
pub use messages::{
    ClientFinished, ClientHello, HandshakeMessage, MessageType, PROTOCOL_VERSION, ServerFinished,
    ServerHello,
};
pub use responder::Responder;
pub use state::{HandshakeAction, HandshakeConfig, HandshakeOutcome, HandshakeState};
pub use transcript::Transcript;
