//! Fuzz target for handshake message parsing and state machine input.
//!
//! # Strategy
//!
//! - Decode arbitrary bytes as a handshake message
//! - Feed the same bytes to a fresh responder and to an initiator that has
//!   already sent `ClientHello`
//!
//! # Invariants
//!
//! - Decoding and handling never panic
//! - Anything that decodes re-encodes to the identical bytes
//! - Neither state machine ever completes from unauthenticated input
//! - A rejected message leaves the machine in `Failed`

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shield_crypto::{SeededRandom, SigningKeyPair};
use shield_handshake::{
    HandshakeAction, HandshakeConfig, HandshakeMessage, HandshakeState, Initiator, Responder,
};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    data: Vec<u8>,
}

fn completed(actions: &[HandshakeAction]) -> bool {
    actions.iter().any(|action| matches!(action, HandshakeAction::Complete(_)))
}

fuzz_target!(|scenario: Scenario| {
    if let Ok(message) = HandshakeMessage::decode(&scenario.data) {
        assert_eq!(message.to_bytes().as_ref(), scenario.data.as_slice());
        assert_eq!(message.encoded_len(), scenario.data.len());
    }

    let mut responder = Responder::new(
        SigningKeyPair::from_seed(&[1u8; 32]),
        HandshakeConfig::default(),
        SeededRandom::new(scenario.seed),
    );
    match responder.handle(&scenario.data) {
        Ok(actions) => assert!(!completed(&actions)),
        Err(_) => assert_eq!(responder.state(), HandshakeState::Failed),
    }

    let mut initiator = Initiator::new(
        SigningKeyPair::from_seed(&[2u8; 32]),
        HandshakeConfig::default(),
        SeededRandom::new(scenario.seed),
    );
    if initiator.start().is_err() {
        return;
    }
    match initiator.handle(&scenario.data) {
        Ok(actions) => assert!(!completed(&actions)),
        Err(_) => assert_eq!(initiator.state(), HandshakeState::Failed),
    }
});
