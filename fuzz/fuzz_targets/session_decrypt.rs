//! Fuzz target for the forward-secrecy session.
//!
//! # Strategy
//!
//! - Generate a random sequence of sends, deliveries, replays and raw
//!   injections between a sender and receiver sharing one secret
//! - Deliveries may skip, repeat or reorder messages
//!
//! # Invariants
//!
//! - Decryption never panics
//! - A message decrypts only when its counter equals the receiver's counter
//! - Failed decryptions never advance the receiver
//! - Every successful decryption yields the plaintext that was sent

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shield_crypto::{SeededRandom, Session};

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    /// Sender encrypts a message
    Send { plaintext: Vec<u8> },

    /// Deliver a previously sent message (index modulo history)
    Deliver { index: usize },

    /// Deliver a sent message with one byte flipped
    Tamper { index: usize, position: usize, mask: u8 },

    /// Inject raw bytes
    Raw { data: Vec<u8> },
}

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    secret: [u8; 32],
    ops: Vec<Op>,
}

fuzz_target!(|scenario: Scenario| {
    let Ok(sender) = Session::new(&scenario.secret, SeededRandom::new(1)) else {
        unreachable!("32-byte secret is always accepted")
    };
    let Ok(receiver) = Session::new(&scenario.secret, SeededRandom::new(2)) else {
        unreachable!("32-byte secret is always accepted")
    };

    let mut sent: Vec<(u64, Vec<u8>, Vec<u8>)> = Vec::new();

    for op in scenario.ops.into_iter().take(64) {
        match op {
            Op::Send { plaintext } => {
                let counter = sender.counter();
                let Ok(message) = sender.encrypt(&plaintext) else {
                    panic!("send failed before counter exhaustion");
                };
                assert_eq!(sender.counter(), counter + 1);
                sent.push((counter, plaintext, message));
            },

            Op::Deliver { index } => {
                if sent.is_empty() {
                    continue;
                }
                let (counter, plaintext, message) = &sent[index % sent.len()];
                let before = receiver.counter();

                match receiver.decrypt(message) {
                    Ok(opened) => {
                        assert_eq!(*counter, before);
                        assert_eq!(&opened, plaintext);
                        assert_eq!(receiver.counter(), before + 1);
                    },
                    Err(_) => {
                        assert_ne!(*counter, before);
                        assert_eq!(receiver.counter(), before);
                    },
                }
            },

            Op::Tamper { index, position, mask } => {
                if sent.is_empty() || mask == 0 {
                    continue;
                }
                let (_, _, message) = &sent[index % sent.len()];
                let mut tampered = message.clone();
                let at = position % tampered.len();
                tampered[at] ^= mask;

                let before = receiver.counter();
                assert!(receiver.decrypt(&tampered).is_err());
                assert_eq!(receiver.counter(), before);
            },

            Op::Raw { data } => {
                let before = receiver.counter();
                if receiver.decrypt(&data).is_err() {
                    assert_eq!(receiver.counter(), before);
                }
            },
        }
    }
});
