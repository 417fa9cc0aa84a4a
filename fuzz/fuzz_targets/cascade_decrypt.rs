//! Fuzz target for the cascade cipher.
//!
//! # Strategy
//!
//! - Decrypt arbitrary bytes under an arbitrary key (padded and unpadded)
//! - Encrypt arbitrary plaintext, then corrupt one byte of the output
//! - Decrypt with mismatched associated data
//!
//! # Invariants
//!
//! - Decryption never panics, whatever the input
//! - Untampered ciphertext always decrypts to the original plaintext
//! - Any single flipped byte is rejected
//! - Ciphertext length matches `ciphertext_len`
//! - Only zero-sized padding policies are rejected

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shield_crypto::{CascadeCipher, PaddingPolicy, SeededRandom, ShieldError};

#[derive(Debug, Clone, Arbitrary)]
enum Scenario {
    /// Raw bytes straight into decrypt
    Garbage { secret: [u8; 32], padded: bool, data: Vec<u8> },

    /// Encrypt, flip one byte, decrypt
    Tamper { secret: [u8; 32], plaintext: Vec<u8>, position: usize, mask: u8 },

    /// Encrypt with one AAD, decrypt with another
    AadMismatch { secret: [u8; 32], plaintext: Vec<u8>, aad: Vec<u8>, other: Vec<u8> },

    /// Padded roundtrip with an arbitrary policy
    Padding { secret: [u8; 32], plaintext: Vec<u8>, block_size: u8, min_padding: u8 },
}

fn cipher(secret: &[u8; 32], seed: u64) -> CascadeCipher<SeededRandom> {
    let Ok(cipher) = CascadeCipher::from_raw_secret(secret, SeededRandom::new(seed)) else {
        unreachable!("32-byte secret is always accepted")
    };
    cipher
}

fuzz_target!(|scenario: Scenario| {
    match scenario {
        Scenario::Garbage { secret, padded, data } => {
            let mut cipher = cipher(&secret, 0);
            if padded {
                cipher = cipher.with_padding(PaddingPolicy::default());
            }
            let _ = cipher.decrypt(&data);
        },

        Scenario::Tamper { secret, plaintext, position, mask } => {
            let cipher = cipher(&secret, 1);
            let Ok(mut ciphertext) = cipher.encrypt(&plaintext) else {
                return;
            };
            assert_eq!(Some(ciphertext.len()), cipher.ciphertext_len(plaintext.len()));

            let Ok(opened) = cipher.decrypt(&ciphertext) else {
                panic!("untampered ciphertext rejected");
            };
            assert_eq!(opened, plaintext);

            if mask == 0 {
                return;
            }
            let index = position % ciphertext.len();
            ciphertext[index] ^= mask;
            assert_eq!(cipher.decrypt(&ciphertext), Err(ShieldError::AuthenticationFailed));
        },

        Scenario::AadMismatch { secret, plaintext, aad, other } => {
            let cipher = cipher(&secret, 2);
            let Ok(ciphertext) = cipher.encrypt_with_aad(&plaintext, &aad) else {
                return;
            };
            let result = cipher.decrypt_with_aad(&ciphertext, &other);
            if aad == other {
                assert_eq!(result.as_deref(), Ok(plaintext.as_slice()));
            } else {
                assert_eq!(result, Err(ShieldError::AuthenticationFailed));
            }
        },

        Scenario::Padding { secret, plaintext, block_size, min_padding } => {
            let policy = PaddingPolicy::new(usize::from(block_size), usize::from(min_padding));
            let Ok(policy) = policy else {
                assert!(block_size == 0 || min_padding == 0);
                return;
            };
            let cipher = cipher(&secret, 3).with_padding(policy);
            let Ok(ciphertext) = cipher.encrypt(&plaintext) else {
                return;
            };
            assert_eq!(Some(ciphertext.len()), cipher.ciphertext_len(plaintext.len()));
            assert_eq!(cipher.decrypt(&ciphertext).as_deref(), Ok(plaintext.as_slice()));
        },
    }
});
