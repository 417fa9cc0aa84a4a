//! Property-based tests for the cascading cipher
//!
//! These tests verify the fundamental invariants of the cascade:
//!
//! 1. **Round-trip**: decrypt(encrypt(p)) == p, with and without padding
//! 2. **Non-determinism**: the same plaintext never encrypts twice the same way
//! 3. **Tamper sensitivity**: any flipped byte fails authentication
//! 4. **Isolation**: keys and associated data do not cross over

use parking_lot::Mutex;
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use shield_crypto::{
    CascadeCipher, KemKeyPair, PaddingPolicy, PasswordKdfParams, RandomSource, ShieldError,
};

// Deterministic randomness for reproducible ciphertexts
struct TestRandom {
    rng: Mutex<ChaCha20Rng>,
}

impl TestRandom {
    fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }
}

impl RandomSource for TestRandom {
    fn fill_bytes(&self, buffer: &mut [u8]) -> shield_crypto::Result<()> {
        self.rng.lock().fill_bytes(buffer);
        Ok(())
    }
}

// Cheap Argon2id costs; the default costs are covered once below
const FAST_PARAMS: PasswordKdfParams =
    PasswordKdfParams { time_cost: 1, memory_kib: 64, parallelism: 1 };

fn cipher(secret: &[u8; 32], seed: u64) -> CascadeCipher<TestRandom> {
    CascadeCipher::from_raw_secret(secret, TestRandom::seeded(seed)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        secret in any::<[u8; 32]>(),
        seed in any::<u64>(),
    ) {
        let cipher = cipher(&secret, seed);
        let ciphertext = cipher.encrypt(&plaintext).unwrap();

        prop_assert_eq!(ciphertext.len(), plaintext.len() + cipher.overhead());
        prop_assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn prop_padded_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        block_size in 1usize..256,
        min_padding in 1usize..64,
    ) {
        let policy = PaddingPolicy::new(block_size, min_padding).unwrap();
        let cipher = cipher(&[3u8; 32], 7).with_padding(policy);
        let ciphertext = cipher.encrypt(&plaintext).unwrap();

        prop_assert_eq!(Some(ciphertext.len()), cipher.ciphertext_len(plaintext.len()));
        prop_assert!(ciphertext.len() >= plaintext.len() + cipher.overhead());
        prop_assert_eq!((ciphertext.len() - 57) % block_size, 0);
        prop_assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn prop_encryption_is_randomized(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        seed in any::<u64>(),
    ) {
        let cipher = cipher(&[5u8; 32], seed);
        let first = cipher.encrypt(&plaintext).unwrap();
        let second = cipher.encrypt(&plaintext).unwrap();

        prop_assert_ne!(&first, &second);
        prop_assert_eq!(cipher.decrypt(&first).unwrap(), plaintext.clone());
        prop_assert_eq!(cipher.decrypt(&second).unwrap(), plaintext);
    }

    #[test]
    fn prop_any_flipped_byte_fails(
        plaintext in prop::collection::vec(any::<u8>(), 0..128),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let cipher = cipher(&[9u8; 32], 1);
        let mut ciphertext = cipher.encrypt(&plaintext).unwrap();
        let position = index.index(ciphertext.len());
        ciphertext[position] ^= mask;

        prop_assert_eq!(cipher.decrypt(&ciphertext), Err(ShieldError::AuthenticationFailed));
    }

    #[test]
    fn prop_key_isolation(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        k1 in any::<[u8; 32]>(),
        k2 in any::<[u8; 32]>(),
    ) {
        prop_assume!(k1 != k2);

        let ciphertext = cipher(&k1, 1).encrypt(&plaintext).unwrap();
        prop_assert_eq!(cipher(&k2, 1).decrypt(&ciphertext), Err(ShieldError::AuthenticationFailed));
    }

    #[test]
    fn prop_aad_binding(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        aad in prop::collection::vec(any::<u8>(), 0..64),
        other in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(aad != other);

        let cipher = cipher(&[1u8; 32], 2);
        let ciphertext = cipher.encrypt_with_aad(&plaintext, &aad).unwrap();

        prop_assert_eq!(
            cipher.decrypt_with_aad(&ciphertext, &other),
            Err(ShieldError::AuthenticationFailed)
        );
        prop_assert_eq!(cipher.decrypt_with_aad(&ciphertext, &aad).unwrap(), plaintext);
    }

    #[test]
    fn prop_short_inputs_are_invalid(len in 0usize..57) {
        let cipher = cipher(&[1u8; 32], 2);
        prop_assert_eq!(
            cipher.decrypt(&vec![0u8; len]),
            Err(ShieldError::InvalidCiphertext { minimum: 57, actual: len })
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_password_determinism(
        password in prop::collection::vec(any::<u8>(), 1..32),
        other in prop::collection::vec(any::<u8>(), 1..32),
        plaintext in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        prop_assume!(password != other);

        let sealer =
            CascadeCipher::from_password_with_params(&password, &FAST_PARAMS, TestRandom::seeded(1))
                .unwrap();
        let ciphertext = sealer.encrypt(&plaintext).unwrap();

        // A fresh instance from the same password opens it
        let opener =
            CascadeCipher::from_password_with_params(&password, &FAST_PARAMS, TestRandom::seeded(2))
                .unwrap();
        prop_assert_eq!(opener.decrypt(&ciphertext).unwrap(), plaintext);

        let stranger =
            CascadeCipher::from_password_with_params(&other, &FAST_PARAMS, TestRandom::seeded(3))
                .unwrap();
        prop_assert_eq!(stranger.decrypt(&ciphertext), Err(ShieldError::AuthenticationFailed));
    }
}

#[test]
fn large_plaintext_roundtrip() {
    let cipher = cipher(&[0x5A; 32], 99);
    let mut plaintext = vec![0u8; (1 << 20) + 4099];
    TestRandom::seeded(100).fill_bytes(&mut plaintext).unwrap();

    let ciphertext = cipher.encrypt(&plaintext).unwrap();
    assert_eq!(ciphertext.len(), plaintext.len() + 57);
    assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
}

#[test]
fn empty_plaintext_roundtrip() {
    let cipher = cipher(&[0x11; 32], 5);
    let ciphertext = cipher.encrypt(b"").unwrap();

    assert_eq!(ciphertext.len(), cipher.overhead());
    assert!(cipher.decrypt(&ciphertext).unwrap().is_empty());
}

#[test]
fn default_password_costs_are_deterministic() {
    let sealer = CascadeCipher::from_password(b"correct horse", TestRandom::seeded(1)).unwrap();
    let opener = CascadeCipher::from_password(b"correct horse", TestRandom::seeded(2)).unwrap();

    let ciphertext = sealer.encrypt(b"vault entry").unwrap();
    assert_eq!(opener.decrypt(&ciphertext).unwrap(), b"vault entry");
}

#[test]
fn padding_hides_length_within_a_block() {
    let cipher = cipher(&[2u8; 32], 4).with_padding(PaddingPolicy::default());

    let short = cipher.encrypt(b"hi").unwrap();
    let longer = cipher.encrypt(&[0u8; 40]).unwrap();
    assert_eq!(short.len(), longer.len());
}

#[test]
fn degenerate_padding_policies_are_rejected() {
    assert_eq!(PaddingPolicy::new(0, 16), Err(ShieldError::InvalidPadding));
    assert_eq!(PaddingPolicy::new(64, 0), Err(ShieldError::InvalidPadding));
    assert_eq!(PaddingPolicy::new(64, usize::MAX), Err(ShieldError::InvalidPadding));
    assert_eq!(PaddingPolicy::new(usize::MAX / 2 + 2, 16), Err(ShieldError::InvalidPadding));
}

#[test]
fn block_aligned_plaintext_gets_random_fill() {
    let policy = PaddingPolicy::new(64, 1).unwrap();
    let cipher = cipher(&[2u8; 32], 4).with_padding(policy);

    // 4-byte length prefix plus 60 bytes is exactly one block
    let ciphertext = cipher.encrypt(&[0u8; 60]).unwrap();
    assert_eq!(ciphertext.len(), 57 + 128);
    assert_eq!(cipher.decrypt(&ciphertext).unwrap(), vec![0u8; 60]);
}

#[test]
fn padded_and_unpadded_do_not_mix() {
    let plain = cipher(&[2u8; 32], 4);
    let padded = cipher(&[2u8; 32], 4).with_padding(PaddingPolicy::default());

    let ciphertext = plain.encrypt(&[0u8; 100]).unwrap();
    assert_eq!(padded.decrypt(&ciphertext), Err(ShieldError::AuthenticationFailed));

    let ciphertext = padded.encrypt(&[0u8; 100]).unwrap();
    assert_eq!(plain.decrypt(&ciphertext), Err(ShieldError::AuthenticationFailed));
}

#[test]
fn kem_secret_drives_cipher() {
    let alice = KemKeyPair::generate(&TestRandom::seeded(10)).unwrap();
    let bob = KemKeyPair::generate(&TestRandom::seeded(11)).unwrap();

    let (ciphertext, _) = alice.encapsulate(&bob.public_bytes()).unwrap();
    let secret = bob.decapsulate(&ciphertext).unwrap();

    let message = b"hello quantum world";
    let sealed = CascadeCipher::from_raw_secret(secret.as_bytes(), TestRandom::seeded(12))
        .unwrap()
        .encrypt(message)
        .unwrap();
    let cipher = CascadeCipher::from_raw_secret(secret.as_bytes(), TestRandom::seeded(13)).unwrap();

    assert_eq!(cipher.decrypt(&sealed).unwrap(), message);
    assert_eq!(sealed.len(), message.len() + cipher.overhead());
}
