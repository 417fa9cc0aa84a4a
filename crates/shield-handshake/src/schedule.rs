//! Handshake key schedule.
//!
//! ```text
//! shared (KEM)
//!   ├── HKDF(info = "shield-hs-confirm" ‖ th3) → confirm key → ServerFinished
//!   └── HKDF(info = "shield-hs-session" ‖ th4) → session secret
//! ```
//!
//! `th3` covers `ClientHello`, `ServerHello` and `ClientFinished`; `th4` adds
//! `ServerFinished`.

use shield_crypto::{CascadeCipher, RandomSource, SharedSecret, kdf};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{error::HandshakeError, transcript::HASH_LEN};

/// Plaintext the responder encrypts to prove it holds the shared secret
pub(crate) const CONFIRMATION: &[u8] = b"shield-server-finished";

const INFO_CONFIRM: &[u8] = b"shield-hs-confirm";
const INFO_SESSION: &[u8] = b"shield-hs-session";

/// Cascade cipher keyed for the `ServerFinished` confirmation.
pub(crate) fn confirm_cipher<R: RandomSource>(
    shared: &SharedSecret,
    th3: &[u8; HASH_LEN],
    rng: R,
) -> Result<CascadeCipher<R>, HandshakeError> {
    let mut key = Zeroizing::new([0u8; 32]);
    kdf::derive_key_multi(shared.as_bytes(), &[INFO_CONFIRM, th3.as_slice()], key.as_mut_slice())?;
    Ok(CascadeCipher::from_raw_secret(key.as_slice(), rng)?)
}

/// Encrypt the confirmation with `th3` as associated data.
pub(crate) fn seal_confirmation<R: RandomSource>(
    shared: &SharedSecret,
    th3: &[u8; HASH_LEN],
    rng: R,
) -> Result<Vec<u8>, HandshakeError> {
    Ok(confirm_cipher(shared, th3, rng)?.encrypt_with_aad(CONFIRMATION, th3)?)
}

/// Check a received confirmation. Every failure is `ConfirmationFailed`.
pub(crate) fn open_confirmation<R: RandomSource>(
    shared: &SharedSecret,
    th3: &[u8; HASH_LEN],
    encrypted: &[u8],
    rng: R,
) -> Result<(), HandshakeError> {
    let cipher = confirm_cipher(shared, th3, rng)?;
    let Ok(opened) = cipher.decrypt_with_aad(encrypted, th3) else {
        return Err(HandshakeError::ConfirmationFailed);
    };

    if opened.len() == CONFIRMATION.len() && bool::from(opened.ct_eq(CONFIRMATION)) {
        Ok(())
    } else {
        Err(HandshakeError::ConfirmationFailed)
    }
}

/// Final session secret, bound to the full transcript.
pub(crate) fn session_secret(
    shared: &SharedSecret,
    th4: &[u8; HASH_LEN],
) -> Result<SharedSecret, HandshakeError> {
    let mut secret = Zeroizing::new([0u8; 32]);
    kdf::derive_key_multi(
        shared.as_bytes(),
        &[INFO_SESSION, th4.as_slice()],
        secret.as_mut_slice(),
    )?;
    Ok(SharedSecret::from_bytes(*secret))
}

#[cfg(test)]
mod tests {
    use shield_crypto::SeededRandom;

    use super::*;

    fn shared() -> SharedSecret {
        SharedSecret::from_bytes([0x5C; 32])
    }

    #[test]
    fn confirmation_roundtrip() {
        let th3 = [1u8; HASH_LEN];
        let sealed = seal_confirmation(&shared(), &th3, SeededRandom::new(1)).unwrap();
        open_confirmation(&shared(), &th3, &sealed, SeededRandom::new(2)).unwrap();
    }

    #[test]
    fn confirmation_bound_to_transcript() {
        let sealed = seal_confirmation(&shared(), &[1u8; HASH_LEN], SeededRandom::new(1)).unwrap();
        assert_eq!(
            open_confirmation(&shared(), &[2u8; HASH_LEN], &sealed, SeededRandom::new(2)),
            Err(HandshakeError::ConfirmationFailed)
        );
    }

    #[test]
    fn wrong_plaintext_is_rejected() {
        let th3 = [1u8; HASH_LEN];
        let cipher = confirm_cipher(&shared(), &th3, SeededRandom::new(1)).unwrap();
        let forged = cipher.encrypt_with_aad(b"something-else", &th3).unwrap();

        assert_eq!(
            open_confirmation(&shared(), &th3, &forged, SeededRandom::new(2)),
            Err(HandshakeError::ConfirmationFailed)
        );
    }

    #[test]
    fn short_confirmation_is_confirmation_failure() {
        assert_eq!(
            open_confirmation(&shared(), &[1u8; HASH_LEN], &[0u8; 3], SeededRandom::new(2)),
            Err(HandshakeError::ConfirmationFailed)
        );
    }

    #[test]
    fn session_secret_depends_on_transcript() {
        let a = session_secret(&shared(), &[1u8; HASH_LEN]).unwrap();
        let b = session_secret(&shared(), &[2u8; HASH_LEN]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, session_secret(&shared(), &[1u8; HASH_LEN]).unwrap());
    }
}
