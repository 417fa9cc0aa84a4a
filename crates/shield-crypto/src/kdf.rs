//! Key derivation: HKDF-SHA-512 for high-entropy secrets, Argon2id for
//! passwords.
//!
//! The two paths are never interchangeable. HKDF assumes its input is
//! already uniformly random (a DH output, a ratchet key); Argon2id is the only
//! path that may see user-chosen secrets.
//!
//! # Domain separation
//!
//! Every HKDF call uses the library salt [`LIBRARY_SALT`] and a
//! purpose-specific `info` string. Two keys derived from the same secret with
//! different `info` strings are independent.
//!
//! # Deterministic password salt
//!
//! [`derive_password_keys`] derives its Argon2 salt from the password itself
//! (HMAC-SHA-512 under a fixed key), so a password reproduces the same keys
//! without a stored salt. This makes identical passwords produce identical
//! keys across users and enables precomputation against common passwords. A
//! weak password remains weak. Whenever a random salt can be generated and
//! stored, use [`derive_password_keys_with_salt`] with [`generate_salt`].

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::{
    error::{Result, ShieldError},
    random::RandomSource,
};

type HmacSha512 = Hmac<Sha512>;

/// HKDF salt shared by every derivation in this library
pub const LIBRARY_SALT: &[u8] = b"shield-v1";

/// Info for the inner (AES-256-GCM) cascade key
pub const INFO_INNER_LAYER: &[u8] = b"shield-aes";

/// Info for the outer (ChaCha20-Poly1305) cascade key
pub const INFO_OUTER_LAYER: &[u8] = b"shield-chacha";

/// SHA-512 output length
pub const HASH_LEN: usize = 64;

/// Largest HKDF-SHA-512 expansion (255 blocks)
pub const MAX_OUTPUT_LEN: usize = 255 * HASH_LEN;

/// Argon2id output length, split into two 32-byte layer keys
pub const PASSWORD_OUTPUT_LEN: usize = 64;

/// Shortest salt accepted by [`derive_password_keys_with_salt`]
pub const MIN_SALT_LEN: usize = 8;

/// Key for the keyed hash that turns a password into its own salt
const PASSWORD_SALT_KEY: &[u8] = b"shield-password-salt-v1";

/// Length of the password-derived salt
const PASSWORD_SALT_LEN: usize = 32;

/// Argon2id cost parameters.
///
/// Defaults are time cost 3, 19 MiB, single lane. One lane keeps the
/// derivation identical on WASM and embedded targets without threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordKdfParams {
    /// Number of passes over memory
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_kib: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for PasswordKdfParams {
    fn default() -> Self {
        Self { time_cost: 3, memory_kib: 19 * 1024, parallelism: 1 }
    }
}

/// Two independent layer keys derived from a password.
#[derive(ZeroizeOnDrop)]
pub struct PasswordKeys {
    inner: [u8; 32],
    outer: [u8; 32],
}

impl PasswordKeys {
    /// Key for the inner cascade layer (first half of the Argon2 output).
    pub fn inner(&self) -> &[u8; 32] {
        &self.inner
    }

    /// Key for the outer cascade layer (second half of the Argon2 output).
    pub fn outer(&self) -> &[u8; 32] {
        &self.outer
    }
}

/// Derive `len` bytes from a high-entropy secret.
///
/// # Errors
///
/// - `LengthExceeded` if `len` exceeds [`MAX_OUTPUT_LEN`]
pub fn derive_key(secret: &[u8], info: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut okm = Zeroizing::new(vec![0u8; len]);
    derive_key_multi(secret, &[info], &mut okm)?;
    Ok(okm)
}

/// Derive a fixed-size key from a high-entropy secret.
pub fn derive_key_array<const N: usize>(secret: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; N]>> {
    let mut okm = Zeroizing::new([0u8; N]);
    derive_key_multi(secret, &[info], okm.as_mut_slice())?;
    Ok(okm)
}

/// Derive into `out` with an `info` formed by concatenating `info_parts`.
///
/// Equivalent to [`derive_key`] with the parts joined, without building the
/// joined buffer.
pub fn derive_key_multi(secret: &[u8], info_parts: &[&[u8]], out: &mut [u8]) -> Result<()> {
    if out.len() > MAX_OUTPUT_LEN {
        return Err(ShieldError::LengthExceeded { requested: out.len(), limit: MAX_OUTPUT_LEN });
    }

    let hkdf = Hkdf::<Sha512>::new(Some(LIBRARY_SALT), secret);
    hkdf.expand_multi_info(info_parts, out).map_err(|e| ShieldError::KeyDerivationFailed {
        reason: e.to_string(),
    })
}

/// Derive both layer keys from a password with a password-derived salt.
///
/// Same password, same keys. See the module docs for why this is weaker than
/// a random salt.
pub fn derive_password_keys(password: &[u8], params: &PasswordKdfParams) -> Result<PasswordKeys> {
    let salt = password_salt(password);
    derive_password_keys_with_salt(password, salt.as_slice(), params)
}

/// Derive both layer keys from a password and a caller-held salt.
///
/// # Errors
///
/// - `KeyDerivationFailed` for an empty password or invalid cost parameters
/// - `InvalidKeyLength` if `salt` is shorter than [`MIN_SALT_LEN`]
pub fn derive_password_keys_with_salt(
    password: &[u8],
    salt: &[u8],
    params: &PasswordKdfParams,
) -> Result<PasswordKeys> {
    if password.is_empty() {
        return Err(ShieldError::KeyDerivationFailed { reason: "empty password".to_string() });
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(ShieldError::InvalidKeyLength { expected: MIN_SALT_LEN, actual: salt.len() });
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(PASSWORD_OUTPUT_LEN),
    )
    .map_err(|e| ShieldError::KeyDerivationFailed { reason: e.to_string() })?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut okm = Zeroizing::new([0u8; PASSWORD_OUTPUT_LEN]);
    argon
        .hash_password_into(password, salt, okm.as_mut_slice())
        .map_err(|e| ShieldError::KeyDerivationFailed { reason: e.to_string() })?;

    let mut keys = PasswordKeys { inner: [0u8; 32], outer: [0u8; 32] };
    keys.inner.copy_from_slice(&okm[..32]);
    keys.outer.copy_from_slice(&okm[32..]);
    Ok(keys)
}

/// Generate `len` random salt bytes.
pub fn generate_salt(rng: &impl RandomSource, len: usize) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; len];
    rng.fill_bytes(&mut salt)?;
    Ok(salt)
}

/// Keyed hash of the password, used as its deterministic Argon2 salt.
fn password_salt(password: &[u8]) -> Zeroizing<[u8; PASSWORD_SALT_LEN]> {
    let Ok(mut mac) = HmacSha512::new_from_slice(PASSWORD_SALT_KEY) else {
        unreachable!("HMAC-SHA-512 accepts any key size");
    };
    mac.update(password);
    let digest = mac.finalize().into_bytes();

    let mut salt = Zeroizing::new([0u8; PASSWORD_SALT_LEN]);
    salt.copy_from_slice(&digest[..PASSWORD_SALT_LEN]);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;

    // Cheap parameters so unit tests stay fast
    const FAST: PasswordKdfParams = PasswordKdfParams { time_cost: 1, memory_kib: 64, parallelism: 1 };

    #[test]
    fn derive_is_deterministic() {
        let secret = b"high_entropy_secret_material____";
        let a = derive_key(secret, b"ctx", 32).unwrap();
        let b = derive_key(secret, b"ctx", 32).unwrap();
        assert_eq!(*a, *b, "same inputs must produce same output");
    }

    #[test]
    fn different_info_produces_independent_keys() {
        let secret = [7u8; 32];
        let inner = derive_key_array::<32>(&secret, INFO_INNER_LAYER).unwrap();
        let outer = derive_key_array::<32>(&secret, INFO_OUTER_LAYER).unwrap();
        assert_ne!(*inner, *outer);
    }

    #[test]
    fn different_secrets_produce_different_keys() {
        let a = derive_key_array::<32>(&[1u8; 32], b"ctx").unwrap();
        let b = derive_key_array::<32>(&[2u8; 32], b"ctx").unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn requested_length_is_honoured() {
        assert_eq!(derive_key(&[0u8; 32], b"ctx", 0).unwrap().len(), 0);
        assert_eq!(derive_key(&[0u8; 32], b"ctx", 100).unwrap().len(), 100);
    }

    #[test]
    fn shorter_output_is_prefix_of_longer() {
        let short = derive_key(&[9u8; 32], b"ctx", 16).unwrap();
        let long = derive_key(&[9u8; 32], b"ctx", 64).unwrap();
        assert_eq!(&short[..], &long[..16]);
    }

    #[test]
    fn maximum_length_is_accepted() {
        let okm = derive_key(&[3u8; 32], b"ctx", MAX_OUTPUT_LEN).unwrap();
        assert_eq!(okm.len(), MAX_OUTPUT_LEN);
    }

    #[test]
    fn length_beyond_expansion_limit_is_rejected() {
        let result = derive_key(&[3u8; 32], b"ctx", MAX_OUTPUT_LEN + 1);
        assert_eq!(
            result.err(),
            Some(ShieldError::LengthExceeded { requested: 16_321, limit: 16_320 })
        );

        let mut out = vec![0u8; MAX_OUTPUT_LEN + 64];
        assert_eq!(
            derive_key_multi(&[3u8; 32], &[b"a".as_slice(), b"b"], &mut out),
            Err(ShieldError::LengthExceeded {
                requested: MAX_OUTPUT_LEN + 64,
                limit: MAX_OUTPUT_LEN,
            })
        );
    }

    #[test]
    fn multi_info_matches_concatenated_info() {
        let secret = [5u8; 32];
        let joined = derive_key(&secret, b"shield-kem-v1abc", 32).unwrap();

        let mut split = [0u8; 32];
        derive_key_multi(&secret, &[b"shield-kem-v1".as_slice(), b"a", b"bc"], &mut split).unwrap();

        assert_eq!(&joined[..], &split);
    }

    #[test]
    fn password_keys_are_deterministic() {
        let a = derive_password_keys(b"correct horse", &FAST).unwrap();
        let b = derive_password_keys(b"correct horse", &FAST).unwrap();
        assert_eq!(a.inner(), b.inner());
        assert_eq!(a.outer(), b.outer());
    }

    #[test]
    fn password_halves_differ() {
        let keys = derive_password_keys(b"correct horse", &FAST).unwrap();
        assert_ne!(keys.inner(), keys.outer());
    }

    #[test]
    fn different_passwords_produce_different_keys() {
        let a = derive_password_keys(b"password one", &FAST).unwrap();
        let b = derive_password_keys(b"password two", &FAST).unwrap();
        assert_ne!(a.inner(), b.inner());
        assert_ne!(a.outer(), b.outer());
    }

    #[test]
    fn random_salt_changes_keys() {
        let rng = SeededRandom::new(11);
        let salt_a = generate_salt(&rng, 16).unwrap();
        let salt_b = generate_salt(&rng, 16).unwrap();

        let a = derive_password_keys_with_salt(b"pw", &salt_a, &FAST).unwrap();
        let b = derive_password_keys_with_salt(b"pw", &salt_b, &FAST).unwrap();
        assert_ne!(a.inner(), b.inner());
    }

    #[test]
    fn empty_password_is_rejected() {
        let result = derive_password_keys(b"", &FAST);
        assert!(matches!(result, Err(ShieldError::KeyDerivationFailed { .. })));
    }

    #[test]
    fn short_salt_is_rejected() {
        let result = derive_password_keys_with_salt(b"pw", &[0u8; 4], &FAST);
        assert_eq!(result.err(), Some(ShieldError::InvalidKeyLength { expected: 8, actual: 4 }));
    }

    #[test]
    fn invalid_cost_parameters_are_rejected() {
        let params = PasswordKdfParams { time_cost: 0, ..FAST };
        let result = derive_password_keys(b"pw", &params);
        assert!(matches!(result, Err(ShieldError::KeyDerivationFailed { .. })));
    }

    #[test]
    fn default_parameters_match_documented_costs() {
        let params = PasswordKdfParams::default();
        assert_eq!(params.time_cost, 3);
        assert_eq!(params.memory_kib, 19_456);
        assert_eq!(params.parallelism, 1);
    }

    #[test]
    fn generate_salt_has_requested_length() {
        let salt = generate_salt(&SeededRandom::new(0), 24).unwrap();
        assert_eq!(salt.len(), 24);
    }
}
