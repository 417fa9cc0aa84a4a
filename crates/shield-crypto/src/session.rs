//! Forward-secrecy messaging session.
//!
//! One shared secret becomes an unbounded sequence of single-use message keys
//! through a one-way HMAC ratchet:
//!
//! ```text
//! chain_key₀ = HKDF(secret, info = domain)
//!
//!   message_key = HMAC-SHA-256(chain_key, "message-key" ‖ counter_le)
//!   chain_key'  = HMAC-SHA-256(chain_key, "chain-key-next")
//!   counter'    = counter + 1
//! ```
//!
//! Every message key drives a fresh [`CascadeCipher`], so each message is
//! protected by both cascade layers. The old chain key is overwritten as soon
//! as the next one exists: compromising the current state reveals future keys
//! but never past ones.
//!
//! # Wire Format
//!
//! ```text
//! [counter: u64 LE][cascade ciphertext]
//! ```
//!
//! # Ordering
//!
//! A session has one chain and one counter. Both `encrypt` and `decrypt`
//! advance it, so a single instance only works for one direction of traffic
//! (or a strictly alternating pair). [`DuplexSession`] builds one session per
//! direction from the same secret.
//!
//! # Security Properties
//!
//! - Forward secrecy: chain keys are zeroized when replaced
//! - Key uniqueness: the counter is bound into every message key
//! - No skipping: a counter other than the expected one is rejected before the
//!   ratchet moves
//! - Forgery resistance: a message that fails authentication leaves the state
//!   untouched

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    cipher::CascadeCipher,
    error::{Result, ShieldError},
    kdf,
    random::{OsRandom, RandomSource},
};

type HmacSha256 = Hmac<Sha256>;

/// Length of the counter prefix on every session message
pub const COUNTER_LEN: usize = 8;

/// Shared secret length accepted by a session
pub const SECRET_LEN: usize = 32;

/// Default domain tag for the root chain key
pub const DEFAULT_DOMAIN: &[u8] = b"shield-session-v1";

/// Domain tag for the initiator-to-responder chain
pub const DOMAIN_INITIATOR_TO_RESPONDER: &[u8] = b"shield-session-i2r";

/// Domain tag for the responder-to-initiator chain
pub const DOMAIN_RESPONDER_TO_INITIATOR: &[u8] = b"shield-session-r2i";

/// Label for deriving a message key
const MESSAGE_KEY_LABEL: &[u8] = b"message-key";

/// Label for deriving the next chain key
const CHAIN_KEY_LABEL: &[u8] = b"chain-key-next";

/// Ratchet position. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct ChainState {
    chain_key: [u8; 32],
    counter: u64,
}

impl ChainState {
    fn message_key(&self) -> Zeroizing<[u8; 32]> {
        self.mac(&[MESSAGE_KEY_LABEL, self.counter.to_le_bytes().as_slice()])
    }

    /// Replace the chain key with its successor and bump the counter.
    fn advance(&mut self) {
        let next = self.mac(&[CHAIN_KEY_LABEL]);
        self.chain_key.zeroize();
        self.chain_key = *next;
        self.counter = self.counter.wrapping_add(1);
    }

    fn mac(&self, parts: &[&[u8]]) -> Zeroizing<[u8; 32]> {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.chain_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        for part in parts {
            mac.update(part);
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&mac.finalize().into_bytes());
        key
    }
}

/// Forward-secrecy session over one ratchet chain.
///
/// The ratchet state sits behind a mutex held across the whole
/// derive-encrypt-advance sequence, so concurrent callers serialize and no
/// two messages ever share a key.
pub struct Session<R: RandomSource = OsRandom> {
    state: Mutex<ChainState>,
    rng: R,
}

impl<R: RandomSource> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("counter", &self.counter()).finish_non_exhaustive()
    }
}

impl<R: RandomSource> Session<R> {
    /// Start a session under the default domain tag.
    ///
    /// # Errors
    ///
    /// `InvalidKeyLength` if `shared_secret` is not 32 bytes.
    pub fn new(shared_secret: &[u8], rng: R) -> Result<Self> {
        Self::with_domain(shared_secret, DEFAULT_DOMAIN, rng)
    }

    /// Start a session whose root chain key is bound to `domain`.
    ///
    /// Sessions built from one secret under different domains share no keys.
    pub fn with_domain(shared_secret: &[u8], domain: &[u8], rng: R) -> Result<Self> {
        if shared_secret.len() != SECRET_LEN {
            return Err(ShieldError::InvalidKeyLength {
                expected: SECRET_LEN,
                actual: shared_secret.len(),
            });
        }

        let root = kdf::derive_key_array::<32>(shared_secret, domain)?;
        let state = ChainState { chain_key: *root, counter: 0 };
        Ok(Self { state: Mutex::new(state), rng })
    }

    /// Counter of the next message to send or receive.
    pub fn counter(&self) -> u64 {
        self.state.lock().counter
    }

    /// Encrypt the next message.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    /// Encrypt the next message, binding `aad` on both cascade layers.
    ///
    /// # Errors
    ///
    /// - `CounterExhausted` once the counter reaches `u64::MAX`
    /// - any cascade encryption error; the ratchet does not advance
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let counter = state.counter;
        if counter == u64::MAX {
            return Err(ShieldError::CounterExhausted);
        }

        let message_key = state.message_key();
        let cipher = CascadeCipher::from_raw_secret(message_key.as_slice(), &self.rng)?;
        let body = cipher.encrypt_with_aad(plaintext, aad)?;
        state.advance();
        drop(state);

        tracing::debug!(counter, "session message sealed");

        let mut message = Vec::with_capacity(COUNTER_LEN + body.len());
        message.extend_from_slice(&counter.to_le_bytes());
        message.extend_from_slice(&body);
        Ok(message)
    }

    /// Decrypt the next message.
    pub fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(message, &[])
    }

    /// Decrypt the next message with associated data.
    ///
    /// The embedded counter must equal [`counter`](Self::counter). Replays and
    /// gaps are both rejected before the ratchet moves.
    ///
    /// # Errors
    ///
    /// - `InvalidCiphertext` if the message is shorter than the counter prefix
    /// - `CounterExhausted` once the counter reaches `u64::MAX`
    /// - `OutOfOrder` if the counter does not match
    /// - `AuthenticationFailed` on tamper, wrong key or wrong AAD
    pub fn decrypt_with_aad(&self, message: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let Some((prefix, body)) = message.split_first_chunk::<COUNTER_LEN>() else {
            return Err(ShieldError::InvalidCiphertext {
                minimum: COUNTER_LEN,
                actual: message.len(),
            });
        };
        let received = u64::from_le_bytes(*prefix);

        let mut state = self.state.lock();
        let expected = state.counter;
        if expected == u64::MAX {
            return Err(ShieldError::CounterExhausted);
        }
        if received != expected {
            tracing::warn!(expected, received, "session message out of order");
            return Err(ShieldError::OutOfOrder { expected, received });
        }

        let message_key = state.message_key();
        let cipher = CascadeCipher::from_raw_secret(message_key.as_slice(), &self.rng)?;
        let plaintext = cipher.decrypt_with_aad(body, aad).inspect_err(|_| {
            tracing::warn!(counter = expected, "session message rejected");
        })?;
        state.advance();
        drop(state);

        tracing::debug!(counter = expected, "session message opened");
        Ok(plaintext)
    }

    #[cfg(test)]
    fn set_counter(&self, counter: u64) {
        self.state.lock().counter = counter;
    }
}

/// Side of a two-party exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The party that sent the first handshake message
    Initiator,
    /// The party that answered it
    Responder,
}

impl Role {
    /// The other side.
    pub fn peer(self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }
}

/// Two sessions from one secret: one chain per direction.
///
/// The initiator sends on `shield-session-i2r` and receives on
/// `shield-session-r2i`; the responder does the opposite. Both sides can send
/// concurrently without desynchronising.
pub struct DuplexSession<R: RandomSource = OsRandom> {
    role: Role,
    send: Session<R>,
    receive: Session<R>,
}

impl<R: RandomSource> std::fmt::Debug for DuplexSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexSession")
            .field("role", &self.role)
            .field("send", &self.send)
            .field("receive", &self.receive)
            .finish()
    }
}

impl<R: RandomSource + Clone> DuplexSession<R> {
    /// Build both directional sessions for `role`.
    pub fn new(shared_secret: &[u8], role: Role, rng: R) -> Result<Self> {
        let (send_domain, receive_domain) = match role {
            Role::Initiator => (DOMAIN_INITIATOR_TO_RESPONDER, DOMAIN_RESPONDER_TO_INITIATOR),
            Role::Responder => (DOMAIN_RESPONDER_TO_INITIATOR, DOMAIN_INITIATOR_TO_RESPONDER),
        };

        Ok(Self {
            role,
            send: Session::with_domain(shared_secret, send_domain, rng.clone())?,
            receive: Session::with_domain(shared_secret, receive_domain, rng)?,
        })
    }
}

impl<R: RandomSource> DuplexSession<R> {
    /// This side's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Counter of the next outgoing message.
    pub fn send_counter(&self) -> u64 {
        self.send.counter()
    }

    /// Counter of the next expected incoming message.
    pub fn receive_counter(&self) -> u64 {
        self.receive.counter()
    }

    /// Encrypt on the outgoing chain.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.send.encrypt(plaintext)
    }

    /// Encrypt on the outgoing chain with associated data.
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.send.encrypt_with_aad(plaintext, aad)
    }

    /// Decrypt from the incoming chain.
    pub fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.receive.decrypt(message)
    }

    /// Decrypt from the incoming chain with associated data.
    pub fn decrypt_with_aad(&self, message: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.receive.decrypt_with_aad(message, aad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;

    const SECRET: [u8; 32] = [0x42; 32];

    fn pair() -> (Session<SeededRandom>, Session<SeededRandom>) {
        let sender = Session::new(&SECRET, SeededRandom::new(1)).unwrap();
        let receiver = Session::new(&SECRET, SeededRandom::new(2)).unwrap();
        (sender, receiver)
    }

    #[test]
    fn in_order_messages_roundtrip() {
        let (sender, receiver) = pair();

        for i in 0..5u8 {
            let message = sender.encrypt(&[i; 10]).unwrap();
            assert_eq!(receiver.decrypt(&message).unwrap(), vec![i; 10]);
        }
        assert_eq!(sender.counter(), 5);
        assert_eq!(receiver.counter(), 5);
    }

    #[test]
    fn counter_prefix_is_little_endian() {
        let (sender, _) = pair();
        let first = sender.encrypt(b"a").unwrap();
        let second = sender.encrypt(b"b").unwrap();

        assert_eq!(&first[..COUNTER_LEN], &0u64.to_le_bytes());
        assert_eq!(&second[..COUNTER_LEN], &1u64.to_le_bytes());
        assert_eq!(first.len(), COUNTER_LEN + 1 + 57);
    }

    #[test]
    fn skipped_message_is_out_of_order() {
        let (sender, receiver) = pair();
        let m0 = sender.encrypt(b"zero").unwrap();
        let m1 = sender.encrypt(b"one").unwrap();
        let m2 = sender.encrypt(b"two").unwrap();

        receiver.decrypt(&m0).unwrap();
        assert_eq!(
            receiver.decrypt(&m2).err(),
            Some(ShieldError::OutOfOrder { expected: 1, received: 2 })
        );

        // State untouched, the right message still decrypts
        assert_eq!(receiver.counter(), 1);
        assert_eq!(receiver.decrypt(&m1).unwrap(), b"one");
        assert_eq!(receiver.decrypt(&m2).unwrap(), b"two");
    }

    #[test]
    fn replay_is_out_of_order() {
        let (sender, receiver) = pair();
        let m0 = sender.encrypt(b"zero").unwrap();

        receiver.decrypt(&m0).unwrap();
        assert_eq!(
            receiver.decrypt(&m0).err(),
            Some(ShieldError::OutOfOrder { expected: 1, received: 0 })
        );
    }

    #[test]
    fn forged_message_does_not_advance() {
        let (sender, receiver) = pair();
        let message = sender.encrypt(b"genuine").unwrap();

        let mut forged = message.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0x01;

        assert_eq!(receiver.decrypt(&forged).err(), Some(ShieldError::AuthenticationFailed));
        assert_eq!(receiver.counter(), 0);
        assert_eq!(receiver.decrypt(&message).unwrap(), b"genuine");
    }

    #[test]
    fn short_message_is_invalid() {
        let (_, receiver) = pair();
        assert_eq!(
            receiver.decrypt(&[0u8; 7]).err(),
            Some(ShieldError::InvalidCiphertext { minimum: COUNTER_LEN, actual: 7 })
        );
    }

    #[test]
    fn same_plaintext_gives_distinct_ciphertexts() {
        let (sender, _) = pair();
        let a = sender.encrypt(b"same").unwrap();
        let b = sender.encrypt(b"same").unwrap();
        let c = sender.encrypt(b"same").unwrap();

        assert_ne!(a[COUNTER_LEN..], b[COUNTER_LEN..]);
        assert_ne!(b[COUNTER_LEN..], c[COUNTER_LEN..]);
        assert_ne!(a[COUNTER_LEN..], c[COUNTER_LEN..]);
    }

    #[test]
    fn message_keys_differ_per_counter() {
        // A body sealed at counter 0 cannot be opened with the counter-1 key
        let (sender, _) = pair();
        let m0 = sender.encrypt(b"zero").unwrap();

        let root = kdf::derive_key_array::<32>(&SECRET, DEFAULT_DOMAIN).unwrap();
        let state = ChainState { chain_key: *root, counter: 0 };
        let mut later = ChainState { chain_key: *root, counter: 0 };
        later.advance();

        let rng = SeededRandom::new(9);
        let right = CascadeCipher::from_raw_secret(state.message_key().as_slice(), &rng).unwrap();
        let wrong = CascadeCipher::from_raw_secret(later.message_key().as_slice(), &rng).unwrap();

        let body = &m0[COUNTER_LEN..];
        assert_eq!(right.decrypt(body).unwrap(), b"zero");
        assert_eq!(wrong.decrypt(body).err(), Some(ShieldError::AuthenticationFailed));
    }

    #[test]
    fn advance_replaces_chain_key() {
        let mut state = ChainState { chain_key: [7u8; 32], counter: 0 };
        let before = state.chain_key;
        state.advance();

        assert_ne!(state.chain_key, before);
        assert_eq!(state.counter, 1);
    }

    #[test]
    fn different_domains_do_not_interoperate() {
        let sender = Session::with_domain(&SECRET, b"app-a", SeededRandom::new(1)).unwrap();
        let receiver = Session::with_domain(&SECRET, b"app-b", SeededRandom::new(2)).unwrap();

        let message = sender.encrypt(b"hello").unwrap();
        assert_eq!(receiver.decrypt(&message).err(), Some(ShieldError::AuthenticationFailed));
    }

    #[test]
    fn aad_is_bound() {
        let (sender, receiver) = pair();
        let message = sender.encrypt_with_aad(b"payload", b"header").unwrap();

        assert_eq!(
            receiver.decrypt_with_aad(&message, b"other").err(),
            Some(ShieldError::AuthenticationFailed)
        );
        assert_eq!(receiver.decrypt_with_aad(&message, b"header").unwrap(), b"payload");
    }

    #[test]
    fn wrong_secret_length_is_rejected() {
        assert_eq!(
            Session::new(&[0u8; 16], SeededRandom::new(1)).err(),
            Some(ShieldError::InvalidKeyLength { expected: 32, actual: 16 })
        );
    }

    #[test]
    fn exhausted_counter_is_rejected() {
        let (sender, receiver) = pair();
        sender.set_counter(u64::MAX);
        receiver.set_counter(u64::MAX);

        assert_eq!(sender.encrypt(b"x").err(), Some(ShieldError::CounterExhausted));

        let mut message = u64::MAX.to_le_bytes().to_vec();
        message.extend_from_slice(&[0u8; 57]);
        assert_eq!(receiver.decrypt(&message).err(), Some(ShieldError::CounterExhausted));
    }

    #[test]
    fn last_counter_is_usable() {
        let (sender, receiver) = pair();
        sender.set_counter(u64::MAX - 1);
        receiver.set_counter(u64::MAX - 1);

        let message = sender.encrypt(b"final").unwrap();
        assert_eq!(receiver.decrypt(&message).unwrap(), b"final");
        assert_eq!(sender.encrypt(b"x").err(), Some(ShieldError::CounterExhausted));
    }

    #[test]
    fn duplex_directions_are_independent() {
        let rng = std::sync::Arc::new(SeededRandom::new(11));
        let initiator = DuplexSession::new(&SECRET, Role::Initiator, rng.clone()).unwrap();
        let responder = DuplexSession::new(&SECRET, Role::Responder, rng).unwrap();

        // Both sides send before either receives
        let from_initiator = initiator.encrypt(b"ping").unwrap();
        let from_responder = responder.encrypt(b"pong").unwrap();

        assert_eq!(responder.decrypt(&from_initiator).unwrap(), b"ping");
        assert_eq!(initiator.decrypt(&from_responder).unwrap(), b"pong");
        assert_eq!(initiator.send_counter(), 1);
        assert_eq!(initiator.receive_counter(), 1);
    }

    #[test]
    fn duplex_rejects_own_messages() {
        let initiator = DuplexSession::new(&SECRET, Role::Initiator, OsRandom).unwrap();
        let echoed = initiator.encrypt(b"loop").unwrap();
        assert_eq!(initiator.decrypt(&echoed).err(), Some(ShieldError::AuthenticationFailed));
    }

    #[test]
    fn role_peer_flips() {
        assert_eq!(Role::Initiator.peer(), Role::Responder);
        assert_eq!(Role::Responder.peer(), Role::Initiator);
    }
}
