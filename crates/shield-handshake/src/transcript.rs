//! Running SHA-512 hash over the handshake messages.
//!
//! Each message is absorbed as `len_be32 ‖ bytes` after a fixed domain label,
//! so no two distinct message sequences hash the same way. Snapshots never
//! consume the running state.

use sha2::{Digest, Sha512};

/// Transcript hash length
pub const HASH_LEN: usize = 64;

/// Domain label absorbed before the first message
const TRANSCRIPT_LABEL: &[u8] = b"shield-handshake-v1";

/// Ordered hash of every handshake message seen so far.
#[derive(Clone)]
pub struct Transcript {
    hasher: Sha512,
    messages: usize,
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript").field("messages", &self.messages).finish_non_exhaustive()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        let mut hasher = Sha512::new();
        hasher.update(TRANSCRIPT_LABEL);
        Self { hasher, messages: 0 }
    }

    /// Append one encoded message.
    pub fn absorb(&mut self, message: &[u8]) {
        absorb_into(&mut self.hasher, message);
        self.messages += 1;
    }

    /// Number of messages absorbed.
    pub fn len(&self) -> usize {
        self.messages
    }

    /// Returns true if nothing has been absorbed.
    pub fn is_empty(&self) -> bool {
        self.messages == 0
    }

    /// Hash of everything absorbed so far.
    pub fn hash(&self) -> [u8; HASH_LEN] {
        finish(self.hasher.clone())
    }

    /// Hash as if `pending` had been absorbed, without absorbing it.
    pub fn hash_with(&self, pending: &[u8]) -> [u8; HASH_LEN] {
        let mut hasher = self.hasher.clone();
        absorb_into(&mut hasher, pending);
        finish(hasher)
    }
}

fn absorb_into(hasher: &mut Sha512, message: &[u8]) {
    // Handshake messages are a few hundred bytes at most
    let len = u32::try_from(message.len()).unwrap_or(u32::MAX);
    hasher.update(len.to_be_bytes());
    hasher.update(message);
}

fn finish(hasher: Sha512) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}
