//! Handshake message shapes and their wire codec.
//!
//! Every message starts with a one-byte [`MessageType`]. Hello messages carry
//! the protocol version next. All fields are fixed-size except the
//! confirmation ciphertext, which runs to the end of the message.
//!
//! ```text
//! ClientHello    [0x01][ver][kem_public:32][sign_public:32][nonce:32]
//! ServerHello    [0x02][ver][kem_ciphertext:32][sign_public:32][signature:64][nonce:32]
//! ClientFinished [0x03][signature:64]
//! ServerFinished [0x04][encrypted_confirmation:..]
//! ```
//!
//! # Security
//!
//! Decoding is structural only: lengths and type bytes. Versions, signatures
//! and the confirmation are checked by the state machines.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::HandshakeError;

/// Protocol version carried in hello messages
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Nonce length in hello messages
pub const NONCE_LEN: usize = 32;

const KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Handshake message discriminant (first byte on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Initiator's opening message
    ClientHello = 0x01,
    /// Responder's signed KEM answer
    ServerHello = 0x02,
    /// Initiator's transcript signature
    ClientFinished = 0x03,
    /// Responder's key confirmation
    ServerFinished = 0x04,
}

impl MessageType {
    /// Parse a type byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ClientHello),
            0x02 => Some(Self::ServerHello),
            0x03 => Some(Self::ClientFinished),
            0x04 => Some(Self::ServerFinished),
            _ => None,
        }
    }

    /// Wire byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Initiator's opening message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Protocol version
    pub version: u8,
    /// Ephemeral X25519 public key to encapsulate to
    pub kem_public: [u8; KEY_LEN],
    /// Initiator's Ed25519 identity key
    pub sign_public: [u8; KEY_LEN],
    /// Fresh random nonce
    pub nonce: [u8; NONCE_LEN],
}

impl ClientHello {
    /// Encoded size
    pub const SIZE: usize = 2 + KEY_LEN + KEY_LEN + NONCE_LEN;
}

/// Responder's answer: KEM ciphertext signed over the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Protocol version
    pub version: u8,
    /// X25519 KEM ciphertext (the responder's ephemeral public point)
    pub kem_ciphertext: [u8; KEY_LEN],
    /// Responder's Ed25519 identity key
    pub sign_public: [u8; KEY_LEN],
    /// Signature over `SHA-512(transcript ‖ unsigned ServerHello)`
    pub signature: [u8; SIGNATURE_LEN],
    /// Fresh random nonce
    pub nonce: [u8; NONCE_LEN],
}

impl ServerHello {
    /// Encoded size
    pub const SIZE: usize = 2 + KEY_LEN + KEY_LEN + SIGNATURE_LEN + NONCE_LEN;

    /// Encoding with the signature field omitted: the bytes the signature
    /// covers together with the preceding transcript.
    pub fn unsigned_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE - SIGNATURE_LEN);
        buf.put_u8(MessageType::ServerHello.to_u8());
        buf.put_u8(self.version);
        buf.put_slice(&self.kem_ciphertext);
        buf.put_slice(&self.sign_public);
        buf.put_slice(&self.nonce);
        buf.freeze()
    }
}

/// Initiator's signature over the transcript through `ServerHello`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFinished {
    /// Ed25519 signature
    pub signature: [u8; SIGNATURE_LEN],
}

impl ClientFinished {
    /// Encoded size
    pub const SIZE: usize = 1 + SIGNATURE_LEN;
}

/// Responder's key confirmation: a cascade ciphertext under the confirm key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFinished {
    /// Encrypted confirmation string
    pub encrypted_confirmation: Bytes,
}

/// Any handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// See [`ClientHello`]
    ClientHello(ClientHello),
    /// See [`ServerHello`]
    ServerHello(ServerHello),
    /// See [`ClientFinished`]
    ClientFinished(ClientFinished),
    /// See [`ServerFinished`]
    ServerFinished(ServerFinished),
}

impl HandshakeMessage {
    /// Discriminant of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ClientHello(_) => MessageType::ClientHello,
            Self::ServerHello(_) => MessageType::ServerHello,
            Self::ClientFinished(_) => MessageType::ClientFinished,
            Self::ServerFinished(_) => MessageType::ServerFinished,
        }
    }

    /// Encoded length.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::ClientHello(_) => ClientHello::SIZE,
            Self::ServerHello(_) => ServerHello::SIZE,
            Self::ClientFinished(_) => ClientFinished::SIZE,
            Self::ServerFinished(m) => 1 + m.encrypted_confirmation.len(),
        }
    }

    /// Encode into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.message_type().to_u8());
        match self {
            Self::ClientHello(m) => {
                dst.put_u8(m.version);
                dst.put_slice(&m.kem_public);
                dst.put_slice(&m.sign_public);
                dst.put_slice(&m.nonce);
            },
            Self::ServerHello(m) => {
                dst.put_u8(m.version);
                dst.put_slice(&m.kem_ciphertext);
                dst.put_slice(&m.sign_public);
                dst.put_slice(&m.signature);
                dst.put_slice(&m.nonce);
            },
            Self::ClientFinished(m) => dst.put_slice(&m.signature),
            Self::ServerFinished(m) => dst.put_slice(&m.encrypted_confirmation),
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one complete message.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::Malformed` for an empty input, an unknown type byte,
    ///   a length that does not match the type, or an empty confirmation
    pub fn decode(bytes: &[u8]) -> Result<Self, HandshakeError> {
        let Some((&type_byte, mut body)) = bytes.split_first() else {
            return Err(malformed("empty message"));
        };
        let Some(message_type) = MessageType::from_u8(type_byte) else {
            return Err(malformed(format!("unknown message type {type_byte:#04x}")));
        };

        match message_type {
            MessageType::ClientHello => {
                expect_len(message_type, bytes.len(), ClientHello::SIZE)?;
                Ok(Self::ClientHello(ClientHello {
                    version: body.get_u8(),
                    kem_public: take(&mut body),
                    sign_public: take(&mut body),
                    nonce: take(&mut body),
                }))
            },
            MessageType::ServerHello => {
                expect_len(message_type, bytes.len(), ServerHello::SIZE)?;
                Ok(Self::ServerHello(ServerHello {
                    version: body.get_u8(),
                    kem_ciphertext: take(&mut body),
                    sign_public: take(&mut body),
                    signature: take(&mut body),
                    nonce: take(&mut body),
                }))
            },
            MessageType::ClientFinished => {
                expect_len(message_type, bytes.len(), ClientFinished::SIZE)?;
                Ok(Self::ClientFinished(ClientFinished { signature: take(&mut body) }))
            },
            MessageType::ServerFinished => {
                if body.is_empty() {
                    return Err(malformed("empty confirmation"));
                }
                Ok(Self::ServerFinished(ServerFinished {
                    encrypted_confirmation: Bytes::copy_from_slice(body),
                }))
            },
        }
    }
}

/// Read a fixed-size field. Callers check the total length first.
fn take<const N: usize>(body: &mut &[u8]) -> [u8; N] {
    let mut field = [0u8; N];
    body.copy_to_slice(&mut field);
    field
}

fn expect_len(
    message_type: MessageType,
    actual: usize,
    expected: usize,
) -> Result<(), HandshakeError> {
    if actual == expected {
        Ok(())
    } else {
        Err(malformed(format!("{message_type:?} must be {expected} bytes, got {actual}")))
    }
}

fn malformed(reason: impl Into<String>) -> HandshakeError {
    HandshakeError::Malformed { reason: reason.into() }
}
