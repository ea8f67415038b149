//! Wire codec for invalidation messages
//!
//! Layout (version 1, all integers big-endian):
//!
//! | field          | encoding                         |
//! |----------------|----------------------------------|
//! | version        | u8                               |
//! | session_id     | u16 length + bytes (UTF-8)       |
//! | origin_node_id | u16 length + UTF-8               |
//! | timestamp_ms   | i64                              |
//! | nonce          | 16 bytes                         |
//! | signature      | 32 bytes HMAC-SHA256             |
//!
//! The signature covers every byte that precedes it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::signer::{Signature, SIGNATURE_LEN};

use super::{InvalidationMessage, Nonce, NONCE_LEN};

/// Current wire format version
pub const WIRE_VERSION: u8 = 1;

/// Upper bound on session identifier length
pub const MAX_SESSION_ID_LEN: usize = 1024;

/// Upper bound on origin node identifier length
pub const MAX_NODE_ID_LEN: usize = 255;

/// Largest well-formed encoded message
pub const MAX_MESSAGE_LEN: usize =
    1 + 2 + MAX_SESSION_ID_LEN + 2 + MAX_NODE_ID_LEN + 8 + NONCE_LEN + SIGNATURE_LEN;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed invalidation message: {0}")]
    Malformed(String),
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(reason.into())
}

/// Encode everything except the signature
pub(crate) fn encode_unsigned(
    buf: &mut BytesMut,
    session_id: &str,
    origin_node_id: &str,
    timestamp_ms: i64,
    nonce: &Nonce,
) {
    buf.put_u8(WIRE_VERSION);
    buf.put_u16(session_id.len() as u16);
    buf.put_slice(session_id.as_bytes());
    buf.put_u16(origin_node_id.len() as u16);
    buf.put_slice(origin_node_id.as_bytes());
    buf.put_i64(timestamp_ms);
    buf.put_slice(nonce.as_bytes());
}

/// Serialize a message to its wire form
pub fn encode(message: &InvalidationMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(message.encoded_len());
    encode_unsigned(
        &mut buf,
        &message.session_id,
        &message.origin_node_id,
        message.timestamp_ms,
        &message.nonce,
    );
    buf.put_slice(&message.signature);
    buf.freeze()
}

fn read_string(
    cursor: &mut &[u8],
    field: &str,
    max_len: usize,
) -> Result<String, DecodeError> {
    if cursor.remaining() < 2 {
        return Err(malformed(format!("truncated {} length", field)));
    }
    let len = cursor.get_u16() as usize;
    if len == 0 {
        return Err(malformed(format!("empty {}", field)));
    }
    if len > max_len {
        return Err(malformed(format!("{} exceeds {} bytes", field, max_len)));
    }
    if cursor.remaining() < len {
        return Err(malformed(format!("truncated {}", field)));
    }

    let raw = cursor.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| malformed(format!("{} is not UTF-8", field)))
}

/// Parse a wire message. Never panics on arbitrary input.
pub fn decode(bytes: &[u8]) -> Result<InvalidationMessage, DecodeError> {
    if bytes.len() > MAX_MESSAGE_LEN {
        return Err(malformed(format!(
            "payload of {} bytes exceeds {}",
            bytes.len(),
            MAX_MESSAGE_LEN
        )));
    }

    let mut cursor = bytes;
    if !cursor.has_remaining() {
        return Err(malformed("empty payload"));
    }

    let version = cursor.get_u8();
    if version != WIRE_VERSION {
        return Err(malformed(format!("unsupported version {}", version)));
    }

    let session_id = read_string(&mut cursor, "session id", MAX_SESSION_ID_LEN)?;
    let origin_node_id = read_string(&mut cursor, "origin node id", MAX_NODE_ID_LEN)?;

    if cursor.remaining() < 8 {
        return Err(malformed("truncated timestamp"));
    }
    let timestamp_ms = cursor.get_i64();

    if cursor.remaining() < NONCE_LEN {
        return Err(malformed("truncated nonce"));
    }
    let mut nonce = [0u8; NONCE_LEN];
    cursor.copy_to_slice(&mut nonce);

    if cursor.remaining() < SIGNATURE_LEN {
        return Err(malformed("truncated signature"));
    }
    let mut signature: Signature = [0u8; SIGNATURE_LEN];
    cursor.copy_to_slice(&mut signature);

    if cursor.has_remaining() {
        return Err(malformed(format!("{} trailing bytes", cursor.remaining())));
    }

    Ok(InvalidationMessage {
        session_id,
        origin_node_id,
        timestamp_ms,
        nonce: Nonce::from_bytes(nonce),
        signature,
    })
}
