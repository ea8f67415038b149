//! Signed invalidation messages exchanged between cluster nodes.

mod codec;

pub use codec::{
    decode, encode, DecodeError, MAX_MESSAGE_LEN, MAX_NODE_ID_LEN, MAX_SESSION_ID_LEN,
    WIRE_VERSION,
};

use bytes::BytesMut;
use chrono::Utc;
use thiserror::Error;

use crate::signer::{Signature, Signer, SIGNATURE_LEN};

/// Length of a message nonce in bytes
pub const NONCE_LEN: usize = 16;

/// Random 128-bit value making each message unique per origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("{field} must be between 1 and {max} bytes, got {len}")]
    FieldLength {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Assertion that a session must be treated as logged out cluster-wide.
///
/// Created once per local logout and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationMessage {
    pub session_id: String,
    pub origin_node_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub nonce: Nonce,
    pub signature: Signature,
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), BuildError> {
    if value.is_empty() || value.len() > max {
        return Err(BuildError::FieldLength {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

impl InvalidationMessage {
    /// Build and sign a fresh message stamped with the current time and a random nonce
    pub fn create(
        session_id: impl Into<String>,
        origin_node_id: impl Into<String>,
        signer: &Signer,
    ) -> Result<Self, BuildError> {
        Self::create_at(
            session_id,
            origin_node_id,
            Utc::now().timestamp_millis(),
            Nonce::random(),
            signer,
        )
    }

    /// Build and sign a message with explicit timestamp and nonce
    pub fn create_at(
        session_id: impl Into<String>,
        origin_node_id: impl Into<String>,
        timestamp_ms: i64,
        nonce: Nonce,
        signer: &Signer,
    ) -> Result<Self, BuildError> {
        let session_id = session_id.into();
        let origin_node_id = origin_node_id.into();
        check_len("session id", &session_id, MAX_SESSION_ID_LEN)?;
        check_len("origin node id", &origin_node_id, MAX_NODE_ID_LEN)?;

        let mut message = Self {
            session_id,
            origin_node_id,
            timestamp_ms,
            nonce,
            signature: [0u8; SIGNATURE_LEN],
        };
        message.signature = signer.sign(&message.signing_payload());
        Ok(message)
    }

    /// Bytes covered by the signature
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len() - SIGNATURE_LEN);
        codec::encode_unsigned(
            &mut buf,
            &self.session_id,
            &self.origin_node_id,
            self.timestamp_ms,
            &self.nonce,
        );
        buf.to_vec()
    }

    pub fn verify(&self, signer: &Signer) -> bool {
        signer.verify(&self.signing_payload(), &self.signature)
    }

    pub fn encoded_len(&self) -> usize {
        1 + 2 + self.session_id.len() + 2 + self.origin_node_id.len() + 8 + NONCE_LEN + SIGNATURE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Signer {
        Signer::new("cluster-secret-0123456789")
    }

    #[test]
    fn test_create_is_verifiable() {
        let message = InvalidationMessage::create("S123", "node-a", &signer()).unwrap();
        assert!(message.verify(&signer()));
        assert!(!message.verify(&Signer::new("another-secret-0123456789")));
    }

    #[test]
    fn test_any_field_change_breaks_signature() {
        let message = InvalidationMessage::create("S123", "node-a", &signer()).unwrap();

        let mut tampered = message.clone();
        tampered.session_id = "S124".to_string();
        assert!(!tampered.verify(&signer()));

        let mut tampered = message.clone();
        tampered.origin_node_id = "node-b".to_string();
        assert!(!tampered.verify(&signer()));

        let mut tampered = message.clone();
        tampered.timestamp_ms += 1;
        assert!(!tampered.verify(&signer()));

        let mut tampered = message;
        tampered.nonce = Nonce::random();
        assert!(!tampered.verify(&signer()));
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = InvalidationMessage::create("S123", "node-a", &signer()).unwrap();
        let b = InvalidationMessage::create("S123", "node-a", &signer()).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_rejects_empty_and_oversized_fields() {
        assert!(matches!(
            InvalidationMessage::create("", "node-a", &signer()),
            Err(BuildError::FieldLength { field: "session id", .. })
        ));

        let long_node = "n".repeat(MAX_NODE_ID_LEN + 1);
        assert!(matches!(
            InvalidationMessage::create("S123", long_node, &signer()),
            Err(BuildError::FieldLength { field: "origin node id", .. })
        ));
    }

    #[test]
    fn test_nonce_display_is_hex() {
        let nonce = Nonce::from_bytes([0xab; NONCE_LEN]);
        assert_eq!(nonce.to_string(), "ab".repeat(NONCE_LEN));
    }
}
