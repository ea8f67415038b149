//! HMAC-SHA256 signing of invalidation messages with the cluster shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of a message signature in bytes
pub const SIGNATURE_LEN: usize = 32;

pub type Signature = [u8; SIGNATURE_LEN];

/// Signs and verifies payloads with a pre-shared symmetric key
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC key size is always valid")
    }

    /// Compute the signature over `payload`
    pub fn sign(&self, payload: &[u8]) -> Signature {
        let mut mac = self.mac();
        mac.update(payload);

        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&mac.finalize().into_bytes());
        signature
    }

    /// Check `signature` against `payload` in constant time.
    ///
    /// A signature of the wrong length is simply a mismatch.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(signature).is_ok()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("key", &"<redacted>").finish()
    }
}
