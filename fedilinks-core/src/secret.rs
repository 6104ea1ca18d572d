use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CodecError;

const ENVELOPE_PREFIX: &str = "sealed:v1:";
const NONCE_LEN: usize = 12;

/// An obscured secret as it appears in the slot files. Opaque outside this
/// module; only a [`SecretCodec`] holding the right key can read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sealed(String);

impl Sealed {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reversible obfuscation for short secrets (client credentials, codes,
/// tokens) under one process-wide symmetric key.
#[derive(Clone)]
pub struct SecretCodec {
    key: [u8; 32],
}

impl SecretCodec {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Key as configured: 32 bytes, URL-safe base64 without padding.
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| CodecError::Envelope)?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| CodecError::Envelope)?;
        Ok(Self::new(key))
    }

    /// Seals a plaintext into a `sealed:v1:<nonce>:<ciphertext>` envelope.
    /// The nonce is derived from key and plaintext, so the same input always
    /// yields the same envelope under a given key.
    pub fn seal(&self, plaintext: &str) -> Sealed {
        let nonce_bytes = self.derive_nonce(plaintext);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let aead = ChaCha20Poly1305::new_from_slice(&self.key).expect("32-byte key");
        let ciphertext = aead
            .encrypt(nonce, plaintext.as_bytes())
            .expect("seal in-memory plaintext");
        Sealed(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    pub fn open(&self, sealed: &Sealed) -> Result<String, CodecError> {
        let rest = sealed
            .0
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(CodecError::Envelope)?;
        let (nonce_b64, ciphertext_b64) = rest.split_once(':').ok_or(CodecError::Envelope)?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| CodecError::Envelope)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CodecError::Envelope);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|_| CodecError::Envelope)?;
        let aead = ChaCha20Poly1305::new_from_slice(&self.key).expect("32-byte key");
        let plaintext = aead
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CodecError::Crypto)?;
        Ok(String::from_utf8(plaintext)?)
    }

    fn derive_nonce(&self, plaintext: &str) -> [u8; NONCE_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(plaintext.as_bytes());
        let digest = hasher.finalize();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}
