//! Authenticated encryption for stored payloads.
//!
//! Command outputs and artifact payloads are sealed with ChaCha20-Poly1305
//! before they touch a store, and opened only on explicit retrieval.
//! Plaintext is never persisted. The process-wide key is loaded from
//! configuration at boot and injected; there is no ambient key lookup.
//!
//! Wire format of a sealed payload: 12-byte nonce followed by the
//! ciphertext+tag. Checksums are SHA-256 over the plaintext, computed before
//! sealing so integrity can be verified after opening.

use crate::{MusterError, MusterResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use sha2::{Digest, Sha256};

/// Length in bytes of a sealing key.
pub const KEY_LEN: usize = 32;
/// Length in bytes of the nonce prefix on a sealed payload.
pub const NONCE_LEN: usize = 12;

/// Seals and opens payloads with a process-wide ChaCha20-Poly1305 key.
#[derive(Clone)]
pub struct Sealer {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for Sealer {
    // Never expose key material through Debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

impl Sealer {
    /// Creates a sealer from raw key bytes.
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            // Length is fixed by the array type.
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Creates a sealer from a base64-encoded key, as carried in config.
    pub fn from_base64(encoded: &str) -> MusterResult<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| MusterError::Validation(format!("seal key is not valid base64: {e}")))?;
        if bytes.len() != KEY_LEN {
            return Err(MusterError::Validation(format!(
                "seal key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let cipher = ChaCha20Poly1305::new_from_slice(&bytes)
            .map_err(|_| MusterError::Validation("seal key rejected by cipher".to_string()))?;
        Ok(Self { cipher })
    }

    /// Generates a fresh random key, base64-encoded for config files.
    pub fn generate_key_base64() -> String {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        BASE64.encode(key)
    }

    /// Seals plaintext into `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> MusterResult<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| MusterError::Sealing("encryption failed".to_string()))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Opens a sealed payload, authenticating it in the process.
    pub fn open(&self, sealed: &[u8]) -> MusterResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(MusterError::Sealing(
                "sealed payload shorter than nonce".to_string(),
            ));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| MusterError::Sealing("decryption failed".to_string()))
    }
}

/// Hex-encoded SHA-256 checksum of a payload.
pub fn checksum_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn test_sealer() -> Sealer {
        Sealer::new(&[7u8; KEY_LEN])
    }

    #[test]
    fn seal_then_open_returns_plaintext() {
        let sealer = test_sealer();
        let sealed = sealer.seal(b"collected report").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"collected report".as_slice());
        assert_eq!(sealer.open(&sealed).unwrap(), b"collected report");
    }

    #[test]
    fn sealing_is_randomized_per_call() {
        let sealer = test_sealer();
        let a = sealer.seal(b"same input").unwrap();
        let b = sealer.seal(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_payload_fails_to_open() {
        let sealer = test_sealer();
        let mut sealed = sealer.seal(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(
            sealer.open(&sealed).unwrap_err(),
            MusterError::Sealing(_)
        ));
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = test_sealer().seal(b"payload").unwrap();
        let other = Sealer::new(&[8u8; KEY_LEN]);
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let sealer = test_sealer();
        assert!(matches!(
            sealer.open(&[0u8; NONCE_LEN - 1]).unwrap_err(),
            MusterError::Sealing(_)
        ));
    }

    #[test]
    fn generated_keys_round_trip_through_base64() {
        let encoded = Sealer::generate_key_base64();
        let sealer = Sealer::from_base64(&encoded).unwrap();
        let sealed = sealer.seal(b"x").unwrap();
        assert_eq!(sealer.open(&sealed).unwrap(), b"x");
    }

    #[test]
    fn short_keys_are_rejected() {
        let encoded = BASE64.encode([1u8; 16]);
        assert!(matches!(
            Sealer::from_base64(&encoded).unwrap_err(),
            MusterError::Validation(_)
        ));
    }

    #[test]
    fn checksum_is_stable_hex_sha256() {
        let sum = checksum_hex(b"abc");
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
