//! Obfuscation stage.
//!
//! The stock implementation is ChaCha20-Poly1305 keyed by the SHA-256 of the
//! configured secret. The toggle is payload shaping; key management is the
//! caller's problem.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

const NONCE_LEN: usize = 12;

/// Reversible keyed transform applied to encoded bytes.
pub trait Obfuscator: Send + Sync + std::fmt::Debug {
    fn obfuscate(&self, plain: &[u8]) -> Result<Vec<u8>>;
    fn reveal(&self, sealed: &[u8]) -> Result<Vec<u8>>;
}

// == ChaCha Obfuscator ==
pub struct ChaChaObfuscator {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for ChaChaObfuscator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaObfuscator").finish_non_exhaustive()
    }
}

impl ChaChaObfuscator {
    pub fn new(secret: &[u8]) -> Self {
        let digest = Sha256::digest(secret);
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&digest)),
        }
    }
}

impl Obfuscator for ChaChaObfuscator {
    /// Output layout: nonce (12) || ciphertext+tag
    fn obfuscate(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plain)
            .map_err(|_| CacheError::Serialization("obfuscation failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn reveal(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(CacheError::Serialization(
                "obfuscated payload shorter than nonce".into(),
            ));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CacheError::Serialization("payload failed authentication".into()))
    }
}
