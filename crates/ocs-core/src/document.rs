//! Sealing of the protected document under its symmetric key
//!
//! The document key is short enough to fit into one curve point, so it is
//! stretched to a ChaCha20-Poly1305 key with BLAKE3 before use. Sealed
//! output is `nonce || ciphertext`.

use crate::embed::EMBED_CAPACITY;
use crate::{Error, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

/// Default document key length
pub const DOCUMENT_KEY_LEN: usize = 16;

const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &str = "ocs 2024 document sealing key";

/// Draw a fresh document key
pub fn generate_document_key() -> [u8; DOCUMENT_KEY_LEN] {
    let mut key = [0u8; DOCUMENT_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

fn cipher(document_key: &[u8]) -> Result<ChaCha20Poly1305> {
    if document_key.is_empty() || document_key.len() > EMBED_CAPACITY {
        return Err(Error::Crypto(format!(
            "document key must be 1..={} bytes",
            EMBED_CAPACITY
        )));
    }
    let derived = Zeroizing::new(blake3::derive_key(KEY_CONTEXT, document_key));
    Ok(ChaCha20Poly1305::new(Key::from_slice(derived.as_slice())))
}

/// Encrypt `plaintext` under `document_key`
pub fn seal(document_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(document_key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("document encryption failed".into()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt and authenticate a sealed document
pub fn open(document_key: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(Error::Crypto("sealed document too short".into()));
    }
    let cipher = cipher(document_key)?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Crypto("document authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = generate_document_key();
        let data = b"Very secret Message to be encrypted";

        let sealed = seal(&key, data).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], data.as_slice());
        assert_eq!(open(&key, &sealed).unwrap(), data);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = seal(&generate_document_key(), b"data").unwrap();
        assert!(open(&generate_document_key(), &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_document_key();
        let mut sealed = seal(&key, b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 1;
        assert!(open(&key, &sealed).is_err());
        assert!(open(&key, &sealed[..4]).is_err());
    }

    #[test]
    fn test_key_length_bounds() {
        assert!(seal(&[], b"data").is_err());
        assert!(seal(&[0u8; EMBED_CAPACITY + 1], b"data").is_err());
        assert!(seal(&[0u8; EMBED_CAPACITY], b"data").is_ok());
    }
}
