//! AES-256-GCM encryption of record fields at rest

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::RngCore;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Encrypts single string fields as `base64(nonce || ciphertext)`
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let bytes = B64.decode(encoded.trim()).context("key is not valid base64")?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow!("key must be {} bytes", KEY_LEN))?;
        Ok(Self::new(&key))
    }

    /// Generate a random key, base64 encoded
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        B64.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| anyhow!("failed to encrypt field"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(B64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let bytes = B64.decode(encoded).context("encrypted field is not valid base64")?;
        if bytes.len() < NONCE_LEN {
            return Err(anyhow!("encrypted field too short"));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("failed to decrypt field, key may be wrong"))?;

        String::from_utf8(plaintext).context("decrypted field is not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = FieldCipher::from_base64_key(&FieldCipher::generate_key()).unwrap();
        let sealed = cipher.encrypt("/DCIM/Camera/IMG_0001.jpg").unwrap();
        assert_ne!(sealed, "/DCIM/Camera/IMG_0001.jpg");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "/DCIM/Camera/IMG_0001.jpg");
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let cipher = FieldCipher::new(&[7u8; KEY_LEN]);
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = FieldCipher::new(&[1u8; KEY_LEN]).encrypt("secret").unwrap();
        assert!(FieldCipher::new(&[2u8; KEY_LEN]).decrypt(&sealed).is_err());
    }

    #[test]
    fn test_key_length_checked() {
        assert!(FieldCipher::from_base64_key(&B64.encode([0u8; 16])).is_err());
    }
}
