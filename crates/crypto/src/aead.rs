// SPDX-License-Identifier: BUSL-1.1

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::CryptoError;

/// A 32-byte AES-256-GCM key, loaded once at process startup from the
/// `NETVIGIL_ENCRYPTION_KEY` config value (base64, 32 bytes per SPEC_FULL.md
/// §6). Never logged, never echoed in an API response.
pub struct MasterKey(Zeroizing<[u8; 32]>);

impl MasterKey {
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(encoded.trim())?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength { expected: 32, actual: bytes.len() });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(Zeroizing::new(key)))
    }

    /// Generate a fresh random key, for tests and first-run bootstrap.
    #[allow(clippy::expect_used)]
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let mut key = [0u8; 32];
        rng.fill(&mut key).expect("system RNG must be available");
        Self(Zeroizing::new(key))
    }
}

/// Encrypts and decrypts credential secrets with AES-256-GCM. The ciphertext
/// encoding persisted to the database is `base64(nonce || ciphertext || tag)`.
pub struct CredentialCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialCipher {
    #[allow(clippy::expect_used)]
    pub fn new(master_key: &MasterKey) -> Self {
        let unbound = UnboundKey::new(&AES_256_GCM, master_key.0.as_slice())
            .expect("32-byte key is always valid for AES-256-GCM");
        Self { key: LessSafeKey::new(unbound), rng: SystemRandom::new() }
    }

    /// Encrypt `plaintext`, returning a self-contained base64 string
    /// (nonce prepended) suitable for the `secret_ciphertext` column.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| CryptoError::EncryptFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + in_out.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&in_out);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a value previously produced by [`Self::encrypt`]. The result
    /// is a zeroizing buffer — callers should drop it as soon as the secret
    /// bytes have been used (e.g. stamped into an outgoing RPC payload).
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let combined = BASE64.decode(ciphertext_b64.trim())?;
        if combined.len() < NONCE_LEN {
            return Err(CryptoError::DecryptFailed);
        }
        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_arr);

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::DecryptFailed)?;
        Ok(Zeroizing::new(plaintext.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let key = MasterKey::generate();
        let cipher = CredentialCipher::new(&key);
        let ciphertext = cipher.encrypt(b"hunter2").unwrap();
        let plaintext = cipher.decrypt(&ciphertext).unwrap();
        assert_eq!(&plaintext[..], b"hunter2");
    }

    #[test]
    fn distinct_ciphertexts_for_same_plaintext() {
        let key = MasterKey::generate();
        let cipher = CredentialCipher::new(&key);
        let a = cipher.encrypt(b"same-secret").unwrap();
        let b = cipher.encrypt(b"same-secret").unwrap();
        assert_ne!(a, b, "nonces must differ between calls");
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let key = MasterKey::generate();
        let cipher = CredentialCipher::new(&key);
        let mut ciphertext = cipher.encrypt(b"hunter2").unwrap().into_bytes();
        *ciphertext.last_mut().unwrap() ^= 0xFF;
        let tampered = String::from_utf8(ciphertext).unwrap();
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn rejects_wrong_key() {
        let cipher_a = CredentialCipher::new(&MasterKey::generate());
        let cipher_b = CredentialCipher::new(&MasterKey::generate());
        let ciphertext = cipher_a.encrypt(b"hunter2").unwrap();
        assert!(cipher_b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn rejects_invalid_key_length() {
        let short = BASE64.encode([0u8; 16]);
        assert!(matches!(
            MasterKey::from_base64(&short),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 })
        ));
    }
}
