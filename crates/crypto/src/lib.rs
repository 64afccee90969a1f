// SPDX-License-Identifier: BUSL-1.1

//! Symmetric credential encryption and agent-token hashing (SPEC_FULL.md
//! §4.11). Built on `ring`, which the teacher already depends on as
//! `rustls`'s crypto provider — no second AEAD crate is pulled in.

pub mod aead;
pub mod token;

pub use aead::{CredentialCipher, MasterKey};
pub use token::{generate_token, hash_token, verify_token, TokenHash};

#[derive(Debug)]
pub enum CryptoError {
    InvalidKeyLength { expected: usize, actual: usize },
    EncryptFailed,
    DecryptFailed,
    Encoding(base64::DecodeError),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKeyLength { expected, actual } => {
                write!(f, "expected a {expected}-byte key, got {actual}")
            }
            Self::EncryptFailed => write!(f, "credential encryption failed"),
            Self::DecryptFailed => write!(f, "credential decryption failed"),
            Self::Encoding(e) => write!(f, "base64 decoding failed: {e}"),
        }
    }
}

impl std::error::Error for CryptoError {}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Encoding(e)
    }
}
