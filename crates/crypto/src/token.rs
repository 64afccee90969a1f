// SPDX-License-Identifier: BUSL-1.1

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::digest;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::CryptoError;

const CREDENTIAL_LEN: usize = digest::SHA256_OUTPUT_LEN;
const SALT_LEN: usize = 16;
const PBKDF2_ITERATIONS: u32 = 600_000;
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// A salted, hashed agent enrollment token, as stored in the `agents` table.
/// The plaintext token is shown to the operator exactly once, at enrollment
/// or rotation time, and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHash {
    pub salt: String,
    pub hash: String,
    pub iterations: u32,
}

/// Generate a fresh bearer token for agent enrollment or rotation. Returned
/// as a `netvigil_` prefixed, base64url-ish string the operator copies into
/// the agent's config; only [`hash_token`]'s output is ever stored.
#[allow(clippy::expect_used)]
pub fn generate_token() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes).expect("system RNG must be available");
    format!("netvigil_{}", BASE64.encode(bytes))
}

/// Hash `token` with a freshly generated random salt.
#[allow(clippy::expect_used)]
pub fn hash_token(token: &str) -> TokenHash {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).expect("system RNG must be available");

    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iteration count");
    let mut out = [0u8; CREDENTIAL_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, token.as_bytes(), &mut out);

    TokenHash {
        salt: BASE64.encode(salt),
        hash: BASE64.encode(out),
        iterations: PBKDF2_ITERATIONS,
    }
}

/// Verify a presented token against a stored [`TokenHash`] in constant time.
pub fn verify_token(token: &str, stored: &TokenHash) -> Result<(), CryptoError> {
    let salt = BASE64.decode(&stored.salt)?;
    let expected = BASE64.decode(&stored.hash)?;
    let iterations = NonZeroU32::new(stored.iterations).ok_or(CryptoError::DecryptFailed)?;

    pbkdf2::verify(PBKDF2_ALG, iterations, &salt, token.as_bytes(), &expected)
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_verifies_against_its_own_hash() {
        let token = generate_token();
        let hashed = hash_token(&token);
        assert!(verify_token(&token, &hashed).is_ok());
    }

    #[test]
    fn wrong_token_fails_verification() {
        let token = generate_token();
        let hashed = hash_token(&token);
        assert!(verify_token("netvigil_not-the-token", &hashed).is_err());
    }

    #[test]
    fn two_tokens_never_collide() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn hashing_same_token_twice_uses_distinct_salts() {
        let token = generate_token();
        let a = hash_token(&token);
        let b = hash_token(&token);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }
}
