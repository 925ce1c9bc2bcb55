//! Password, PIN, and API-key hashing. Password/PIN hashing follows the
//! teacher's Argon2id newtype pattern (`auth-service/src/utils/password.rs`);
//! API-key hashing uses SHA-256 + constant-time comparison since it is
//! checked on every service call and an Argon2 round-trip there would be a
//! self-inflicted denial of service.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Newtype to prevent a plaintext secret from being accidentally logged.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hashes a password/PIN with Argon2id; salt is random per call.
pub fn hash_secret(secret: &Secret) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(secret.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash secret: {e}"))?
        .to_string();
    Ok(PasswordHashString::new(hash))
}

/// Verifies a password/PIN against its Argon2id hash.
pub fn verify_secret(secret: &Secret, hash: &PasswordHashString) -> bool {
    let Ok(parsed) = PasswordHash::new(hash.as_str()) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_str().as_bytes(), &parsed)
        .is_ok()
}

/// Hashes an API key candidate with SHA-256 for constant-time comparison.
pub fn hash_api_key(candidate: &str) -> String {
    hex::encode(Sha256::digest(candidate.as_bytes()))
}

/// Constant-time comparison of an API-key candidate against its stored hash.
pub fn verify_api_key(candidate: &str, stored_hash: &str) -> bool {
    let candidate_hash = hash_api_key(candidate);
    let a = candidate_hash.as_bytes();
    let b = stored_hash.as_bytes();
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let secret = Secret::new("correct horse battery staple".to_string());
        let hash = hash_secret(&secret).unwrap();
        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_secret(&secret, &hash));
        assert!(!verify_secret(&Secret::new("wrong".to_string()), &hash));
    }

    #[test]
    fn api_key_verification_is_constant_time_safe() {
        let hash = hash_api_key("sk-live-abc123");
        assert!(verify_api_key("sk-live-abc123", &hash));
        assert!(!verify_api_key("sk-live-abc124", &hash));
    }
}
