//! Salted password hashing.
//!
//! The server treats the hashing primitive as a pluggable collaborator
//! behind [`PasswordHasher`]. The shipped implementation is Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::constants::{
    ARGON2_ITERATIONS, ARGON2_MEMORY_KIB, ARGON2_PARALLELISM, PASSWORD_DIGEST_SIZE, SALT_SIZE,
};
use crate::error::CryptoError;

/// `Hash(password, salt) -> digest` / `Verify` contract.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str, salt: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Constant-time comparison of a fresh digest against `digest`.
    fn verify(&self, password: &str, salt: &[u8], digest: &[u8]) -> bool {
        match self.hash(password, salt) {
            Ok(candidate) => candidate.ct_eq(digest).into(),
            Err(_) => false,
        }
    }
}

pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Argon2id with explicit cost parameters.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, CryptoError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(PASSWORD_DIGEST_SIZE))
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;
        Ok(Self { params })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(PASSWORD_DIGEST_SIZE),
        )
        .unwrap_or_default();
        Self { params }
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str, salt: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let mut digest = vec![0u8; PASSWORD_DIGEST_SIZE];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut digest)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;
        Ok(digest)
    }
}
