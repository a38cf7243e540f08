//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so
//! verification reads the parameters from the hash and keeps working after
//! the configured cost changes.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::HashingConfig;
use crate::hashing::{HandlerError, RequestHandler};

/// Default [`RequestHandler`] backed by Argon2id.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Build a hasher from configured costs.
    pub fn new(config: &HashingConfig) -> Result<Self, HandlerError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| HandlerError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl RequestHandler for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, HandlerError> {
        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HandlerError::Internal(format!("unable to hash password: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, HandlerError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| HandlerError::Validation(format!("invalid hash format: {e}")))?;

        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HandlerError::Validation(format!("unable to verify password: {e}"))),
        }
    }
}
