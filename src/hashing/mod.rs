//! Password hashing capability.
//!
//! The RPC service only depends on [`RequestHandler`]; the algorithm behind
//! it is pluggable. [`Argon2Hasher`] is the default.

pub mod argon2;

pub use self::argon2::Argon2Hasher;

/// Error returned by a [`RequestHandler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The input was rejected (for example a malformed hash string).
    #[error("{0}")]
    Validation(String),
    /// The handler failed for reasons unrelated to the input.
    #[error("{0}")]
    Internal(String),
}

/// Hashes and verifies passwords.
///
/// Calls are CPU-bound and run on the blocking thread pool.
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce an encoded hash for `password`.
    fn hash(&self, password: &str) -> Result<String, HandlerError>;

    /// Check `password` against an encoded hash produced by [`RequestHandler::hash`].
    fn verify(&self, password: &str, hash: &str) -> Result<bool, HandlerError>;
}
