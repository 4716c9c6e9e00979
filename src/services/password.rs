//! Password hashing module
//!
//! Passwords are hashed with Argon2id using the argon2 crate's default cost
//! parameters and a random salt per hash. Hashes are stored as PHC strings,
//! so the parameters travel with the hash and verification needs no
//! configuration.
//!
//! Both functions are CPU-bound. Async callers should run them on the
//! blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

/// Password hashing and verification errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    /// The password does not match the hash
    #[error("password does not match")]
    Mismatch,

    /// The stored hash is not a valid PHC string
    #[error("malformed password hash: {0}")]
    MalformedHash(String),

    /// The hasher itself failed
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Hash a password using Argon2id with secure defaults.
///
/// # Returns
///
/// The password hash as a PHC string (algorithm, parameters, salt and hash)
///
/// # Errors
///
/// Returns `PasswordError::Hashing` only if the hasher fails internally; the
/// content of the password never causes an error.
///
/// # Example
///
/// ```ignore
/// use hallpass::services::password::hash_password;
///
/// let hash = hash_password("my_secure_password")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against a stored hash.
///
/// Succeeds silently on a match.
///
/// # Errors
///
/// - `PasswordError::Mismatch` if the password does not match
/// - `PasswordError::MalformedHash` if `hash` cannot be parsed
/// - `PasswordError::Hashing` for any other verifier failure
pub fn verify_password(hash: &str, password: &str) -> Result<(), PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(()),
        Err(argon2::password_hash::Error::Password) => Err(PasswordError::Mismatch),
        Err(e) => Err(PasswordError::Hashing(e.to_string())),
    }
}

/// Argon2id hash with the smallest allowed cost, for fixtures only.
/// Verification reads the parameters from the PHC string, so these hashes
/// go through the same `verify_password` path as production ones.
#[cfg(test)]
pub(crate) fn cheap_hash(password: &str) -> String {
    use argon2::{Algorithm, Params, Version};

    let params = Params::new(8, 1, 1, None).expect("valid argon2 params");
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .expect("hashing with fixed params")
        .to_string()
}
