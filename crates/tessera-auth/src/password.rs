//! Password hashing and verification.
//!
//! Passwords are hashed with Argon2id using default parameters and a random
//! salt from `OsRng`, and stored as PHC strings.
//!
//! # Example
//!
//! ```
//! use tessera_auth::password::{hash_password, verify_password};
//!
//! let hash = hash_password("correct horse battery staple").unwrap();
//! assert!(hash.starts_with("$argon2id$"));
//! assert!(verify_password("correct horse battery staple", &hash).unwrap());
//! assert!(!verify_password("Tr0ub4dor&3", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::{AuthError, AuthResult};

/// Minimum accepted password length, in chars.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password for storage using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails (rare).
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored Argon2 hash.
///
/// Returns `Ok(false)` on mismatch.
///
/// # Errors
///
/// Returns `AuthError::Internal` only if the stored hash is not a valid PHC
/// string.
pub fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AuthError::internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("secret-password").unwrap();
        let b = hash_password("secret-password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("secret-password", &a).unwrap());
        assert!(verify_password("secret-password", &b).unwrap());
    }

    #[test]
    fn test_wrong_password_is_false() {
        let hash = hash_password("secret-password").unwrap();
        assert!(!verify_password("secret-passw0rd", &hash).unwrap());
    }

    #[test]
    fn test_invalid_hash_is_error() {
        let err = verify_password("x", "not-a-phc-string").unwrap_err();
        assert!(err.is_server_error());
    }
}
