/// Password Hashing and Verification
///
/// Argon2id password digests with configurable cost, plus password strength
/// validation. Verification reads cost and salt back out of the stored PHC
/// string, so parameter changes only affect newly hashed passwords.

use argon2::password_hash::SaltString;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version,
};
use rand::rngs::OsRng;

use crate::configuration::ArgonSettings;
use crate::error::{AppError, CryptoError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Build a hasher from cost settings (memory cost in KiB).
    ///
    /// # Errors
    /// Returns error if the cost combination is rejected by argon2
    pub fn new(settings: &ArgonSettings) -> Result<Self, CryptoError> {
        let params = Params::new(settings.m_cost, settings.t_cost, settings.p_cost, None)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password
    ///
    /// # Errors
    /// Returns error if:
    /// - Password fails validation (too short, weak, etc.)
    /// - Argon2 hashing fails
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        validate_password_strength(password)?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify a password against its stored PHC string
    ///
    /// # Errors
    /// Returns error if the stored hash cannot be parsed; a plain mismatch
    /// is `Ok(false)`, not an error
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CryptoError::Hashing(e.to_string()).into()),
        }
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // Upper bound doubles as DoS prevention for the slow hash
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal costs keep the test suite fast; production costs come from
    // configuration defaults.
    fn test_hasher() -> PasswordHasher {
        PasswordHasher::new(&ArgonSettings {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        })
        .expect("Failed to build hasher")
    }

    #[test]
    fn test_hash_password() {
        let hasher = test_hasher();
        let password = "ValidPassword123";
        let hash = hasher.hash(password).expect("Failed to hash password");

        // Hash should not be the same as password
        assert_ne!(password, hash);
        // Hash should be a self-describing argon2id PHC string
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_password() {
        let hasher = test_hasher();
        let password = "ValidPassword123";
        let hash = hasher.hash(password).expect("Failed to hash password");

        let is_valid = hasher.verify(password, &hash).expect("Failed to verify password");
        assert!(is_valid);
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = test_hasher();
        let password = "ValidPassword123";
        let hash = hasher.hash(password).expect("Failed to hash password");

        let is_valid = hasher
            .verify("WrongPassword123", &hash)
            .expect("Failed to verify password");
        assert!(!is_valid);
    }

    #[test]
    fn test_verify_garbage_hash_is_error() {
        let hasher = test_hasher();
        assert!(hasher.verify("ValidPassword123", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_too_short_password() {
        let result = test_hasher().hash("Short1");
        assert!(result.is_err());
    }

    #[test]
    fn test_too_long_password() {
        let long_password = "a".repeat(MAX_PASSWORD_LENGTH + 1) + "A1";
        let result = test_hasher().hash(&long_password);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_digits() {
        let result = test_hasher().hash("NoDigitsPassword");
        assert!(result.is_err());
    }

    #[test]
    fn test_no_lowercase() {
        let result = test_hasher().hash("NOLOWERCASE1");
        assert!(result.is_err());
    }

    #[test]
    fn test_no_uppercase() {
        let result = test_hasher().hash("nouppercase1");
        assert!(result.is_err());
    }

    #[test]
    fn test_valid_password() {
        let result = test_hasher().hash("ValidPassword123");
        assert!(result.is_ok());
    }
}
