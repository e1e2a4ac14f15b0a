/// Refresh Token Codec
///
/// Opaque refresh tokens and their two storage digests. Tokens are:
/// - 32 bytes from the OS CSPRNG, base64url-encoded without padding
/// - Never persisted in raw form (the client holds the only copy)
/// - Stored as a SHA-256 hex lookup digest (deterministic, indexable)
///   plus an argon2id at-rest digest (salted, slow, proof of possession)

use argon2::password_hash::SaltString;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::configuration::ArgonSettings;
use crate::error::{AppError, CryptoError};

const REFRESH_TOKEN_BYTES: usize = 32;

/// A freshly generated refresh token in all three forms.
///
/// `raw` goes to the client; the two digests go to the session row.
pub struct RefreshTokenBundle {
    pub raw: String,
    pub lookup_hash: String,
    pub at_rest_hash: String,
}

#[derive(Clone)]
pub struct RefreshTokenCodec {
    argon2: Argon2<'static>,
}

impl RefreshTokenCodec {
    /// Build a codec from at-rest cost settings (memory cost in KiB).
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

    /// Generate a new refresh token and both storage digests
    ///
    /// # Errors
    /// Returns error if the at-rest hashing fails
    pub fn generate(&self) -> Result<RefreshTokenBundle, AppError> {
        let mut buffer = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut buffer);
        let raw = URL_SAFE_NO_PAD.encode(buffer);

        let lookup_hash = self.lookup_hash(&raw);

        let salt = SaltString::generate(&mut OsRng);
        let at_rest_hash = self
            .argon2
            .hash_password(raw.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?
            .to_string();

        Ok(RefreshTokenBundle {
            raw,
            lookup_hash,
            at_rest_hash,
        })
    }

    /// Deterministic lookup digest of a presented raw token
    ///
    /// This is what the store indexes; recomputing it is how a presented
    /// token finds its session row.
    pub fn lookup_hash(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Proof-of-possession check against the at-rest digest
    ///
    /// # Errors
    /// Returns error if the stored digest cannot be parsed; a mismatch is
    /// `Ok(false)`
    pub fn verify(&self, raw: &str, at_rest_hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(at_rest_hash)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;

        match Argon2::default().verify_password(raw.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CryptoError::Hashing(e.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> RefreshTokenCodec {
        RefreshTokenCodec::new(&ArgonSettings {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        })
        .expect("Failed to build codec")
    }

    #[test]
    fn test_generate_bundle_shape() {
        let bundle = test_codec().generate().expect("Failed to generate");

        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(bundle.raw.len(), 43);
        assert!(!bundle.raw.contains('='));
        // SHA-256 hex
        assert_eq!(bundle.lookup_hash.len(), 64);
        assert!(bundle.at_rest_hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_lookup_hash_is_deterministic() {
        let codec = test_codec();
        let bundle = codec.generate().expect("Failed to generate");

        assert_eq!(codec.lookup_hash(&bundle.raw), bundle.lookup_hash);
        assert_ne!(bundle.raw, bundle.lookup_hash);
    }

    #[test]
    fn test_verify_accepts_original() {
        let codec = test_codec();
        let bundle = codec.generate().expect("Failed to generate");

        assert!(codec
            .verify(&bundle.raw, &bundle.at_rest_hash)
            .expect("Failed to verify"));
    }

    #[test]
    fn test_verify_rejects_mutation() {
        let codec = test_codec();
        let bundle = codec.generate().expect("Failed to generate");

        // Flip one character of the raw token
        let mut chars: Vec<char> = bundle.raw.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let mutated: String = chars.into_iter().collect();

        assert_ne!(mutated, bundle.raw);
        assert!(!codec
            .verify(&mutated, &bundle.at_rest_hash)
            .expect("Failed to verify"));
    }

    #[test]
    fn test_distinct_tokens_distinct_digests() {
        let codec = test_codec();
        let a = codec.generate().expect("Failed to generate");
        let b = codec.generate().expect("Failed to generate");

        assert_ne!(a.raw, b.raw);
        assert_ne!(a.lookup_hash, b.lookup_hash);
        // Cross-verification must fail even though both digests are valid
        assert!(!codec.verify(&a.raw, &b.at_rest_hash).expect("Failed to verify"));
    }
}
