/// Access Token Issuance and Verification
///
/// Compact EdDSA (Ed25519) JWTs carrying the claims in `claims.rs`. The
/// issuer owns the process keypair; every verification checks signature,
/// expiry, and the configured issuer string.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::keys::SigningKeypair;
use crate::error::{AppError, AuthError, CryptoError};

/// A freshly signed access token plus the metadata the session row records.
#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AccessTokenIssuer {
    keys: SigningKeypair,
    issuer: String,
}

impl AccessTokenIssuer {
    pub fn new(keys: SigningKeypair, issuer: String) -> Self {
        Self { keys, issuer }
    }

    /// Sign a new access token for a user
    ///
    /// # Errors
    /// Returns error if token signing fails
    pub fn sign(
        &self,
        user_id: Uuid,
        username: &str,
        ttl_seconds: i64,
    ) -> Result<SignedAccessToken, AppError> {
        let claims = Claims::new(
            user_id,
            username.to_string(),
            ttl_seconds,
            self.issuer.clone(),
        );

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| CryptoError::Signing("expiry out of range".to_string()))?;

        let token = encode(
            &Header::new(Algorithm::EdDSA),
            &claims,
            self.keys.encoding_key(),
        )
        .map_err(|e| CryptoError::Signing(e.to_string()))?;

        Ok(SignedAccessToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Validate and extract claims from an access token
    ///
    /// # Errors
    /// Returns `TokenExpired` for stale tokens, `TokenInvalid` for anything
    /// else (bad signature, wrong issuer, garbage input). Both collapse to
    /// the same response class at the HTTP boundary.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, self.keys.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => AppError::Auth(AuthError::TokenExpired),
                    _ => AppError::Auth(AuthError::TokenInvalid),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_issuer() -> AccessTokenIssuer {
        let keys = SigningKeypair::generate().expect("Failed to generate keypair");
        AccessTokenIssuer::new(keys, "test".to_string())
    }

    #[test]
    fn test_sign_and_verify_token() {
        let issuer = get_test_issuer();
        let user_id = Uuid::new_v4();

        let signed = issuer
            .sign(user_id, "alice", 300)
            .expect("Failed to sign token");
        let claims = issuer.verify(&signed.token).expect("Failed to verify token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.jti, signed.jti);
    }

    #[test]
    fn test_invalid_token() {
        let issuer = get_test_issuer();
        let result = issuer.verify("invalid.token.here");

        assert!(result.is_err());
    }

    #[test]
    fn test_tampered_token() {
        let issuer = get_test_issuer();

        let signed = issuer
            .sign(Uuid::new_v4(), "alice", 300)
            .expect("Failed to sign token");

        // Tamper with token
        let tampered = format!("{}X", signed.token);
        let result = issuer.verify(&tampered);

        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let keys = SigningKeypair::generate().expect("Failed to generate keypair");
        let issuer = AccessTokenIssuer::new(keys.clone(), "test".to_string());
        let other = AccessTokenIssuer::new(keys, "wrong-issuer".to_string());

        let signed = issuer
            .sign(Uuid::new_v4(), "alice", 300)
            .expect("Failed to sign token");
        let result = other.verify(&signed.token);

        assert!(result.is_err());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let issuer_a = get_test_issuer();
        let issuer_b = get_test_issuer();

        let signed = issuer_a
            .sign(Uuid::new_v4(), "alice", 300)
            .expect("Failed to sign token");

        assert!(issuer_b.verify(&signed.token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = get_test_issuer();

        // Past the default verification leeway
        let signed = issuer
            .sign(Uuid::new_v4(), "alice", -300)
            .expect("Failed to sign token");
        let result = issuer.verify(&signed.token);

        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::TokenExpired))
        ));
    }
}
