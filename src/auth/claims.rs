/// JWT Claims structure
///
/// Represents the payload of an access token containing user information
/// and standard JWT claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::AppError;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Username at issue time
    pub username: String,
    /// Token identifier (random UUID per issued token)
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create new claims with user information
    ///
    /// # Arguments
    /// * `user_id` - User's UUID
    /// * `username` - User's login name
    /// * `expiry_seconds` - Token expiration in seconds from now
    /// * `issuer` - Issuer identifier
    pub fn new(
        user_id: Uuid,
        username: String,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            username,
            jti: Uuid::new_v4().to_string(),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns error if user ID is not a valid UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Internal("Invalid user ID in token".to_string()))
    }

    /// Check if token has expired
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "alice".to_string(), 300, "test".to_string());

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.exp - claims.iat, 300);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_jti_is_unique_per_token() {
        let user_id = Uuid::new_v4();
        let a = Claims::new(user_id, "alice".to_string(), 300, "test".to_string());
        let b = Claims::new(user_id, "alice".to_string(), 300, "test".to_string());

        assert_ne!(a.jti, b.jti);
        assert!(Uuid::parse_str(&a.jti).is_ok());
    }

    #[test]
    fn test_user_id_extraction() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "alice".to_string(), 300, "test".to_string());

        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = Claims::new(
            Uuid::new_v4(),
            "alice".to_string(),
            300,
            "test".to_string(),
        );
        claims.sub = "invalid-uuid".to_string();

        assert!(claims.user_id().is_err());
    }
}
