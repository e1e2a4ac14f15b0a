/// Authentication primitives module
///
/// Key material, access-token issuance, refresh-token digests, password
/// hashing, device binding, and login admission. The session engine wires
/// these together; nothing here touches the store.

mod binding;
mod claims;
mod jwt;
mod keys;
mod password;
mod rate_limit;
mod refresh_token;

pub use binding::device_binding_hash;
pub use claims::Claims;
pub use jwt::AccessTokenIssuer;
pub use jwt::SignedAccessToken;
pub use keys::SigningKeypair;
pub use password::PasswordHasher;
pub use rate_limit::RateLimiter;
pub use refresh_token::RefreshTokenBundle;
pub use refresh_token::RefreshTokenCodec;
