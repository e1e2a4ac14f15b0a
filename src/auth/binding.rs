/// Device-binding digest
///
/// Sessions record a digest of the client user agent and IP at creation.
/// Refreshes recompute it; divergence on a row that carries a digest is a
/// reuse signal strong enough to burn the whole family.

use sha2::{Digest, Sha256};

/// SHA-256 hex over `user_agent + "|" + ip`, with the empty string standing
/// in for an absent part. The digest is therefore always defined.
pub fn device_binding_hash(user_agent: Option<&str>, ip: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(ip.unwrap_or("").as_bytes());
    format!("{:x}", hasher.finalize())
}
