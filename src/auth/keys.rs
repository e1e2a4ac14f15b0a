/// Process Signing Key Material
///
/// Generates the Ed25519 keypair that backs access-token signing. The pair is
/// created once at startup from the OS CSPRNG and handed to the issuer; it is
/// never persisted, so a restart invalidates all outstanding access tokens.

use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

#[derive(Clone)]
pub struct SigningKeypair {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key: [u8; 32],
}

impl SigningKeypair {
    /// Generate a fresh keypair.
    ///
    /// # Errors
    /// Returns error if the private key cannot be encoded for the JWT
    /// encoder. Failure here is fatal at startup: without key material the
    /// process cannot serve tokens.
    pub fn generate() -> Result<Self, CryptoError> {
        let signing_key = SigningKey::generate(&mut OsRng);

        // jsonwebtoken wants the private half as PKCS#8 DER and the public
        // half as raw bytes.
        let pkcs8 = signing_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            encoding_key: EncodingKey::from_ed_der(pkcs8.as_bytes()),
            decoding_key: DecodingKey::from_ed_der(verifying_key.as_bytes()),
            public_key: verifying_key.to_bytes(),
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Short digest of the public key, for startup logs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.public_key);
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}
