use std::fmt;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, Secret};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid encrypted data format")]
    InvalidFormat,
}

/// Seals tenant Mercado Pago access tokens at rest.
///
/// Output layout is `[nonce (12 bytes)][ciphertext + tag]`. The tenant id is
/// bound as associated data, so a token copied onto another tenant's row
/// fails to open.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; 32],
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher").field("key", &"[REDACTED]").finish()
    }
}

impl TokenCipher {
    /// Derives the AES-256 key from the configured secret with SHA-256
    pub fn new(secret: &Secret<String>) -> Self {
        Self {
            key: derive_key(secret.expose_secret()),
        }
    }

    fn sealing_key(&self) -> Result<LessSafeKey, EncryptionError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| EncryptionError::EncryptionFailed("Invalid key".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn encrypt(&self, tenant_id: Uuid, token: &str) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::EncryptionFailed("Failed to generate nonce".to_string()))?;

        let key = self.sealing_key()?;
        let mut in_out = token.as_bytes().to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(tenant_id.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| EncryptionError::EncryptionFailed("Sealing failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);

        Ok(sealed)
    }

    pub fn decrypt(&self, tenant_id: Uuid, sealed: &[u8]) -> Result<String, EncryptionError> {
        if sealed.len() <= NONCE_LEN {
            return Err(EncryptionError::InvalidFormat);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| EncryptionError::InvalidFormat)?;

        let key = self.sealing_key()?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(tenant_id.as_bytes()), &mut in_out)
            .map_err(|_| EncryptionError::DecryptionFailed("Opening failed".to_string()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| EncryptionError::DecryptionFailed("Invalid UTF-8".to_string()))
    }
}

fn derive_key(key_string: &str) -> [u8; 32] {
    let hash = digest::digest(&digest::SHA256, key_string.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_ref());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(secret: &str) -> TokenCipher {
        TokenCipher::new(&Secret::new(secret.to_string()))
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher("test-encryption-key");
        let tenant = Uuid::new_v4();

        let sealed = cipher.encrypt(tenant, "APP_USR-1234").unwrap();
        assert_eq!(cipher.decrypt(tenant, &sealed).unwrap(), "APP_USR-1234");
    }

    #[test]
    fn test_encryption_is_non_deterministic() {
        let cipher = cipher("test-encryption-key");
        let tenant = Uuid::new_v4();

        let first = cipher.encrypt(tenant, "same").unwrap();
        let second = cipher.encrypt(tenant, "same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_token_is_bound_to_tenant() {
        let cipher = cipher("test-encryption-key");
        let sealed = cipher.encrypt(Uuid::new_v4(), "APP_USR-1234").unwrap();

        assert!(matches!(
            cipher.decrypt(Uuid::new_v4(), &sealed),
            Err(EncryptionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let tenant = Uuid::new_v4();
        let sealed = cipher("key-one").encrypt(tenant, "secret").unwrap();
        assert!(cipher("key-two").decrypt(tenant, &sealed).is_err());
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let cipher = cipher("test-encryption-key");
        assert_eq!(
            cipher.decrypt(Uuid::new_v4(), &[0u8; 12]),
            Err(EncryptionError::InvalidFormat)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", cipher("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
