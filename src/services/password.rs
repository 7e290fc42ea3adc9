use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

const ALGORITHM_TAG: &str = "pbkdf2_sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PasswordError {
    #[error("Password must be at least {} characters", MIN_PASSWORD_LEN)]
    TooShort,

    #[error("Failed to generate salt")]
    Rng,

    #[error("Malformed password hash")]
    MalformedHash,
}

pub fn validate_strength(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// Hashes a password as `pbkdf2_sha256$<iterations>$<salt hex>$<hash hex>`
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| PasswordError::Rng)?;

    let iterations = NonZeroU32::new(ITERATIONS).ok_or(PasswordError::MalformedHash)?;
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!(
        "{}${}${}${}",
        ALGORITHM_TAG,
        ITERATIONS,
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Constant-time check of `password` against a stored hash
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(tag), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordError::MalformedHash);
    };

    if tag != ALGORITHM_TAG {
        return Err(PasswordError::MalformedHash);
    }

    let iterations = iterations
        .parse::<u32>()
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or(PasswordError::MalformedHash)?;
    let salt = hex::decode(salt).map_err(|_| PasswordError::MalformedHash)?;
    let hash = hex::decode(hash).map_err(|_| PasswordError::MalformedHash)?;

    Ok(pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("pbkdf2_sha256$100000$"));
        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("wrong horse", &stored).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_malformed_hashes() {
        for stored in ["", "plaintext", "md5$1$00$00", "pbkdf2_sha256$0$00$00", "pbkdf2_sha256$10$zz$00"] {
            assert_eq!(
                verify_password("x", stored),
                Err(PasswordError::MalformedHash),
                "{stored}"
            );
        }
    }

    #[test]
    fn test_strength() {
        assert_eq!(validate_strength("short"), Err(PasswordError::TooShort));
        assert!(validate_strength("long enough").is_ok());
    }
}
