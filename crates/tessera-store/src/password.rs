//! Password hashing for `Password` fields.

use crate::error::{RecordError, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use rand::RngCore;
use rand::rngs::OsRng;

/// PHC / modular-crypt prefixes of hashes we recognise.
const HASH_PREFIXES: [&str; 4] = ["$argon2", "$2a$", "$2b$", "$2y$"];

/// True if the value is already a password hash.
pub fn is_hashed(value: &str) -> bool {
    HASH_PREFIXES.iter().any(|prefix| value.starts_with(prefix))
}

/// Hashes `password` with Argon2id unless it is already hashed.
pub fn hash_if_needed(password: &str) -> Result<String> {
    if is_hashed(password) {
        return Ok(password.to_string());
    }

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| RecordError::internal(format!("salt encoding failed: {e}")))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RecordError::internal(format!("password hashing failed: {e}")))
}
