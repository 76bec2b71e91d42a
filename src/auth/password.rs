use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Length rule for new passwords, counted in characters.
pub fn validate_new_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// PHC-formatted argon2 hash with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            anyhow::anyhow!("hash password: {e}")
        })
}

/// Check a login attempt against the stored hash. Accounts created through
/// Google have no hash and never match.
pub fn matches_stored(plain: &str, stored: Option<&str>) -> anyhow::Result<bool> {
    let Some(stored) = stored else {
        return Ok(false);
    };
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!(error = %e, "stored password hash is unreadable");
        anyhow::anyhow!("parse password hash: {e}")
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
