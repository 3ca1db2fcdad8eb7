use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;

use crate::Error;

/// Hashes `plaintext` into a PHC string carrying its own fresh salt.
pub fn hash(plaintext: &str) -> Result<String, pbkdf2::password_hash::Error> {
    Ok(Pbkdf2
        .hash_password(plaintext.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

/// Malformed hashes never verify.
pub fn verify(plaintext: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Pbkdf2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn hash_blocking(plaintext: String) -> Result<String, Error> {
    let hashed = tokio::task::spawn_blocking(move || hash(&plaintext)).await??;
    Ok(hashed)
}

pub async fn verify_blocking(plaintext: String, hash: String) -> Result<bool, Error> {
    Ok(tokio::task::spawn_blocking(move || verify(&plaintext, &hash)).await?)
}
