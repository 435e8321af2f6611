//! Legacy password-based message encryption.
//!
//! Both sides share a textual secret out of band and derive a static key
//! with PBKDF2. There is no forward secrecy: anyone who learns the password
//! can read every past and future message. Kept for conversations created
//! before device identities existed; new conversations use
//! [`derive_shared_aes_key`](super::derive_shared_aes_key).

use super::encryption::{decrypt_with_key, encrypt_with_key, EncryptedPayload, EncryptionKey};
use super::kdf::{self, domain, PBKDF2_ITERATIONS};
use crate::error::Result;

/// Derive the legacy key for `password` with the default label and rounds
pub fn password_key(password: &str) -> Result<EncryptionKey> {
    kdf::derive_password_key(password, domain::LEGACY_PASSWORD_SALT, PBKDF2_ITERATIONS)
}

/// Encrypt a message under a shared password
pub fn encrypt_message(plaintext: &str, password: &str) -> Result<EncryptedPayload> {
    let key = password_key(password)?;
    encrypt_with_key(plaintext, &key)
}

/// Decrypt a message encrypted with [`encrypt_message`]
pub fn decrypt_message(payload: &EncryptedPayload, password: &str) -> Result<String> {
    let key = password_key(password)?;
    decrypt_with_key(payload, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_password_round_trip() {
        let payload = encrypt_message("meet at noon", "correct horse").unwrap();
        assert_eq!(decrypt_message(&payload, "correct horse").unwrap(), "meet at noon");
    }

    #[test]
    fn test_wrong_password_fails() {
        let payload = encrypt_message("meet at noon", "correct horse").unwrap();
        assert!(matches!(
            decrypt_message(&payload, "battery staple"),
            Err(Error::DecryptionFailed(_))
        ));
    }
}
