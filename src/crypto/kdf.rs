//! # Key Derivation Functions
//!
//! Every symmetric key in the crate comes out of one of these functions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION PATHS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Device wrapping key                                                   │
//! │    PBKDF2-HMAC-SHA256(                                                 │
//! │      password   = "<uid>:<device_salt_hex>",                           │
//! │      salt       = "liber_device_wrap_v1",                              │
//! │      iterations = 100_000 )              → 32-byte AES-256-GCM key     │
//! │                                                                         │
//! │  Legacy password key                                                   │
//! │    PBKDF2-HMAC-SHA256(                                                 │
//! │      password   = shared chat password,                                │
//! │      salt       = "liber_secure_chat_legacy_v1",                       │
//! │      iterations = 100_000 )              → 32-byte AES-256-GCM key     │
//! │                                                                         │
//! │  Conversation key                                                      │
//! │    HKDF-SHA256(                                                        │
//! │      ikm  = P-256 ECDH x-coordinate,                                   │
//! │      salt = "liber_secure_chat_v1",                                    │
//! │      info = "conn_shared_key" )          → 32-byte AES-256-GCM key     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The salt and info labels are part of the wire contract: changing any of
//! them makes previously wrapped secrets and previously derived
//! conversation keys unreachable.

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::encryption::{EncryptionKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Domain separation labels
pub mod domain {
    /// HKDF salt for conversation keys
    pub const SHARED_KEY_SALT: &str = "liber_secure_chat_v1";

    /// HKDF info for conversation keys
    pub const SHARED_KEY_INFO: &str = "conn_shared_key";

    /// PBKDF2 salt for the device wrapping key
    pub const DEVICE_WRAP_SALT: &str = "liber_device_wrap_v1";

    /// PBKDF2 salt for the legacy password path
    pub const LEGACY_PASSWORD_SALT: &str = "liber_secure_chat_legacy_v1";
}

/// PBKDF2 iteration count shared by the device wrap and the legacy path
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Run PBKDF2-HMAC-SHA256 into an AES-256 key
pub fn pbkdf2_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<EncryptionKey> {
    if iterations == 0 {
        return Err(Error::KeyDerivationFailed(
            "PBKDF2 iteration count must be non-zero".into(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key[..]);
    Ok(EncryptionKey::from_bytes(*key))
}

/// Derive the device-scoped wrapping key for `uid`
pub fn derive_device_key(
    uid: &str,
    device_salt_hex: &str,
    label: &str,
    iterations: u32,
) -> Result<EncryptionKey> {
    let password = Zeroizing::new(format!("{}:{}", uid, device_salt_hex));
    pbkdf2_key(password.as_bytes(), label.as_bytes(), iterations)
}

/// Derive the legacy password-based message key
pub fn derive_password_key(password: &str, label: &str, iterations: u32) -> Result<EncryptionKey> {
    pbkdf2_key(password.as_bytes(), label.as_bytes(), iterations)
}

/// Expand a raw ECDH secret into a conversation key
pub fn derive_shared_key(
    raw_secret: &[u8],
    salt: &str,
    info: &str,
) -> Result<EncryptionKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_bytes()), raw_secret);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(info.as_bytes(), &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

    Ok(EncryptionKey::from_bytes(*key))
}

// ============================================================================
// TESTS
// ============================================================================
