//! # Encryption Module
//!
//! AES-256-GCM for message confidentiality and integrity.
//!
//! ## Payload Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENCRYPTED PAYLOAD                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  { "iv":   hex(12-byte random nonce),                                  │
//! │    "data": hex(ciphertext || 16-byte auth tag) }                       │
//! │                                                                         │
//! │  The same shape is used for chat messages, for the legacy              │
//! │  password path and for secrets wrapped under the device key.           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | Only holders of the key can read the message |
//! | Integrity | Any modification of `iv` or `data` is detected |
//! | Nonce freshness | Every call draws a new 96-bit nonce from `OsRng` |

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A nonce (number used once) for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce with the same key!**
///
/// Nonce reuse under AES-GCM leaks the XOR of plaintexts and lets an
/// attacker forge tags. Random 96-bit nonces are safe for up to 2^32
/// messages per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        use p256::elliptic_curve::subtle::ConstantTimeEq;
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for EncryptionKey {}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Hex-encoded `{iv, data}` pair produced by every encrypt call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Hex-encoded 12-byte nonce
    pub iv: String,
    /// Hex-encoded ciphertext with the authentication tag appended
    pub data: String,
}

impl EncryptedPayload {
    /// Build from a nonce and raw ciphertext
    pub fn new(nonce: &Nonce, ciphertext: &[u8]) -> Self {
        Self {
            iv: hex::encode(nonce.as_bytes()),
            data: hex::encode(ciphertext),
        }
    }

    /// Decode the hex fields back into a nonce and ciphertext
    ///
    /// Any malformation is reported as `DecryptionFailed`: a payload that
    /// cannot be decoded is indistinguishable from a corrupted message.
    pub fn decode(&self) -> Result<(Nonce, Vec<u8>)> {
        let iv = hex::decode(&self.iv)
            .map_err(|e| Error::DecryptionFailed(format!("Invalid iv hex: {}", e)))?;
        let nonce: [u8; NONCE_SIZE] = iv.try_into().map_err(|v: Vec<u8>| {
            Error::DecryptionFailed(format!(
                "Invalid iv length: expected {} bytes, got {}",
                NONCE_SIZE,
                v.len()
            ))
        })?;

        let data = hex::decode(&self.data)
            .map_err(|e| Error::DecryptionFailed(format!("Invalid data hex: {}", e)))?;
        if data.len() < TAG_SIZE {
            return Err(Error::DecryptionFailed("Ciphertext shorter than tag".into()));
        }

        Ok((Nonce::from_bytes(nonce), data))
    }
}

/// Encrypt bytes using AES-256-GCM
///
/// ## Returns
///
/// Tuple of (nonce, ciphertext_with_tag)
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))?;

    Ok((nonce, ciphertext))
}

/// Decrypt bytes using AES-256-GCM
///
/// ## Errors
///
/// Returns `DecryptionFailed` if:
/// - The ciphertext was tampered with
/// - The AAD doesn't match
/// - The key is wrong
/// - The nonce is wrong
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|_| {
            Error::DecryptionFailed("Decryption failed: authentication tag mismatch".into())
        })
}

/// Encrypt raw bytes into a hex payload (no associated data)
pub fn encrypt_bytes(key: &EncryptionKey, plaintext: &[u8]) -> Result<EncryptedPayload> {
    let (nonce, ciphertext) = encrypt(key, plaintext, &[])?;
    Ok(EncryptedPayload::new(&nonce, &ciphertext))
}

/// Decrypt a hex payload into raw bytes
pub fn decrypt_bytes(key: &EncryptionKey, payload: &EncryptedPayload) -> Result<Vec<u8>> {
    let (nonce, ciphertext) = payload.decode()?;
    decrypt(key, &nonce, &ciphertext, &[])
}

/// Encrypt a UTF-8 message with a derived key
///
/// A fresh random nonce is drawn on every call, so encrypting the same text
/// twice yields two different payloads.
pub fn encrypt_with_key(plaintext: &str, key: &EncryptionKey) -> Result<EncryptedPayload> {
    encrypt_bytes(key, plaintext.as_bytes())
}

/// Decrypt a payload produced by [`encrypt_with_key`]
///
/// Fails with `DecryptionFailed` on tag mismatch, malformed hex, wrong nonce
/// length, or plaintext that is not valid UTF-8.
pub fn decrypt_with_key(payload: &EncryptedPayload, key: &EncryptionKey) -> Result<String> {
    let plaintext = decrypt_bytes(key, payload)?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::DecryptionFailed("Plaintext is not valid UTF-8".into()))
}

// ============================================================================
// TESTS
// ============================================================================
