//! # Error Handling
//!
//! Error types for the secure-chat crypto layer.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Identity Errors                                                   │
//! │  │   ├── IdentityUnavailable   - Private key cannot be unwrapped       │
//! │  │   ├── IdentityCorrupted     - Stored identity does not parse        │
//! │  │   └── KeyDerivationFailed   - PBKDF2 / HKDF failure                 │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── EncryptionFailed      - AES-GCM encryption failed             │
//! │  │   ├── DecryptionFailed      - Tag mismatch, bad hex, bad nonce      │
//! │  │   ├── InvalidKey            - Malformed or off-curve JWK            │
//! │  │   └── KeyExchangeFailed     - ECDH failed                           │
//! │  │                                                                      │
//! │  ├── Device Errors                                                     │
//! │  │   └── DeviceKeyUnavailable  - Device salt missing or malformed      │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StorageReadError      - Failed to read local storage          │
//! │  │   ├── StorageWriteError     - Failed to write local storage         │
//! │  │   └── Timeout               - Salt acquisition timed out            │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── SerializationError                                            │
//! │      ├── DeserializationError                                          │
//! │      └── Internal                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for secure-chat crypto operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity Errors (200-299)
    // ========================================================================

    /// The identity exists but its private key cannot be recovered on this
    /// device. Callers should prompt the user to re-register.
    #[error("Identity unavailable for this device: {0}")]
    IdentityUnavailable(String),

    /// Stored identity records are malformed and the configured policy
    /// forbids silent regeneration.
    #[error("Stored identity is corrupted: {0}")]
    IdentityCorrupted(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (message corrupted or key mismatch)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key format, curve or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key exchange failed
    #[error("Key exchange failed: {0}")]
    KeyExchangeFailed(String),

    // ========================================================================
    // Device Errors (350-359)
    // ========================================================================

    /// The device salt is missing or unreadable, so nothing wrapped under
    /// the device key can be recovered.
    #[error("Device key unavailable: {0}")]
    DeviceKeyUnavailable(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 200-299: Identity
    /// - 300-399: Crypto and device key
    /// - 400-499: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Identity (200-299)
            Error::IdentityUnavailable(_) => 200,
            Error::IdentityCorrupted(_) => 201,
            Error::KeyDerivationFailed(_) => 203,

            // Crypto (300-399)
            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed(_) => 301,
            Error::InvalidKey(_) => 304,
            Error::KeyExchangeFailed(_) => 305,
            Error::DeviceKeyUnavailable(_) => 350,

            // Storage (400-499)
            Error::StorageReadError(_) => 401,
            Error::StorageWriteError(_) => 402,
            Error::Timeout(_) => 410,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 902,
            Error::DeserializationError(_) => 903,
        }
    }

    /// Check if this error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::StorageReadError(_) | Error::StorageWriteError(_)
        )
    }

    /// Check if this error requires user action (re-registration, re-pairing)
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::IdentityUnavailable(_)
                | Error::IdentityCorrupted(_)
                | Error::DeviceKeyUnavailable(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::SerializationError(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageReadError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
