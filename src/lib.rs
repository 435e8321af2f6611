//! # Liber Chat Crypto
//!
//! End-to-end encryption for Liber secure chat: durable per-device ECDH
//! identities, per-conversation keys and authenticated message encryption.
//! Transport (signaling, WebRTC) is out of scope; this crate only produces
//! and consumes `{ iv, data }` payloads and public JWKs.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LIBER CHAT CRYPTO MODULES                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                        ChatCryptoSession                         │  │
//! │  │   my_public_key · shared_key · encrypt_for_peer · decrypt_from_peer │
//! │  └──────────┬──────────────────────┬──────────────────────┬─────────┘  │
//! │             │                      │                      │            │
//! │  ┌──────────▼─────────┐  ┌─────────▼─────────┐  ┌─────────▼─────────┐  │
//! │  │      Identity      │  │      Device       │  │      Crypto       │  │
//! │  │                    │  │                   │  │                   │  │
//! │  │ - Load or create   │─►│ - Device salt     │─►│ - P-256 ECDH      │  │
//! │  │ - Unwrap private   │  │ - PBKDF2 wrap key │  │ - HKDF / PBKDF2   │  │
//! │  │ - Corruption policy│  │ - JSON vault      │  │ - AES-256-GCM     │  │
//! │  └──────────┬─────────┘  └─────────┬─────────┘  └───────────────────┘  │
//! │             │                      │                                   │
//! │  ┌──────────▼──────────────────────▼─────────┐                         │
//! │  │                  Storage                  │                         │
//! │  │  KeyValueStore · MemoryStore · FileStore  │                         │
//! │  └───────────────────────────────────────────┘                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type and codes
//! - [`config`] - Runtime configuration
//! - [`crypto`] - Keys, key derivation, message encryption
//! - [`storage`] - Key-value persistence and per-key locks
//! - [`device`] - Device salt and device-scoped encryption
//! - [`identity`] - Per-user, per-device ECDH identity
//! - [`session`] - Caller-owned session with key caches
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Message Encryption (P-256 ECDH + HKDF + AES-256-GCM)         │
//! │  ─────────────────────────────────────────────────────────              │
//! │  Each conversation key is derived from one side's private key and      │
//! │  the other side's public key. Only the two peers can compute it.       │
//! │                                                                         │
//! │  Layer 2: Identity at Rest (PBKDF2 + AES-256-GCM)                      │
//! │  ──────────────────────────────────────────────────                     │
//! │  Private keys are stored wrapped under a key derived from the user id  │
//! │  and a random device salt. Copying the identity record alone to        │
//! │  another device does not reveal the key.                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use liber_chat_crypto::{ChatCryptoConfig, ChatCryptoSession};
//!
//! let session = ChatCryptoSession::in_memory(ChatCryptoConfig::default());
//! let my_jwk = session.my_public_key("alice").await?;
//! // publish my_jwk, receive peer_jwk
//! let payload = session.encrypt_for_peer("alice", &peer_jwk, "hello").await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod identity;
pub mod session;
pub mod storage;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{ChatCryptoConfig, CorruptIdentityPolicy};
pub use crypto::{EcJwk, EcdhPrivateKey, EcdhPublicKey, EncryptedPayload, EncryptionKey};
pub use device::{DeviceKeyStore, DeviceVault, LocalDeviceKeyStore};
pub use error::{Error, Result};
pub use identity::{DeviceIdentity, IdentityManager};
pub use session::ChatCryptoSession;
pub use storage::{FileStore, KeyValueStore, MemoryStore};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
        assert!(v.contains('.'));
    }
}
