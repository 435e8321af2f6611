//! # Cryptography Module
//!
//! All cryptographic primitives used by secure chat.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Device salt (16 random bytes, local only)                             │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  PBKDF2-SHA256 ──► Device wrapping key ──► wraps identity private JWK  │
//! │                                                                         │
//! │  Identity (P-256 ECDH key pair, one per user per device)               │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  my_private × peer_public ──► HKDF-SHA256 ──► Conversation key         │
//! │                                                      │                 │
//! │                                                      ▼                 │
//! │                                 AES-256-GCM, random 96-bit nonce       │
//! │                                 { iv: hex, data: hex }                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Why |
//! |-----------|---------|-----|
//! | P-256 ECDH | Key agreement | Same curve as the WebCrypto client |
//! | HKDF-SHA256 | Conversation key | Domain-separates the raw ECDH output |
//! | PBKDF2-SHA256 | Device wrap, legacy path | Matches existing stored secrets |
//! | AES-256-GCM | Messages, wrapped secrets | AEAD, hardware accelerated |

mod encryption;
mod exchange;
pub mod kdf;
mod keys;
mod password;

pub use encryption::{
    decrypt, decrypt_bytes, decrypt_with_key, encrypt, encrypt_bytes, encrypt_with_key,
    EncryptedPayload, EncryptionKey, Nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use exchange::{derive_shared_aes_key, derive_shared_aes_key_with_labels, public_key_from_jwk};
pub use keys::{EcJwk, EcdhPrivateKey, EcdhPublicKey, JWK_CRV_P256, JWK_KTY_EC};
pub use password::{decrypt_message, encrypt_message, password_key};
