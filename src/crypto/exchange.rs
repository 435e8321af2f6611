//! # Shared-Key Derivation
//!
//! Two devices compute the same AES key without ever sending it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SHARED KEY DERIVATION                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Import peer public JWK (P-256, on-curve check)                     │
//! │                                                                         │
//! │  2. ECDH: my_private × peer_public → 32-byte x-coordinate              │
//! │                                                                         │
//! │  3. HKDF-SHA256(salt="liber_secure_chat_v1", info="conn_shared_key")   │
//! │        → 32-byte AES-256-GCM key                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The raw ECDH output is never used as a key directly.

use super::encryption::EncryptionKey;
use super::kdf::{self, domain};
use super::keys::{EcJwk, EcdhPrivateKey, EcdhPublicKey};
use crate::error::{Error, Result};

/// Import a peer's public JWK as a key-agreement-only key
pub fn public_key_from_jwk(jwk: &EcJwk) -> Result<EcdhPublicKey> {
    EcdhPublicKey::from_jwk(jwk)
}

/// Derive the conversation key with the default labels
pub fn derive_shared_aes_key(
    my_private: &EcdhPrivateKey,
    peer_public_jwk: &EcJwk,
) -> Result<EncryptionKey> {
    derive_shared_aes_key_with_labels(
        my_private,
        peer_public_jwk,
        domain::SHARED_KEY_SALT,
        domain::SHARED_KEY_INFO,
    )
}

/// Derive the conversation key with explicit HKDF labels
pub fn derive_shared_aes_key_with_labels(
    my_private: &EcdhPrivateKey,
    peer_public_jwk: &EcJwk,
    salt: &str,
    info: &str,
) -> Result<EncryptionKey> {
    let peer = public_key_from_jwk(peer_public_jwk)
        .map_err(|e| Error::KeyExchangeFailed(format!("Peer key rejected: {}", e)))?;

    let raw = my_private.diffie_hellman(&peer);
    kdf::derive_shared_key(&raw[..], salt, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{decrypt_with_key, encrypt_with_key};

    #[test]
    fn test_both_sides_derive_same_key() {
        let alice = EcdhPrivateKey::generate();
        let bob = EcdhPrivateKey::generate();

        let k_ab = derive_shared_aes_key(&alice, &bob.public_key().to_jwk()).unwrap();
        let k_ba = derive_shared_aes_key(&bob, &alice.public_key().to_jwk()).unwrap();

        assert_eq!(k_ab, k_ba);
    }

    #[test]
    fn test_third_party_derives_different_key() {
        let alice = EcdhPrivateKey::generate();
        let bob = EcdhPrivateKey::generate();
        let eve = EcdhPrivateKey::generate();

        let k_ab = derive_shared_aes_key(&alice, &bob.public_key().to_jwk()).unwrap();
        let k_eb = derive_shared_aes_key(&eve, &bob.public_key().to_jwk()).unwrap();

        assert_ne!(k_ab, k_eb);
    }

    #[test]
    fn test_hello_scenario() {
        let alice = EcdhPrivateKey::generate();
        let bob = EcdhPrivateKey::generate();

        let k_ab = derive_shared_aes_key(&alice, &bob.public_key().to_jwk()).unwrap();
        let payload = encrypt_with_key("hello", &k_ab).unwrap();

        let k_ba = derive_shared_aes_key(&bob, &alice.public_key().to_jwk()).unwrap();
        assert_eq!(decrypt_with_key(&payload, &k_ba).unwrap(), "hello");
    }

    #[test]
    fn test_bad_peer_key_is_exchange_failure() {
        let alice = EcdhPrivateKey::generate();
        let mut jwk = EcdhPrivateKey::generate().public_key().to_jwk();
        jwk.x = "AAAA".into();

        assert!(matches!(
            derive_shared_aes_key(&alice, &jwk),
            Err(Error::KeyExchangeFailed(_))
        ));
    }
}
