//! # Chat Crypto Session
//!
//! Caller-owned entry point bundling configuration, storage, the device
//! vault, the identity manager and the in-memory key caches.
//!
//! ## Message Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SESSION MESSAGE FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Alice                                                   Bob            │
//! │    │                                                      │             │
//! │    │── my_public_key("alice") ──► signaling ──────────────►│             │
//! │    │◄──────────────── signaling ◄── my_public_key("bob") ──│             │
//! │    │                                                      │             │
//! │    ▼                                                      ▼             │
//! │  shared_key("alice", bob_jwk)            shared_key("bob", alice_jwk)  │
//! │    │           (ECDH + HKDF, cached per peer)             │             │
//! │    ▼                                                      ▼             │
//! │  encrypt_for_peer ──────── { iv, data } ────────► decrypt_from_peer    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Caches live only as long as the session. Nothing derived from ECDH is
//! ever persisted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ChatCryptoConfig;
use crate::crypto::{
    decrypt_with_key, derive_shared_aes_key_with_labels, encrypt_with_key, EcJwk,
    EcdhPrivateKey, EcdhPublicKey, EncryptedPayload, EncryptionKey,
};
use crate::device::{DeviceVault, LocalDeviceKeyStore};
use crate::error::{Error, Result};
use crate::identity::{DeviceIdentity, IdentityManager};
use crate::storage::{FileStore, KeyValueStore, KeyedLocks, MemoryStore};

/// Cache id for a conversation key
///
/// Both public keys are in canonical SEC1 form, so a regenerated identity
/// or a differently padded peer JWK never aliases another entry.
#[derive(Clone, PartialEq, Eq, Hash)]
struct SharedKeyId {
    uid: String,
    own: Vec<u8>,
    peer: Vec<u8>,
}

/// Secure-chat crypto for one device
pub struct ChatCryptoSession {
    config: ChatCryptoConfig,
    store: Arc<dyn KeyValueStore>,
    vault: Arc<DeviceVault>,
    identities: IdentityManager,
    private_keys: Mutex<HashMap<String, EcdhPrivateKey>>,
    shared_keys: Mutex<HashMap<SharedKeyId, EncryptionKey>>,
}

impl ChatCryptoSession {
    /// Create a session over any key-value store
    pub fn new(store: Arc<dyn KeyValueStore>, config: ChatCryptoConfig) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let salts = Arc::new(LocalDeviceKeyStore::with_locks(
            Arc::clone(&store),
            Arc::clone(&locks),
        ));
        let vault = Arc::new(DeviceVault::new(salts, &config));
        let identities = IdentityManager::new(
            Arc::clone(&store),
            Arc::clone(&vault),
            locks,
            config.corrupt_identity_policy,
        );

        Self {
            config,
            store,
            vault,
            identities,
            private_keys: Mutex::new(HashMap::new()),
            shared_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session backed by process memory
    pub fn in_memory(config: ChatCryptoConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Create a session backed by a JSON file
    pub async fn open_file(path: impl AsRef<Path>, config: ChatCryptoConfig) -> Result<Self> {
        let store = FileStore::open(path).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// Active configuration
    pub fn config(&self) -> &ChatCryptoConfig {
        &self.config
    }

    /// Underlying key-value store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Device vault, for wrapping other per-user secrets
    pub fn vault(&self) -> &DeviceVault {
        &self.vault
    }

    /// Identity manager
    pub fn identities(&self) -> &IdentityManager {
        &self.identities
    }

    /// Load or create the identity for `uid`
    pub async fn identity(&self, uid: &str) -> Result<DeviceIdentity> {
        self.identities.load_or_create_identity(uid).await
    }

    /// Public JWK to publish for `uid`, creating the identity on first use
    pub async fn my_public_key(&self, uid: &str) -> Result<EcJwk> {
        Ok(self.identity(uid).await?.public_key)
    }

    /// Private key for `uid`, unwrapped once per identity
    ///
    /// The stored identity is re-read on every call. If it was regenerated
    /// since the key was cached, everything cached for `uid` is dropped.
    pub async fn private_key(&self, uid: &str) -> Result<EcdhPrivateKey> {
        let identity = self.identity(uid).await?;
        let current = EcdhPublicKey::from_jwk(&identity.public_key)?;

        let cached = self.private_keys.lock().get(uid).cloned();
        if let Some(key) = cached {
            if key.public_key() == current {
                return Ok(key);
            }
            tracing::info!(uid, "Identity changed; dropping cached keys");
            self.evict(uid);
        }

        let key = self.identities.get_private_key(uid).await?;
        self.private_keys.lock().insert(uid.to_string(), key.clone());
        Ok(key)
    }

    /// Conversation key between `uid` and the peer holding `peer_public`
    pub async fn shared_key(&self, uid: &str, peer_public: &EcJwk) -> Result<EncryptionKey> {
        let peer = self
            .identities
            .public_key_from_jwk(peer_public)
            .map_err(|e| Error::KeyExchangeFailed(format!("Peer key rejected: {}", e)))?;
        let private = self.private_key(uid).await?;

        let id = SharedKeyId {
            uid: uid.to_string(),
            own: private.public_key().to_sec1_bytes(),
            peer: peer.to_sec1_bytes(),
        };
        let cached = self.shared_keys.lock().get(&id).cloned();
        if let Some(key) = cached {
            return Ok(key);
        }

        let key = derive_shared_aes_key_with_labels(
            &private,
            peer_public,
            &self.config.shared_key_salt,
            &self.config.shared_key_info,
        )?;

        tracing::debug!(uid, "Derived conversation key");
        self.shared_keys.lock().insert(id, key.clone());
        Ok(key)
    }

    /// Encrypt `plaintext` from `uid` to the peer holding `peer_public`
    pub async fn encrypt_for_peer(
        &self,
        uid: &str,
        peer_public: &EcJwk,
        plaintext: &str,
    ) -> Result<EncryptedPayload> {
        let key = self.shared_key(uid, peer_public).await?;
        encrypt_with_key(plaintext, &key)
    }

    /// Decrypt a message sent to `uid` by the peer holding `peer_public`
    pub async fn decrypt_from_peer(
        &self,
        uid: &str,
        peer_public: &EcJwk,
        payload: &EncryptedPayload,
    ) -> Result<String> {
        let key = self.shared_key(uid, peer_public).await?;
        decrypt_with_key(payload, &key)
    }

    /// Delete the identity for `uid` and drop everything cached for it
    pub async fn forget(&self, uid: &str) -> Result<bool> {
        self.evict(uid);
        self.identities.forget_identity(uid).await
    }

    /// Drop all cached keys
    pub fn clear_cache(&self) {
        self.private_keys.lock().clear();
        self.shared_keys.lock().clear();
    }

    /// Number of cached conversation keys
    pub fn cached_shared_keys(&self) -> usize {
        self.shared_keys.lock().len()
    }

    fn evict(&self, uid: &str) {
        self.private_keys.lock().remove(uid);
        self.shared_keys.lock().retain(|id, _| id.uid != uid);
    }
}

impl std::fmt::Debug for ChatCryptoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCryptoSession")
            .field("config", &self.config)
            .field("cached_private_keys", &self.private_keys.lock().len())
            .field("cached_shared_keys", &self.shared_keys.lock().len())
            .finish()
    }
}
