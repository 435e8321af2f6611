//! # Identity Module
//!
//! One durable P-256 key pair per (user, device).
//!
//! ## Identity Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      IDENTITY LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  load_or_create_identity(uid)                                          │
//! │  ─────────────────────────────                                          │
//! │                                                                         │
//! │   stored pub + priv parse? ──yes──► return stored identity             │
//! │          │                                                              │
//! │          │ priv only ──► unwrap priv, rebuild pub, return              │
//! │          │                                                              │
//! │          │ neither ──► generate                                         │
//! │          │                                                              │
//! │          └ malformed ──► policy: Regenerate (warn) │ Fail (error)      │
//! │                                                                         │
//! │  generate                                                              │
//! │  ────────                                                               │
//! │   1. P-256 key pair from OsRng                                         │
//! │   2. wrap private JWK under the device key                             │
//! │   3. set_if_absent(priv)  ── lost the race? adopt the winner's key     │
//! │   4. set_if_absent(pub)                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The private record is written first and the public key is always
//! derivable from it, so a crash between steps 3 and 4 is repaired on the
//! next load instead of orphaning the identity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CorruptIdentityPolicy;
use crate::crypto::{EcJwk, EcdhPrivateKey, EcdhPublicKey, EncryptedPayload};
use crate::device::DeviceVault;
use crate::error::{Error, Result};
use crate::storage::{keys, KeyValueStore, KeyedLocks};

/// A user's identity on this device, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Public JWK, shared with peers through the signaling backend
    pub public_key: EcJwk,
    /// Private JWK wrapped under the device key
    pub encrypted_private_key: EncryptedPayload,
}

/// What the store currently holds for a uid
enum StoredIdentity {
    Valid(DeviceIdentity),
    PrivateOnly(EncryptedPayload),
    Absent,
    Corrupt(String),
}

/// Loads, creates and unwraps device identities
pub struct IdentityManager {
    store: Arc<dyn KeyValueStore>,
    vault: Arc<DeviceVault>,
    locks: Arc<KeyedLocks>,
    policy: CorruptIdentityPolicy,
}

impl IdentityManager {
    /// Create an identity manager
    ///
    /// `locks` should be shared with every other service writing to the
    /// same store so identity creation is serialized per uid.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        vault: Arc<DeviceVault>,
        locks: Arc<KeyedLocks>,
        policy: CorruptIdentityPolicy,
    ) -> Self {
        Self {
            store,
            vault,
            locks,
            policy,
        }
    }

    /// Return the identity for `uid`, generating one if none exists
    ///
    /// Idempotent: a valid stored identity is never replaced.
    pub async fn load_or_create_identity(&self, uid: &str) -> Result<DeviceIdentity> {
        let _guard = self.locks.lock(&keys::private_key(uid)).await;

        match self.load_stored(uid).await? {
            StoredIdentity::Valid(identity) => {
                tracing::debug!(uid, "Loaded device identity");
                Ok(identity)
            }
            StoredIdentity::PrivateOnly(wrapped) => self.repair_public_key(uid, wrapped).await,
            StoredIdentity::Absent => self.create(uid).await,
            StoredIdentity::Corrupt(reason) => match self.policy {
                CorruptIdentityPolicy::Fail => Err(Error::IdentityCorrupted(reason)),
                CorruptIdentityPolicy::Regenerate => {
                    tracing::warn!(
                        uid,
                        %reason,
                        "Stored identity is corrupted; generating a new one. \
                         Messages addressed to the old key can no longer be decrypted"
                    );
                    self.store.remove(&keys::public_key(uid)).await?;
                    self.store.remove(&keys::private_key(uid)).await?;
                    self.create(uid).await
                }
            },
        }
    }

    /// Unwrap and import the private key for `uid`
    ///
    /// ## Errors
    ///
    /// `IdentityUnavailable` when the wrapped key cannot be recovered on this
    /// device (missing or changed device salt, tampered record, key that
    /// does not match the stored public key). The caller should prompt the
    /// user to re-register.
    pub async fn get_private_key(&self, uid: &str) -> Result<EcdhPrivateKey> {
        let identity = self.load_or_create_identity(uid).await?;
        let key = self
            .unwrap_private_key(uid, &identity.encrypted_private_key)
            .await?;

        let stored_public = EcdhPublicKey::from_jwk(&identity.public_key)?;
        if key.public_key() != stored_public {
            return Err(Error::IdentityUnavailable(
                "Stored public key does not match the private key".into(),
            ));
        }

        Ok(key)
    }

    /// Import a peer's public JWK for key agreement
    pub fn public_key_from_jwk(&self, jwk: &EcJwk) -> Result<EcdhPublicKey> {
        crate::crypto::public_key_from_jwk(jwk)
    }

    /// Delete both identity records for `uid`
    ///
    /// Returns whether anything was deleted. The next
    /// [`load_or_create_identity`](Self::load_or_create_identity) generates a
    /// new key pair.
    pub async fn forget_identity(&self, uid: &str) -> Result<bool> {
        let _guard = self.locks.lock(&keys::private_key(uid)).await;

        let had_public = self.store.remove(&keys::public_key(uid)).await?;
        let had_private = self.store.remove(&keys::private_key(uid)).await?;

        if had_public || had_private {
            tracing::info!(uid, "Removed device identity");
        }
        Ok(had_public || had_private)
    }

    async fn load_stored(&self, uid: &str) -> Result<StoredIdentity> {
        let public = self.store.get(&keys::public_key(uid)).await?;
        let private = self.store.get(&keys::private_key(uid)).await?;

        let wrapped = match private.as_deref() {
            None => {
                return Ok(match public {
                    None => StoredIdentity::Absent,
                    Some(_) => StoredIdentity::Corrupt("Public key without private key".into()),
                })
            }
            Some(json) => match serde_json::from_str::<EncryptedPayload>(json) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    return Ok(StoredIdentity::Corrupt(format!(
                        "Private key record does not parse: {}",
                        e
                    )))
                }
            },
        };

        let Some(public) = public else {
            return Ok(StoredIdentity::PrivateOnly(wrapped));
        };

        match EcJwk::from_json(&public).and_then(|jwk| {
            EcdhPublicKey::from_jwk(&jwk)?;
            Ok(jwk)
        }) {
            Ok(public_key) => Ok(StoredIdentity::Valid(DeviceIdentity {
                public_key,
                encrypted_private_key: wrapped,
            })),
            Err(e) => Ok(StoredIdentity::Corrupt(format!(
                "Public key record is not a P-256 JWK: {}",
                e
            ))),
        }
    }

    async fn create(&self, uid: &str) -> Result<DeviceIdentity> {
        let key = EcdhPrivateKey::generate();
        let wrapped = self.vault.encrypt_json_for_device(&key.to_jwk(), uid).await?;
        let wrapped_json = serde_json::to_string(&wrapped)?;

        let stored = self
            .store
            .set_if_absent(&keys::private_key(uid), &wrapped_json)
            .await?;

        if stored != wrapped_json {
            tracing::debug!(uid, "Another writer created this identity first; adopting it");
            let theirs: EncryptedPayload = serde_json::from_str(&stored)?;
            return self.repair_public_key(uid, theirs).await;
        }

        let public_key = key.public_key().to_jwk();
        let identity = self.store_public_key(uid, public_key, wrapped).await?;

        tracing::info!(uid, fingerprint = %key.public_key().fingerprint(), "Generated device identity");
        Ok(identity)
    }

    async fn repair_public_key(
        &self,
        uid: &str,
        wrapped: EncryptedPayload,
    ) -> Result<DeviceIdentity> {
        let key = self.unwrap_private_key(uid, &wrapped).await?;
        tracing::debug!(uid, "Rebuilt public key from wrapped private key");
        self.store_public_key(uid, key.public_key().to_jwk(), wrapped)
            .await
    }

    async fn store_public_key(
        &self,
        uid: &str,
        public_key: EcJwk,
        wrapped: EncryptedPayload,
    ) -> Result<DeviceIdentity> {
        let stored = self
            .store
            .set_if_absent(&keys::public_key(uid), &public_key.to_json()?)
            .await?;
        let stored = EcJwk::from_json(&stored)?;

        if EcdhPublicKey::from_jwk(&stored)? != EcdhPublicKey::from_jwk(&public_key)? {
            return Err(Error::IdentityUnavailable(
                "Stored public key belongs to a different private key".into(),
            ));
        }

        Ok(DeviceIdentity {
            public_key: stored,
            encrypted_private_key: wrapped,
        })
    }

    async fn unwrap_private_key(
        &self,
        uid: &str,
        wrapped: &EncryptedPayload,
    ) -> Result<EcdhPrivateKey> {
        let jwk: EcJwk = self
            .vault
            .decrypt_json_for_device(wrapped, uid)
            .await
            .map_err(|e| Error::IdentityUnavailable(e.to_string()))?;

        EcdhPrivateKey::from_jwk(&jwk).map_err(|e| Error::IdentityUnavailable(e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
