//! # Device-Scoped Storage Encryption
//!
//! Protects secrets at rest with a key that never leaves the device.
//!
//! ## Wrapping Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DEVICE WRAPPING                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Device salt (created once, first writer wins)                 │
//! │    secure_chat_device_salt_v1 = hex(16 random bytes)                   │
//! │                                                                         │
//! │  Step 2: Wrapping key                                                  │
//! │    PBKDF2-SHA256("<uid>:<salt_hex>", "liber_device_wrap_v1", 100_000)  │
//! │                                                                         │
//! │  Step 3: AES-256-GCM over the JSON serialization                       │
//! │    → { iv, data }                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Salt Lifetime
//!
//! The salt is device-wide mutable state. It is created lazily and never
//! rotated: replacing it orphans every secret wrapped under it. A salt that
//! exists but does not decode is reported as `DeviceKeyUnavailable` and left
//! in place.

mod salt;

pub use salt::{DeviceKeyStore, DeviceSalt, LocalDeviceKeyStore, DEVICE_SALT_SIZE};

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use crate::config::ChatCryptoConfig;
use crate::crypto::{decrypt_bytes, encrypt_bytes, kdf, EncryptedPayload, EncryptionKey};
use crate::error::{Error, Result};

/// Encrypts and decrypts JSON values under the device-scoped key
pub struct DeviceVault {
    salts: Arc<dyn DeviceKeyStore>,
    label: String,
    iterations: u32,
    salt_timeout: Option<Duration>,
}

impl DeviceVault {
    /// Create a vault over a device key store
    pub fn new(salts: Arc<dyn DeviceKeyStore>, config: &ChatCryptoConfig) -> Self {
        Self {
            salts,
            label: config.device_wrap_label.clone(),
            iterations: config.device_wrap_iterations,
            salt_timeout: config.salt_timeout,
        }
    }

    /// Serialize `obj` to JSON and encrypt it for `uid` on this device
    ///
    /// Creates the device salt if this is the first secret on the device.
    pub async fn encrypt_json_for_device<T: Serialize + ?Sized>(
        &self,
        obj: &T,
        uid: &str,
    ) -> Result<EncryptedPayload> {
        let salt = self.acquire_salt().await?;
        let key = self.device_key(uid, &salt).await?;

        let json = Zeroizing::new(serde_json::to_vec(obj)?);
        encrypt_bytes(&key, &json)
    }

    /// Decrypt a payload produced by [`encrypt_json_for_device`](Self::encrypt_json_for_device)
    ///
    /// ## Errors
    ///
    /// - `DeviceKeyUnavailable` if the device salt is missing or malformed
    /// - `DecryptionFailed` if the tag does not verify (wrong uid, different
    ///   device salt, tampering)
    /// - `DeserializationError` if the plaintext is not a `T`
    pub async fn decrypt_json_for_device<T: DeserializeOwned>(
        &self,
        payload: &EncryptedPayload,
        uid: &str,
    ) -> Result<T> {
        let salt = self
            .salts
            .get_salt()
            .await?
            .ok_or_else(|| Error::DeviceKeyUnavailable("No device salt on this device".into()))?;
        let key = self.device_key(uid, &salt).await?;

        let json = Zeroizing::new(decrypt_bytes(&key, payload)?);
        serde_json::from_slice(&json)
            .map_err(|e| Error::DeserializationError(format!("Wrapped value: {}", e)))
    }

    async fn acquire_salt(&self) -> Result<DeviceSalt> {
        match self.salt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.salts.get_or_create_salt())
                .await
                .map_err(|_| {
                    Error::Timeout(format!("Device salt not available after {:?}", limit))
                })?,
            None => self.salts.get_or_create_salt().await,
        }
    }

    /// PBKDF2 runs on the blocking pool so other tasks keep running
    async fn device_key(&self, uid: &str, salt: &DeviceSalt) -> Result<EncryptionKey> {
        let uid = uid.to_string();
        let salt_hex = salt.to_hex();
        let label = self.label.clone();
        let iterations = self.iterations;

        tokio::task::spawn_blocking(move || {
            kdf::derive_device_key(&uid, &salt_hex, &label, iterations)
        })
        .await
        .map_err(|e| Error::KeyDerivationFailed(format!("Key derivation task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, KeyValueStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> ChatCryptoConfig {
        ChatCryptoConfig::default().with_device_wrap_iterations(1_000)
    }

    fn vault_over(store: Arc<MemoryStore>) -> DeviceVault {
        vault_over_config(store, &fast_config())
    }

    fn vault_over_config(store: Arc<MemoryStore>, config: &ChatCryptoConfig) -> DeviceVault {
        let salts = Arc::new(LocalDeviceKeyStore::new(store));
        DeviceVault::new(salts, config)
    }

    #[tokio::test]
    async fn test_round_trip_arbitrary_json() {
        let vault = vault_over(Arc::new(MemoryStore::new()));
        let values = [
            json!({"kty": "EC", "d": "secret"}),
            json!([1, 2, 3]),
            json!("plain string"),
            json!(null),
            json!({"nested": {"deep": [true, false, 1.5]}}),
        ];

        for value in values {
            let payload = vault.encrypt_json_for_device(&value, "alice").await.unwrap();
            let restored: serde_json::Value =
                vault.decrypt_json_for_device(&payload, "alice").await.unwrap();
            assert_eq!(restored, value);
        }
    }

    #[tokio::test]
    async fn test_first_use_creates_salt() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_over(Arc::clone(&store));

        assert!(store.get(keys::DEVICE_SALT).await.unwrap().is_none());
        vault.encrypt_json_for_device(&json!(1), "alice").await.unwrap();

        let salt = store.get(keys::DEVICE_SALT).await.unwrap().unwrap();
        assert_eq!(salt.len(), DEVICE_SALT_SIZE * 2);
    }

    #[tokio::test]
    async fn test_wrong_uid_fails() {
        let vault = vault_over(Arc::new(MemoryStore::new()));
        let payload = vault.encrypt_json_for_device(&json!("x"), "alice").await.unwrap();

        let result: Result<serde_json::Value> = vault.decrypt_json_for_device(&payload, "bob").await;
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_salt_is_device_key_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_over(Arc::clone(&store));
        let payload = vault.encrypt_json_for_device(&json!("x"), "alice").await.unwrap();

        store.remove(keys::DEVICE_SALT).await.unwrap();

        let result: Result<serde_json::Value> =
            vault.decrypt_json_for_device(&payload, "alice").await;
        assert!(matches!(result, Err(Error::DeviceKeyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_tampered_payload_fails() {
        let vault = vault_over(Arc::new(MemoryStore::new()));
        let mut payload = vault.encrypt_json_for_device(&json!("x"), "alice").await.unwrap();

        let mut raw = hex::decode(&payload.data).unwrap();
        raw[0] ^= 0x80;
        payload.data = hex::encode(raw);

        let result: Result<serde_json::Value> =
            vault.decrypt_json_for_device(&payload, "alice").await;
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[tokio::test]
    async fn test_derivation_does_not_stall_runtime() {
        // Single-threaded runtime: the ticker only runs if the vault yields
        let config = fast_config().with_device_wrap_iterations(200_000);
        let vault = vault_over_config(Arc::new(MemoryStore::new()), &config);
        let ticks = Arc::new(AtomicUsize::new(0));

        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        vault.encrypt_json_for_device(&json!("x"), "alice").await.unwrap();
        let during = ticks.load(Ordering::SeqCst);
        ticker.abort();

        assert!(during > 0);
    }

    struct StalledSalts;

    #[async_trait]
    impl DeviceKeyStore for StalledSalts {
        async fn get_salt(&self) -> Result<Option<DeviceSalt>> {
            Ok(None)
        }

        async fn get_or_create_salt(&self) -> Result<DeviceSalt> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_salt_timeout() {
        let config = fast_config().with_salt_timeout(Some(Duration::from_millis(20)));
        let vault = DeviceVault::new(Arc::new(StalledSalts), &config);

        let result = vault.encrypt_json_for_device(&json!(1), "alice").await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
