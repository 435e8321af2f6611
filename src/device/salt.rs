//! Device salt storage.

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;

use crate::error::{Error, Result};
use crate::storage::{keys, KeyValueStore, KeyedLocks};

/// Size of the device salt in bytes
pub const DEVICE_SALT_SIZE: usize = 16;

/// Random per-device value the wrapping key is derived from
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceSalt([u8; DEVICE_SALT_SIZE]);

impl DeviceSalt {
    /// Draw a new salt from the OS CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; DEVICE_SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; DEVICE_SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Lowercase hex, the stored representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the stored representation
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| Error::DeviceKeyUnavailable(format!("Device salt is not hex: {}", e)))?;
        let bytes: [u8; DEVICE_SALT_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::DeviceKeyUnavailable(format!(
                "Device salt must be {} bytes, got {}",
                DEVICE_SALT_SIZE,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for DeviceSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceSalt(..)")
    }
}

/// Source of the device salt
///
/// Injected into [`DeviceVault`](super::DeviceVault) so tests and embedders
/// can supply their own storage.
#[async_trait]
pub trait DeviceKeyStore: Send + Sync {
    /// The salt, if one has been created on this device
    async fn get_salt(&self) -> Result<Option<DeviceSalt>>;

    /// The salt, creating and persisting it on first use
    async fn get_or_create_salt(&self) -> Result<DeviceSalt>;
}

/// [`DeviceKeyStore`] over any [`KeyValueStore`]
pub struct LocalDeviceKeyStore {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<KeyedLocks>,
}

impl LocalDeviceKeyStore {
    /// Create with a private lock set
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_locks(store, Arc::new(KeyedLocks::new()))
    }

    /// Create sharing a lock set with other services over the same store
    pub fn with_locks(store: Arc<dyn KeyValueStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }
}

#[async_trait]
impl DeviceKeyStore for LocalDeviceKeyStore {
    async fn get_salt(&self) -> Result<Option<DeviceSalt>> {
        match self.store.get(keys::DEVICE_SALT).await? {
            Some(hex) => DeviceSalt::from_hex(&hex).map(Some),
            None => Ok(None),
        }
    }

    async fn get_or_create_salt(&self) -> Result<DeviceSalt> {
        let _guard = self.locks.lock(keys::DEVICE_SALT).await;

        if let Some(existing) = self.get_salt().await? {
            return Ok(existing);
        }

        let fresh = DeviceSalt::random();
        let stored = self
            .store
            .set_if_absent(keys::DEVICE_SALT, &fresh.to_hex())
            .await?;
        let salt = DeviceSalt::from_hex(&stored)?;

        if salt == fresh {
            tracing::info!("Created device salt");
        } else {
            tracing::debug!("Adopted device salt written by another writer");
        }

        Ok(salt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_hex_round_trip() {
        let salt = DeviceSalt::random();
        assert_eq!(DeviceSalt::from_hex(&salt.to_hex()).unwrap(), salt);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(matches!(
            DeviceSalt::from_hex("00ff"),
            Err(Error::DeviceKeyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_salt_created_once() {
        let salts = LocalDeviceKeyStore::new(Arc::new(MemoryStore::new()));

        assert!(salts.get_salt().await.unwrap().is_none());
        let first = salts.get_or_create_salt().await.unwrap();
        let second = salts.get_or_create_salt().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(salts.get_salt().await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_salt() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let salts = Arc::new(LocalDeviceKeyStore::new(Arc::clone(&store)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let salts = Arc::clone(&salts);
            handles.push(tokio::spawn(async move { salts.get_or_create_salt().await }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap().unwrap());
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_independent_stores_converge_on_first_writer() {
        // Two services over one store, without a shared lock set
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let tab_a = LocalDeviceKeyStore::new(Arc::clone(&store));
        let tab_b = LocalDeviceKeyStore::new(Arc::clone(&store));

        let (a, b) = tokio::join!(tab_a.get_or_create_salt(), tab_b.get_or_create_salt());

        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_salt_not_replaced() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(keys::DEVICE_SALT, "not-hex").await.unwrap();
        let salts = LocalDeviceKeyStore::new(Arc::clone(&store));

        assert!(matches!(
            salts.get_or_create_salt().await,
            Err(Error::DeviceKeyUnavailable(_))
        ));
        assert_eq!(
            store.get(keys::DEVICE_SALT).await.unwrap().as_deref(),
            Some("not-hex")
        );
    }
}
