//! # Storage Module
//!
//! Local, non-synced, string-keyed storage for device secrets.
//!
//! ## Storage Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LOCAL STORAGE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  secure_chat_device_salt_v1   → "3f9a…" (16 bytes, hex)                │
//! │  secure_chat_pub_<uid>_v1     → {"kty":"EC","crv":"P-256",…}           │
//! │  secure_chat_priv_<uid>_v1    → {"iv":"…","data":"…"}                  │
//! │                                                                         │
//! │  Only the public key is stored in the clear. The private key is        │
//! │  wrapped under the device key before it reaches any backend.           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryStore`] | Tests, ephemeral sessions |
//! | [`FileStore`] | Desktop / CLI, one JSON file per device profile |
//!
//! Both implement [`KeyValueStore::set_if_absent`], the compare-and-set the
//! create-if-absent paths rely on.

mod file_store;
mod locks;
mod memory_store;

pub use file_store::FileStore;
pub use locks::KeyedLocks;
pub use memory_store::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;

/// Logical key names, shared with the browser deployment
pub mod keys {
    /// Hex-encoded 16-byte device salt
    pub const DEVICE_SALT: &str = "secure_chat_device_salt_v1";

    /// Public JWK for `uid`
    pub fn public_key(uid: &str) -> String {
        format!("secure_chat_pub_{}_v1", uid)
    }

    /// Device-wrapped private JWK for `uid`
    pub fn private_key(uid: &str) -> String {
        format!("secure_chat_priv_{}_v1", uid)
    }
}

/// String-keyed local storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any existing one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write `value` only if `key` is absent
    ///
    /// Returns the value stored under `key` after the call: `value` if this
    /// call wrote it, otherwise the value another writer stored first.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<String>;

    /// Delete a value, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Check if a key exists
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(keys::public_key("u123"), "secure_chat_pub_u123_v1");
        assert_eq!(keys::private_key("u123"), "secure_chat_priv_u123_v1");
        assert_eq!(keys::DEVICE_SALT, "secure_chat_device_salt_v1");
    }
}
