//! Runtime configuration.
//!
//! Every default matches the browser deployment. Changing labels or the
//! iteration count on a device that already holds wrapped secrets makes
//! those secrets unreadable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{domain, PBKDF2_ITERATIONS};

/// What to do when stored identity records exist but do not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptIdentityPolicy {
    /// Log a warning and generate a fresh identity. Messages addressed to
    /// the old public key become undecryptable.
    #[default]
    Regenerate,
    /// Return `Error::IdentityCorrupted` and leave storage untouched
    Fail,
}

/// Configuration for [`ChatCryptoSession`](crate::ChatCryptoSession) and the
/// services it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatCryptoConfig {
    /// PBKDF2 rounds for the device wrapping key
    pub device_wrap_iterations: u32,
    /// PBKDF2 salt label for the device wrapping key
    pub device_wrap_label: String,
    /// HKDF salt for conversation keys
    pub shared_key_salt: String,
    /// HKDF info for conversation keys
    pub shared_key_info: String,
    /// Policy for malformed stored identities
    pub corrupt_identity_policy: CorruptIdentityPolicy,
    /// Upper bound on device salt acquisition (None = wait forever)
    #[serde(with = "optional_millis")]
    pub salt_timeout: Option<Duration>,
}

impl Default for ChatCryptoConfig {
    fn default() -> Self {
        Self {
            device_wrap_iterations: PBKDF2_ITERATIONS,
            device_wrap_label: domain::DEVICE_WRAP_SALT.to_string(),
            shared_key_salt: domain::SHARED_KEY_SALT.to_string(),
            shared_key_info: domain::SHARED_KEY_INFO.to_string(),
            corrupt_identity_policy: CorruptIdentityPolicy::default(),
            salt_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ChatCryptoConfig {
    /// Override the device wrap iteration count
    pub fn with_device_wrap_iterations(mut self, iterations: u32) -> Self {
        self.device_wrap_iterations = iterations;
        self
    }

    /// Override the corrupted-identity policy
    pub fn with_corrupt_identity_policy(mut self, policy: CorruptIdentityPolicy) -> Self {
        self.corrupt_identity_policy = policy;
        self
    }

    /// Override the salt acquisition timeout
    pub fn with_salt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.salt_timeout = timeout;
        self
    }

    /// Parse from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
