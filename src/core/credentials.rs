//! Provider credential storage.
//!
//! Secrets live in the platform keyring in normal runs. The in-memory store
//! backs tests and runs where the keyring is unreachable.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;

use tracing::warn;

use crate::core::keyring::{KeyringAccessError, KeyringCredentialStore};

pub type CredentialResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Look-up and storage of one secret per provider id.
pub trait CredentialStore: Send + Sync {
    fn get(&self, provider_id: &str) -> CredentialResult<Option<String>>;
    fn set(&self, provider_id: &str, secret: &str) -> CredentialResult<()>;

    fn describe(&self) -> &'static str;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(provider_id: &str, secret: &str) -> Self {
        let store = Self::new();
        store
            .secrets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(provider_id.to_ascii_lowercase(), secret.to_string());
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider_id: &str) -> CredentialResult<Option<String>> {
        let secrets = self
            .secrets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(secrets.get(&provider_id.to_ascii_lowercase()).cloned())
    }

    fn set(&self, provider_id: &str, secret: &str) -> CredentialResult<()> {
        let mut secrets = self
            .secrets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        secrets.insert(provider_id.to_ascii_lowercase(), secret.to_string());
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

/// Picks the keyring when it answers a probe, otherwise falls back to memory
/// so a locked or missing keychain never blocks the session.
pub fn default_credential_store() -> Box<dyn CredentialStore> {
    let keyring = KeyringCredentialStore::new();
    match keyring.probe() {
        Ok(()) => Box::new(keyring),
        Err(err) => {
            log_keyring_fallback(&err);
            Box::new(MemoryCredentialStore::new())
        }
    }
}

fn log_keyring_fallback(err: &KeyringAccessError) {
    if err.is_recoverable() {
        warn!(error = %err, "keyring temporarily unavailable; credentials kept in memory");
    } else {
        warn!(error = %err, "keyring unusable; credentials kept in memory");
    }
}
