//! Storage for provider and vector store API keys.
//!
//! Configuration never holds a key, only a `SecretRef`. A `keychain:` reference is
//! looked up in a `CredentialStore`: the OS keychain through `keyring` in production,
//! an in-memory map in tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Default keyring service name. Accounts are provider or store names
/// (`cohere`, `anthropic`, `qdrant:congdoan`).
pub const KEYRING_SERVICE: &str = "faqgate";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No credential stored for {service}:{account}")]
    NotFound { service: String, account: String },

    #[error("Keyring {operation} failed for '{account}': {message}")]
    Backend {
        operation: &'static str,
        account: String,
        message: String,
    },
}

/// Backend holding API keys by account name.
pub trait CredentialStore: Send + Sync {
    /// Read the key stored for `account`.
    fn get_key(&self, account: &str) -> Result<String, CredentialError>;

    /// Store or overwrite the key for `account`.
    fn store_key(&self, account: &str, secret: &str) -> Result<(), CredentialError>;

    /// Remove the key for `account`.
    fn delete_key(&self, account: &str) -> Result<(), CredentialError>;

    /// Whether a key is stored for `account`.
    fn has_key(&self, account: &str) -> bool {
        self.get_key(account).is_ok()
    }
}

/// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service).
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Use a separate service name, e.g. one per deployment (`faqgate-staging`).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, operation: &'static str, account: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, account).map_err(|e| CredentialError::Backend {
            operation,
            account: account.to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get_key(&self, account: &str) -> Result<String, CredentialError> {
        self.entry("read", account)?
            .get_password()
            .map_err(|e| match e {
                keyring::Error::NoEntry => CredentialError::NotFound {
                    service: self.service.clone(),
                    account: account.to_string(),
                },
                other => CredentialError::Backend {
                    operation: "read",
                    account: account.to_string(),
                    message: other.to_string(),
                },
            })
    }

    fn store_key(&self, account: &str, secret: &str) -> Result<(), CredentialError> {
        self.entry("write", account)?
            .set_password(secret)
            .map_err(|e| CredentialError::Backend {
                operation: "write",
                account: account.to_string(),
                message: e.to_string(),
            })
    }

    fn delete_key(&self, account: &str) -> Result<(), CredentialError> {
        self.entry("delete", account)?
            .delete_credential()
            .map_err(|e| CredentialError::Backend {
                operation: "delete",
                account: account.to_string(),
                message: e.to_string(),
            })
    }
}

/// Map-backed store for tests and local runs.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    keys: Mutex<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, account: &str, secret: &str) -> Self {
        self.keys().insert(account.to_string(), secret.to_string());
        self
    }

    fn keys(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get_key(&self, account: &str) -> Result<String, CredentialError> {
        self.keys()
            .get(account)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                service: KEYRING_SERVICE.to_string(),
                account: account.to_string(),
            })
    }

    fn store_key(&self, account: &str, secret: &str) -> Result<(), CredentialError> {
        self.keys().insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn delete_key(&self, account: &str) -> Result<(), CredentialError> {
        self.keys().remove(account);
        Ok(())
    }

    fn has_key(&self, account: &str) -> bool {
        self.keys().contains_key(account)
    }
}
