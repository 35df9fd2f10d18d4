//! References to API keys in configuration.
//!
//! `api_key = "env:COHERE_API_KEY"` reads the environment; `api_key =
//! "keychain:qdrant:congdoan"` reads a `CredentialStore` account. A plaintext key is
//! never accepted: it is redacted from `Debug` output and refused at resolution.

use crate::credentials::{CredentialError, CredentialStore};
use serde::{Deserialize, Serialize};
use std::fmt;

const KEYCHAIN_PREFIX: &str = "keychain:";
const ENV_PREFIX: &str = "env:";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

/// Where a `SecretRef` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource<'a> {
    /// No key configured.
    Unset,
    Keychain(&'a str),
    Env(&'a str),
    /// Anything without a known prefix: assumed to be the key itself.
    Inline,
}

impl SecretRef {
    pub fn keychain(account: &str) -> Self {
        Self(format!("{KEYCHAIN_PREFIX}{account}"))
    }

    pub fn env(var_name: &str) -> Self {
        Self(format!("{ENV_PREFIX}{var_name}"))
    }

    pub fn source(&self) -> SecretSource<'_> {
        let raw = self.0.trim();
        if raw.is_empty() {
            SecretSource::Unset
        } else if let Some(account) = raw.strip_prefix(KEYCHAIN_PREFIX) {
            SecretSource::Keychain(account.trim())
        } else if let Some(var) = raw.strip_prefix(ENV_PREFIX) {
            SecretSource::Env(var.trim())
        } else {
            SecretSource::Inline
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source() == SecretSource::Unset
    }

    pub fn is_env(&self) -> bool {
        matches!(self.source(), SecretSource::Env(_))
    }

    pub fn is_inline(&self) -> bool {
        self.source() == SecretSource::Inline
    }
}

impl fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source() {
            SecretSource::Inline => f.write_str("SecretRef(<redacted>)"),
            _ => write!(f, "SecretRef({:?})", self.0),
        }
    }
}

impl From<&str> for SecretRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SecretRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretResolveError {
    #[error("No API key configured")]
    Empty,

    #[error("Keychain lookup failed for '{account}': {source}")]
    Keychain {
        account: String,
        source: CredentialError,
    },

    #[error("Environment variable '{var}' is not set or is blank")]
    EnvVarMissing { var: String },

    #[error("Plaintext API keys are not accepted; use 'env:<VAR>' or 'keychain:<account>'")]
    InlineRejected,
}

pub struct SecretResolver;

impl SecretResolver {
    pub fn resolve(
        secret_ref: &SecretRef,
        store: &dyn CredentialStore,
    ) -> Result<String, SecretResolveError> {
        match secret_ref.source() {
            SecretSource::Unset => Err(SecretResolveError::Empty),
            SecretSource::Keychain(account) => {
                store
                    .get_key(account)
                    .map_err(|source| SecretResolveError::Keychain {
                        account: account.to_string(),
                        source,
                    })
            }
            SecretSource::Env(var) => std::env::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SecretResolveError::EnvVarMissing {
                    var: var.to_string(),
                }),
            SecretSource::Inline => Err(SecretResolveError::InlineRejected),
        }
    }

    /// Like `resolve`, but an unset reference means "no key" (local Qdrant).
    pub fn resolve_optional(
        secret_ref: &SecretRef,
        store: &dyn CredentialStore,
    ) -> Result<Option<String>, SecretResolveError> {
        match secret_ref.source() {
            SecretSource::Unset => Ok(None),
            _ => Self::resolve(secret_ref, store).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InMemoryCredentialStore;

    #[test]
    fn test_source_parsing() {
        assert_eq!(SecretRef::default().source(), SecretSource::Unset);
        assert_eq!(SecretRef::from("  ").source(), SecretSource::Unset);
        assert_eq!(
            SecretRef::keychain("qdrant:congdoan").source(),
            SecretSource::Keychain("qdrant:congdoan")
        );
        assert_eq!(
            SecretRef::from("env: COHERE_API_KEY ").source(),
            SecretSource::Env("COHERE_API_KEY")
        );
        assert_eq!(SecretRef::from("co-abc").source(), SecretSource::Inline);
    }

    #[test]
    fn test_keychain_ref_resolves_through_store() {
        let store = InMemoryCredentialStore::new().with_key("qdrant:congdoan", "qd-secret");
        let value =
            SecretResolver::resolve(&SecretRef::keychain("qdrant:congdoan"), &store).unwrap();
        assert_eq!(value, "qd-secret");
    }

    #[test]
    fn test_env_ref_resolves() {
        let var = "FAQGATE_TEST_SECRET_REF_ENV";
        unsafe { std::env::set_var(var, "from-env") };
        let value =
            SecretResolver::resolve(&SecretRef::env(var), &InMemoryCredentialStore::new()).unwrap();
        assert_eq!(value, "from-env");
        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn test_blank_env_var_counts_as_missing() {
        let var = "FAQGATE_TEST_SECRET_REF_BLANK";
        unsafe { std::env::set_var(var, "  ") };
        let err = SecretResolver::resolve(&SecretRef::env(var), &InMemoryCredentialStore::new())
            .unwrap_err();
        assert!(matches!(err, SecretResolveError::EnvVarMissing { .. }));
        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn test_inline_key_is_rejected_and_redacted() {
        let inline = SecretRef::from("sk-ant-api03-plaintext");
        assert!(inline.is_inline());
        assert!(!format!("{inline:?}").contains("plaintext"));
        let err = SecretResolver::resolve(&inline, &InMemoryCredentialStore::new()).unwrap_err();
        assert!(matches!(err, SecretResolveError::InlineRejected));
    }

    #[test]
    fn test_resolve_optional() {
        let store = InMemoryCredentialStore::new();
        assert!(
            SecretResolver::resolve_optional(&SecretRef::default(), &store)
                .unwrap()
                .is_none()
        );
        assert!(SecretResolver::resolve_optional(&SecretRef::keychain("missing"), &store).is_err());
    }
}
