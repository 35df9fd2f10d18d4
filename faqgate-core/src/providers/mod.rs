//! Generator provider implementations.
//!
//! Provides concrete implementations of the `Generator` trait for:
//! - Anthropic Messages API (Claude models)
//! - OpenAI-compatible chat completion APIs (OpenAI, Azure, vLLM, Ollama)
//!
//! Use `create_generator()` to instantiate the appropriate provider based on config.
//! The JSON-over-HTTP plumbing shared with the embedding and vector store clients
//! also lives here.

pub mod anthropic;
pub mod openai_compat;

use crate::config::GenerationConfig;
use crate::credentials::CredentialStore;
use crate::error::{ConfigError, ProviderError};
use crate::generator::Generator;
use crate::secret_ref::SecretResolver;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicGenerator;
pub use openai_compat::OpenAiCompatibleGenerator;

/// Build an HTTP client with the given request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConfigError::Invalid {
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Send a prepared JSON request and return the decoded response body.
///
/// Non-success statuses are mapped through `ProviderError::from_status`.
pub(crate) async fn send_json(
    request: RequestBuilder,
    provider: &str,
    timeout_secs: u64,
) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_transport(provider, timeout_secs, e))?;

    let status = response.status();
    let body_text = response
        .text()
        .await
        .map_err(|e| ProviderError::ResponseParse {
            message: format!("Failed to read {provider} response body: {e}"),
        })?;

    if !status.is_success() {
        return Err(ProviderError::from_status(provider, status, &body_text));
    }

    serde_json::from_str(&body_text).map_err(|e| ProviderError::ResponseParse {
        message: format!("Invalid JSON in {provider} response: {e}"),
    })
}

/// Read a `usize` counter from a JSON usage object, defaulting to zero.
pub(crate) fn usage_count(usage: Option<&Value>, key: &str) -> usize {
    usage
        .and_then(|u| u.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

/// Create a generator based on the configuration.
///
/// Routes to the appropriate provider implementation:
/// - `"anthropic"` → `AnthropicGenerator`
/// - Everything else → `OpenAiCompatibleGenerator`
///
/// The API key is resolved through `cred_store`; an empty key is allowed only for
/// OpenAI-compatible endpoints with a custom `base_url` (local servers).
pub fn create_generator(
    config: &GenerationConfig,
    cred_store: &dyn CredentialStore,
) -> Result<Arc<dyn Generator>, ConfigError> {
    let api_key = SecretResolver::resolve_optional(&config.api_key, cred_store).map_err(|e| {
        ConfigError::Secret {
            field: "generation.api_key".into(),
            source: e,
        }
    })?;

    match config.provider.as_str() {
        "anthropic" => {
            let key = api_key.ok_or_else(|| ConfigError::MissingField {
                field: "generation.api_key".into(),
            })?;
            Ok(Arc::new(AnthropicGenerator::new(config, key)?))
        }
        "" => Err(ConfigError::UnknownProvider {
            provider: String::new(),
        }),
        _ => {
            if api_key.is_none() && config.base_url.is_none() {
                return Err(ConfigError::MissingField {
                    field: "generation.api_key".into(),
                });
            }
            Ok(Arc::new(OpenAiCompatibleGenerator::new(
                config,
                api_key.unwrap_or_default(),
            )?))
        }
    }
}
