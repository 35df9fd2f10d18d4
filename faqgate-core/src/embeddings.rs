//! Embedding providers.
//!
//! Provides a trait-based abstraction over hosted embedding models, with
//! implementations for the Cohere embed API (the default; the FAQ and document
//! collections were indexed with `multilingual-22-12`) and the OpenAI embeddings API.

use crate::config::EmbeddingConfig;
use crate::credentials::CredentialStore;
use crate::error::{ConfigError, ProviderError};
use crate::providers::{http_client, send_json};
use crate::secret_ref::SecretResolver;
use crate::types::EmbeddingVector;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text with the given model. One provider call, no retries.
    async fn embed(&self, text: &str, model: &str) -> Result<EmbeddingVector, ProviderError>;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

fn parse_vector(values: Option<&Value>, provider: &str) -> Result<Vec<f32>, ProviderError> {
    let values = values
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::ResponseParse {
            message: format!("No embedding in {provider} response"),
        })?;

    let vector: Vec<f32> = values
        .iter()
        .filter_map(Value::as_f64)
        .map(|v| v as f32)
        .collect();

    if vector.is_empty() || vector.len() != values.len() {
        return Err(ProviderError::ResponseParse {
            message: format!("Empty or non-numeric embedding in {provider} response"),
        });
    }
    Ok(vector)
}

/// Cohere `/v1/embed` embedder.
pub struct CohereEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

impl CohereEmbedder {
    pub fn new(api_key: String, base_url: Option<String>, timeout_secs: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.cohere.ai".into())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs,
        })
    }

    fn build_request_body(text: &str, model: &str) -> Value {
        let mut body = json!({
            "texts": [text],
            "model": model,
            "truncate": "END",
        });
        // v3+ models require an input type.
        if model.starts_with("embed-") {
            body["input_type"] = json!("search_query");
        }
        body
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<EmbeddingVector, ProviderError> {
        let url = format!("{}/v1/embed", self.base_url);
        debug!(model, chars = text.len(), "Requesting Cohere embedding");

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::build_request_body(text, model));
        let response = send_json(builder, "Cohere", self.timeout_secs).await?;

        let values = parse_vector(response.get("embeddings").and_then(|e| e.get(0)), "Cohere")?;
        Ok(EmbeddingVector::new(values, model))
    }

    fn provider_name(&self) -> &str {
        "cohere"
    }
}

/// OpenAI `/v1/embeddings` embedder.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: Option<String>, timeout_secs: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".into())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<EmbeddingVector, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        debug!(model, chars = text.len(), "Requesting OpenAI embedding");

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model, "input": text }));
        let response = send_json(builder, "OpenAI", self.timeout_secs).await?;

        let values = parse_vector(
            response
                .get("data")
                .and_then(|d| d.get(0))
                .and_then(|d| d.get("embedding")),
            "OpenAI",
        )?;
        Ok(EmbeddingVector::new(values, model))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Create an embedder based on configuration.
pub fn create_embedder(
    config: &EmbeddingConfig,
    cred_store: &dyn CredentialStore,
) -> Result<Arc<dyn Embedder>, ConfigError> {
    let api_key = SecretResolver::resolve(&config.api_key, cred_store).map_err(|e| {
        ConfigError::Secret {
            field: "embedding.api_key".into(),
            source: e,
        }
    })?;

    match config.provider.as_str() {
        "cohere" => Ok(Arc::new(CohereEmbedder::new(
            api_key,
            config.base_url.clone(),
            config.timeout_secs,
        )?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(
            api_key,
            config.base_url.clone(),
            config.timeout_secs,
        )?)),
        other => Err(ConfigError::UnknownProvider {
            provider: other.to_string(),
        }),
    }
}
