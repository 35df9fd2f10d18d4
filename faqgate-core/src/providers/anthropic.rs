//! Anthropic Messages API generator.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System prompt is a top-level `system` field, not in the messages array
//! - Truncation is reported as `stop_reason = "max_tokens"`

use crate::config::GenerationConfig;
use crate::error::{ConfigError, GenerationError, ProviderError};
use crate::generator::Generator;
use crate::providers::{http_client, send_json, usage_count};
use crate::types::{Generation, GenerationRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "Anthropic";

/// Anthropic Messages API generator.
pub struct AnthropicGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    temperature: f32,
    top_p: Option<f32>,
    system_prompt: Option<String>,
    timeout_secs: u64,
}

impl AnthropicGenerator {
    /// Create a generator with an already-resolved API key.
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            top_p: config.top_p,
            system_prompt: config.system_prompt.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build the JSON request body for the Messages API.
    fn build_request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_output_tokens,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
        });

        if let Some(top_p) = self.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(system) = &self.system_prompt {
            body["system"] = Value::String(system.clone());
        }

        body
    }

    /// Parse a Messages API response.
    ///
    /// Text blocks are concatenated in order; non-text blocks are ignored.
    fn parse_response(
        body: &Value,
        request: &GenerationRequest,
    ) -> Result<Generation, GenerationError> {
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "No content array in Anthropic response".to_string(),
            })?;

        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();

        let usage = body.get("usage");
        let generation = Generation {
            text,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            input_tokens: usage_count(usage, "input_tokens"),
            output_tokens: usage_count(usage, "output_tokens"),
        };

        match body.get("stop_reason").and_then(Value::as_str) {
            Some("max_tokens") => Err(GenerationError::Truncated {
                partial: generation,
                max_output_tokens: request.max_output_tokens,
            }),
            _ => Ok(generation),
        }
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = request.model.as_str(),
            url = url.as_str(),
            max_output_tokens = request.max_output_tokens,
            "Sending Anthropic generation request"
        );

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);
        let response = send_json(builder, PROVIDER, self.timeout_secs).await?;

        let result = Self::parse_response(&response, &request);
        if let Err(GenerationError::Truncated { partial, .. }) = &result {
            warn!(
                model = partial.model.as_str(),
                output_tokens = partial.output_tokens,
                "Anthropic generation stopped at max_tokens"
            );
        }
        result
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}
