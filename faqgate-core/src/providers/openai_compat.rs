//! OpenAI-compatible chat completion generator.
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama and any server that speaks the
//! `/chat/completions` protocol. Truncation is reported as `finish_reason = "length"`.

use crate::config::GenerationConfig;
use crate::error::{ConfigError, GenerationError, ProviderError};
use crate::generator::Generator;
use crate::providers::{http_client, send_json, usage_count};
use crate::types::{Generation, GenerationRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI-compatible";

/// OpenAI-compatible chat completion generator.
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    temperature: f32,
    top_p: Option<f32>,
    system_prompt: Option<String>,
    timeout_secs: u64,
}

impl OpenAiCompatibleGenerator {
    /// Create a generator with an already-resolved API key. An empty key sends no
    /// `Authorization` header.
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

    fn build_request_body(&self, request: &GenerationRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_output_tokens,
            "temperature": self.temperature,
        });
        if let Some(top_p) = self.top_p {
            body["top_p"] = json!(top_p);
        }
        body
    }

    fn parse_response(
        body: &Value,
        request: &GenerationRequest,
    ) -> Result<Generation, GenerationError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let text = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let usage = body.get("usage");
        let generation = Generation {
            text,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            input_tokens: usage_count(usage, "prompt_tokens"),
            output_tokens: usage_count(usage, "completion_tokens"),
        };

        match choice.get("finish_reason").and_then(Value::as_str) {
            Some("length") => Err(GenerationError::Truncated {
                partial: generation,
                max_output_tokens: request.max_output_tokens,
            }),
            _ => Ok(generation),
        }
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = request.model.as_str(),
            url = url.as_str(),
            max_output_tokens = request.max_output_tokens,
            "Sending chat completion request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = send_json(builder, PROVIDER, self.timeout_secs).await?;

        let result = Self::parse_response(&response, &request);
        if let Err(GenerationError::Truncated { partial, .. }) = &result {
            warn!(
                model = partial.model.as_str(),
                output_tokens = partial.output_tokens,
                "Chat completion stopped at length limit"
            );
        }
        result
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(top_p: Option<f32>) -> OpenAiCompatibleGenerator {
        let config = GenerationConfig {
            provider: "openai".into(),
            top_p,
            ..GenerationConfig::default()
        };
        OpenAiCompatibleGenerator::new(&config, "sk-test".into()).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "prompt".into(),
            model: "gpt-3.5-turbo-16k".into(),
            max_output_tokens: 900,
        }
    }

    #[test]
    fn test_build_request_body_with_system_and_top_p() {
        let body = generator(Some(0.7)).build_request_body(&request());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "prompt");
        assert_eq!(body["max_tokens"], 900);
        assert!((body["top_p"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_stop() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "Đáp án"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 3}
        });
        let generation = OpenAiCompatibleGenerator::parse_response(&body, &request()).unwrap();
        assert_eq!(generation.text, "Đáp án");
        assert_eq!(generation.model, "gpt-3.5-turbo-16k");
        assert_eq!(generation.input_tokens, 40);
        assert_eq!(generation.output_tokens, 3);
    }

    #[test]
    fn test_parse_response_length_is_truncated() {
        let body = json!({
            "choices": [{"message": {"content": "Đáp"}, "finish_reason": "length"}],
        });
        let err = OpenAiCompatibleGenerator::parse_response(&body, &request()).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Truncated {
                max_output_tokens: 900,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_response_no_choices() {
        let err =
            OpenAiCompatibleGenerator::parse_response(&json!({"choices": []}), &request()).unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
    }
}
