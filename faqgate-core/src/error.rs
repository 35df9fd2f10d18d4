//! Error types for the faqgate pipeline.
//!
//! Uses `thiserror` for public API error types. Collaborator failures are captured in
//! leaf enums (`ProviderError`, `GenerationError`, `ConfigError`) and surfaced to callers
//! through `PipelineError`, whose variants always name the stage that failed and the
//! offending parameter.

use crate::secret_ref::SecretResolveError;
use crate::stage::Stage;
use crate::types::Generation;
use std::fmt;

/// Top-level error returned by `AnswerPipeline::answer`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown topic partition '{partition}' (known: {})", .known.join(", "))]
    UnknownPartition {
        partition: String,
        known: Vec<String>,
    },

    #[error("Unknown corpus '{corpus}' (known: {})", .known.join(", "))]
    UnknownCorpus { corpus: String, known: Vec<String> },

    #[error("Invalid option '{option}': {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    #[error("Embedding unavailable during {stage} (model '{model}'): {source}")]
    EmbeddingUnavailable {
        stage: Stage,
        model: String,
        source: ProviderError,
    },

    #[error("Vector search unavailable during {stage} (collection '{collection}'): {source}")]
    SearchUnavailable {
        stage: Stage,
        collection: String,
        source: ProviderError,
    },

    #[error(
        "Context too large during {stage}: {token_count} tokens exceeds budget of {max_tokens} \
         (minimum required content is {minimum_tokens} tokens)"
    )]
    ContextTooLarge {
        stage: Stage,
        token_count: usize,
        max_tokens: usize,
        minimum_tokens: usize,
    },

    #[error("Generation unavailable (model '{model}'): {source}")]
    GenerationUnavailable {
        model: String,
        source: ProviderError,
    },

    #[error("Generation truncated by model '{model}' after {max_output_tokens} output tokens")]
    GenerationTruncated {
        model: String,
        max_output_tokens: usize,
        partial_text: String,
    },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: Stage, to: Stage },
}

/// Reportable error kinds, one per distinct failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownPartition,
    UnknownCorpus,
    InvalidOption,
    EmbeddingUnavailable,
    SearchUnavailable,
    ContextTooLarge,
    GenerationUnavailable,
    GenerationTruncated,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownPartition => "unknown_partition",
            ErrorKind::UnknownCorpus => "unknown_corpus",
            ErrorKind::InvalidOption => "invalid_option",
            ErrorKind::EmbeddingUnavailable => "embedding_unavailable",
            ErrorKind::SearchUnavailable => "search_unavailable",
            ErrorKind::ContextTooLarge => "context_too_large",
            ErrorKind::GenerationUnavailable => "generation_unavailable",
            ErrorKind::GenerationTruncated => "generation_truncated",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnknownPartition { .. } => ErrorKind::UnknownPartition,
            PipelineError::UnknownCorpus { .. } => ErrorKind::UnknownCorpus,
            PipelineError::InvalidOption { .. } => ErrorKind::InvalidOption,
            PipelineError::EmbeddingUnavailable { .. } => ErrorKind::EmbeddingUnavailable,
            PipelineError::SearchUnavailable { .. } => ErrorKind::SearchUnavailable,
            PipelineError::ContextTooLarge { .. } => ErrorKind::ContextTooLarge,
            PipelineError::GenerationUnavailable { .. } => ErrorKind::GenerationUnavailable,
            PipelineError::GenerationTruncated { .. } => ErrorKind::GenerationTruncated,
            PipelineError::InvalidStateTransition { .. } => ErrorKind::Internal,
        }
    }

    /// The pipeline stage at which the failure was detected.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::UnknownPartition { .. }
            | PipelineError::UnknownCorpus { .. }
            | PipelineError::InvalidOption { .. } => Stage::Start,
            PipelineError::EmbeddingUnavailable { stage, .. }
            | PipelineError::SearchUnavailable { stage, .. }
            | PipelineError::ContextTooLarge { stage, .. } => *stage,
            PipelineError::GenerationUnavailable { .. }
            | PipelineError::GenerationTruncated { .. } => Stage::Generate,
            PipelineError::InvalidStateTransition { from, .. } => *from,
        }
    }

    /// Whether re-invoking the whole pipeline with the same inputs may succeed.
    ///
    /// Configuration and budget errors are deterministic and always fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::EmbeddingUnavailable { source, .. }
            | PipelineError::SearchUnavailable { source, .. }
            | PipelineError::GenerationUnavailable { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Errors from external provider calls (embedding, vector search, generation).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl ProviderError {
    /// Rate limits, timeouts, and connection failures are transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Connection { .. }
        )
    }

    /// Classify a `reqwest` transport error.
    pub(crate) fn from_transport(provider: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { timeout_secs }
        } else if err.is_connect() {
            ProviderError::Connection {
                message: format!("{provider}: {err}"),
            }
        } else {
            ProviderError::ApiRequest {
                message: format!("Request to {provider} failed: {err}"),
            }
        }
    }

    /// Map an HTTP status code to the appropriate `ProviderError`.
    pub(crate) fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => ProviderError::AuthFailed {
                provider: provider.to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                ProviderError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            500..=599 => ProviderError::Connection {
                message: format!("HTTP {status} from {provider}: {body}"),
            },
            _ => ProviderError::ApiRequest {
                message: format!("HTTP {status} from {provider}: {body}"),
            },
        }
    }
}

/// Errors from a `Generator`.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The model hit `max_output_tokens` before finishing. The partial output is kept.
    #[error("Output truncated at {max_output_tokens} tokens")]
    Truncated {
        partial: Generation,
        max_output_tokens: usize,
    },
}

/// Errors from building pipeline components out of configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Unknown token encoding: {encoding}")]
    UnknownEncoding { encoding: String },

    #[error("Vector store '{store}' referenced by '{referenced_by}' is not configured")]
    UnknownStore {
        store: String,
        referenced_by: String,
    },

    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("Secret resolution failed for '{field}': {source}")]
    Secret {
        field: String,
        source: SecretResolveError,
    },
}

/// A type alias for results using `PipelineError`.
pub type Result<T> = std::result::Result<T, PipelineError>;
