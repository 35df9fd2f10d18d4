//! Token counting for budget enforcement.
//!
//! The count must use the same vocabulary as the generator's model family, otherwise a
//! context that fits locally can still overflow at generation time.

use crate::error::ConfigError;
use std::fmt;

/// Deterministic text → token count for one encoding.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`. Empty text counts as zero.
    fn count(&self, text: &str) -> usize;

    /// Identifier of the encoding this counter implements (e.g. `cl100k_base`).
    fn encoding(&self) -> &str;
}

/// Default encoding when a model family is not recognized.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Pick the BPE encoding used by a model family.
///
/// Anthropic models have no public tiktoken vocabulary; `cl100k_base` is the closest
/// available approximation and is what the budget was calibrated against.
pub fn encoding_for_model(model: &str) -> &'static str {
    let m = model.to_ascii_lowercase();
    if m.starts_with("gpt-4o")
        || m.starts_with("gpt-4.1")
        || m.starts_with("gpt-5")
        || m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
    {
        "o200k_base"
    } else if m.starts_with("text-davinci-002") || m.starts_with("text-davinci-003") {
        "p50k_base"
    } else if m.starts_with("davinci") || m.starts_with("curie") || m.starts_with("babbage") {
        "r50k_base"
    } else {
        DEFAULT_ENCODING
    }
}

/// Token counter using tiktoken-rs for accurate BPE tokenization.
pub struct TiktokenCounter {
    bpe: tiktoken_rs::CoreBPE,
    encoding: &'static str,
}

impl TiktokenCounter {
    pub fn for_encoding(encoding: &str) -> Result<Self, ConfigError> {
        let (bpe, name) = match encoding {
            "cl100k_base" => (tiktoken_rs::cl100k_base(), "cl100k_base"),
            "o200k_base" => (tiktoken_rs::o200k_base(), "o200k_base"),
            "p50k_base" => (tiktoken_rs::p50k_base(), "p50k_base"),
            "r50k_base" => (tiktoken_rs::r50k_base(), "r50k_base"),
            other => {
                return Err(ConfigError::UnknownEncoding {
                    encoding: other.to_string(),
                });
            }
        };
        let bpe = bpe.map_err(|e| ConfigError::Invalid {
            message: format!("failed to load {name} vocabulary: {e}"),
        })?;
        Ok(Self {
            bpe,
            encoding: name,
        })
    }

    pub fn for_model(model: &str) -> Result<Self, ConfigError> {
        Self::for_encoding(encoding_for_model(model))
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn encoding(&self) -> &str {
        self.encoding
    }
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}
