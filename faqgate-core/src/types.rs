//! Core value types flowing through the answering pipeline.
//!
//! Every value here is built once by one stage and read by the next; none is mutated
//! after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::Stage;

/// Default language tag for incoming questions.
pub const DEFAULT_LANGUAGE: &str = "vi";

/// A user question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    language: String,
    user_instruction: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            user_instruction: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Attach a caller-supplied instruction suffix. Blank instructions are ignored.
    pub fn with_instruction(mut self, instruction: Option<String>) -> Self {
        self.user_instruction = instruction.filter(|i| !i.trim().is_empty());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn user_instruction(&self) -> Option<&str> {
        self.user_instruction.as_deref()
    }
}

/// An embedding produced by one `Embedder::embed` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    values: Vec<f32>,
    model: String,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            values,
            model: model.into(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// A raw hit returned by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The single nearest curated answer for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub answer_text: String,
    /// Cosine similarity in `[0.0, 1.0]`.
    pub similarity_score: f32,
    pub source_id: String,
}

impl MatchCandidate {
    /// Candidate used when the curated collection has no entries at all.
    pub fn empty() -> Self {
        Self {
            answer_text: String::new(),
            similarity_score: 0.0,
            source_id: String::new(),
        }
    }

    pub fn has_answer(&self) -> bool {
        !self.answer_text.trim().is_empty()
    }
}

/// A document passage returned by semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFragment {
    pub content_text: String,
    /// 1-based position in the store's result order.
    pub rank: usize,
    pub source_id: String,
    pub retrieval_score: f32,
}

/// Input to a `Generator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub max_output_tokens: usize,
}

/// Output of a `Generator`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Generation {
    pub fn tokens_used(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// Usage details attached to a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: String,
    /// Prompt size as counted locally before the call.
    pub prompt_tokens: usize,
    /// Total tokens reported by the provider (input + output).
    pub tokens_used: usize,
    pub latency_ms: u64,
    pub max_output_tokens: usize,
    /// The model stopped at `max_output_tokens`; `answer_text` is incomplete.
    pub truncated: bool,
}

/// Where the final answer came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerOrigin {
    ExactMatch {
        confidence_score: f32,
        source_id: String,
    },
    Generated(GenerationMetadata),
}

/// A reference to a source that contributed to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub rank: usize,
    pub retrieval_score: f32,
    pub excerpt: String,
}

impl From<&RetrievedFragment> for Citation {
    fn from(fragment: &RetrievedFragment) -> Self {
        Self {
            source_id: fragment.source_id.clone(),
            rank: fragment.rank,
            retrieval_score: fragment.retrieval_score,
            excerpt: fragment.content_text.clone(),
        }
    }
}

/// The terminal artifact returned by `AnswerPipeline::answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub query_id: Uuid,
    pub query: String,
    pub answer_text: String,
    pub origin: AnswerOrigin,
    /// Ordered sources actually used to produce the answer.
    pub citations: Vec<Citation>,
    /// The near-miss FAQ answer fed to the generator as a supporting reference.
    pub supplementary_reference: Option<String>,
    /// Stages visited, in order.
    pub stages: Vec<Stage>,
    pub answered_at: DateTime<Utc>,
}

impl AnswerResult {
    /// Similarity score when the answer was served from the curated collection.
    pub fn confidence_score(&self) -> Option<f32> {
        match &self.origin {
            AnswerOrigin::ExactMatch {
                confidence_score, ..
            } => Some(*confidence_score),
            AnswerOrigin::Generated(_) => None,
        }
    }

    pub fn generation(&self) -> Option<&GenerationMetadata> {
        match &self.origin {
            AnswerOrigin::Generated(meta) => Some(meta),
            AnswerOrigin::ExactMatch { .. } => None,
        }
    }

    pub fn is_short_circuit(&self) -> bool {
        matches!(self.origin, AnswerOrigin::ExactMatch { .. })
    }

    pub fn is_truncated(&self) -> bool {
        self.generation().is_some_and(|m| m.truncated)
    }

    pub fn cited_sources(&self) -> Vec<&str> {
        self.citations.iter().map(|c| c.source_id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults_to_vietnamese() {
        let q = Query::new("Giờ làm việc là gì?");
        assert_eq!(q.language(), "vi");
        assert!(q.user_instruction().is_none());
    }

    #[test]
    fn test_blank_instruction_is_dropped() {
        let q = Query::new("q").with_instruction(Some("   ".into()));
        assert!(q.user_instruction().is_none());
        let q = Query::new("q").with_instruction(Some("Trả lời ngắn gọn".into()));
        assert_eq!(q.user_instruction(), Some("Trả lời ngắn gọn"));
    }

    #[test]
    fn test_empty_candidate() {
        let c = MatchCandidate::empty();
        assert_eq!(c.similarity_score, 0.0);
        assert!(!c.has_answer());
    }

    #[test]
    fn test_answer_origin_serializes_tagged() {
        let origin = AnswerOrigin::ExactMatch {
            confidence_score: 0.98,
            source_id: "faq-7".into(),
        };
        let json = serde_json::to_value(&origin).unwrap();
        assert_eq!(json["type"], "exact_match");
        assert_eq!(json["source_id"], "faq-7");
    }

    #[test]
    fn test_generation_tokens_used() {
        let g = Generation {
            text: "x".into(),
            model: "m".into(),
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(g.tokens_used(), 150);
    }
}
