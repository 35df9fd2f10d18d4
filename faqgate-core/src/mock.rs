//! In-memory collaborators for tests and local development.
//!
//! Every mock records the calls it receives so tests can assert on call counts and
//! arguments.

use crate::embeddings::Embedder;
use crate::error::{GenerationError, ProviderError};
use crate::generator::Generator;
use crate::tokens::TokenCounter;
use crate::types::{EmbeddingVector, Generation, GenerationRequest, ScoredPoint};
use crate::vector_store::VectorStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded `Embedder::embed` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedCall {
    pub text: String,
    pub model: String,
}

/// Deterministic embedder: the vector is derived from the bytes of the text.
pub struct MockEmbedder {
    dimensions: usize,
    fail: bool,
    calls: Mutex<Vec<EmbedCall>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with a connection error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<EmbedCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<EmbeddingVector, ProviderError> {
        lock(&self.calls).push(EmbedCall {
            text: text.to_string(),
            model: model.to_string(),
        });
        if self.fail {
            return Err(ProviderError::Connection {
                message: "mock embedder unavailable".into(),
            });
        }
        let mut values = vec![0.0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            values[i % self.dimensions] += f32::from(byte) / 255.0;
        }
        Ok(EmbeddingVector::new(values, model))
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// One recorded `VectorStore::search` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCall {
    pub collection: String,
    pub limit: usize,
    pub dimensions: usize,
}

/// Vector store returning canned hits per collection, truncated to `limit`.
pub struct MockVectorStore {
    hits: HashMap<String, Vec<ScoredPoint>>,
    fail: bool,
    calls: Mutex<Vec<SearchCall>>,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self {
            hits: HashMap::new(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hits(mut self, collection: &str, hits: Vec<ScoredPoint>) -> Self {
        self.hits.insert(collection.to_string(), hits);
        self
    }

    /// Every call fails with a connection error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        lock(&self.calls).clone()
    }
}

impl Default for MockVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, ProviderError> {
        lock(&self.calls).push(SearchCall {
            collection: collection.to_string(),
            limit,
            dimensions: vector.dimensions(),
        });
        if self.fail {
            return Err(ProviderError::Connection {
                message: "mock store unavailable".into(),
            });
        }
        Ok(self
            .hits
            .get(collection)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn endpoint(&self) -> &str {
        "mock://store"
    }
}

/// A scripted generator reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    /// Stopped at the output cap with this partial text.
    Truncated(String),
    Unavailable,
}

/// Generator replaying queued replies, then a default text.
pub struct MockGenerator {
    default_text: String,
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::with_response("mock answer")
    }

    /// Always answer with `text` once the queue is empty.
    pub fn with_response(text: &str) -> Self {
        Self {
            default_text: text.to_string(),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        lock(&self.calls).clone()
    }

    fn generation(text: String, request: &GenerationRequest, output_tokens: usize) -> Generation {
        Generation {
            input_tokens: request.prompt.split_whitespace().count(),
            output_tokens,
            text,
            model: request.model.clone(),
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        lock(&self.calls).push(request.clone());
        let reply = lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| MockReply::Text(self.default_text.clone()));

        match reply {
            MockReply::Text(text) => {
                let output_tokens = text.split_whitespace().count();
                Ok(Self::generation(text, &request, output_tokens))
            }
            MockReply::Truncated(text) => Err(GenerationError::Truncated {
                partial: Self::generation(text, &request, request.max_output_tokens),
                max_output_tokens: request.max_output_tokens,
            }),
            MockReply::Unavailable => Err(GenerationError::Provider(ProviderError::Connection {
                message: "mock generator unavailable".into(),
            })),
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Counts whitespace-separated words. Cheap stand-in for a BPE vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn encoding(&self) -> &str {
        "whitespace"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed("công đoàn", "m").await.unwrap();
        let b = embedder.embed("công đoàn", "m").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), 8);
        assert_eq!(embedder.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_store_truncates_to_limit() {
        let hits = (0..5)
            .map(|i| ScoredPoint {
                id: i.to_string(),
                score: 1.0 - i as f32 * 0.1,
                payload: serde_json::Value::Null,
            })
            .collect();
        let store = MockVectorStore::new().with_hits("c", hits);
        let v = EmbeddingVector::new(vec![0.1; 3], "m");
        assert_eq!(store.search("c", &v, 2).await.unwrap().len(), 2);
        assert!(store.search("other", &v, 2).await.unwrap().is_empty());
        assert_eq!(store.calls()[0].dimensions, 3);
    }

    #[tokio::test]
    async fn test_mock_generator_queue_then_default() {
        let generator = MockGenerator::with_response("mặc định");
        generator.queue(MockReply::Truncated("một phần".into()));
        let request = GenerationRequest {
            prompt: "p".into(),
            model: "m".into(),
            max_output_tokens: 5,
        };
        assert!(matches!(
            generator.generate(request.clone()).await,
            Err(GenerationError::Truncated { .. })
        ));
        let g = generator.generate(request).await.unwrap();
        assert_eq!(g.text, "mặc định");
        assert_eq!(generator.calls().len(), 2);
    }
}
