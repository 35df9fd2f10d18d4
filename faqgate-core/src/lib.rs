//! # faqgate Core
//!
//! Confidence-gated question answering. A question is first matched against a curated
//! FAQ collection; a sufficiently confident match is served verbatim. Otherwise the
//! document corpus is searched, a token-bounded context is assembled, and a language
//! model writes an answer grounded in it, with citations.
//!
//! External services (embeddings, vector search, generation) sit behind async traits
//! with HTTP implementations for Cohere, OpenAI, Qdrant and Anthropic, plus recording
//! mocks for tests.

pub mod catalog;
pub mod config;
pub mod context;
pub mod credentials;
pub mod embeddings;
pub mod error;
pub mod format;
pub mod generator;
pub mod mock;
pub mod pipeline;
pub mod preprocess;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod secret_ref;
pub mod stage;
pub mod tokens;
pub mod types;
pub mod vector_store;

// Re-export commonly used types at the crate root.
pub use catalog::{Catalog, Collection, PayloadSchema};
pub use config::{FaqgateConfig, load_config};
pub use context::{AssembledContext, ContextAssembler};
pub use credentials::{CredentialStore, InMemoryCredentialStore, KeyringCredentialStore};
pub use embeddings::{Embedder, create_embedder};
pub use error::{ConfigError, ErrorKind, GenerationError, PipelineError, ProviderError, Result};
pub use format::{AnswerFormatter, Labels};
pub use generator::Generator;
pub use mock::{MockEmbedder, MockGenerator, MockReply, MockVectorStore, WhitespaceTokenCounter};
pub use pipeline::{AnswerOptions, AnswerPipeline, PipelineComponents};
pub use preprocess::{CompoundSegmenter, Passthrough, QueryPreprocessor};
pub use prompt::{PromptEnvelope, parse_prompt, strip_markers};
pub use providers::create_generator;
pub use retrieval::{ExactMatchRetriever, SemanticRetriever};
pub use secret_ref::{SecretRef, SecretResolver, SecretSource};
pub use stage::Stage;
pub use tokens::{TiktokenCounter, TokenCounter};
pub use types::{
    AnswerOrigin, AnswerResult, Citation, EmbeddingVector, Generation, GenerationMetadata,
    GenerationRequest, MatchCandidate, Query, RetrievedFragment, ScoredPoint,
};
pub use vector_store::{QdrantStore, VectorStore};
