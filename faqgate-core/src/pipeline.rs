//! The confidence-gated answering pipeline.
//!
//! ```text
//! Start -> ExactLookup -> ShortCircuit -> Done
//!                      -> FallbackSearch -> Assemble -> Generate -> Done
//! ```
//!
//! A query first goes to the curated FAQ collection. When the best match scores at or
//! above the confidence threshold its answer is returned verbatim. Otherwise the
//! document corpus is searched, a bounded context is assembled (with the near-miss FAQ
//! answer as a reference), and the generator writes a grounded answer.

use crate::catalog::Catalog;
use crate::config::FaqgateConfig;
use crate::context::ContextAssembler;
use crate::credentials::CredentialStore;
use crate::embeddings::{Embedder, create_embedder};
use crate::error::{ConfigError, GenerationError, PipelineError, Result};
use crate::generator::Generator;
use crate::preprocess::{QueryPreprocessor, create_preprocessor};
use crate::prompt::{PromptEnvelope, strip_markers};
use crate::providers::create_generator;
use crate::retrieval::{ExactMatchRetriever, SemanticRetriever};
use crate::stage::Stage;
use crate::tokens::{TiktokenCounter, TokenCounter, encoding_for_model};
use crate::types::{
    AnswerOrigin, AnswerResult, Citation, DEFAULT_LANGUAGE, GenerationMetadata,
    GenerationRequest, Query,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.96;
pub const DEFAULT_FALLBACK_K: usize = 3;
pub const DEFAULT_MAX_PROMPT_TOKENS: usize = 16_000;
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 2_000;
pub const DEFAULT_GENERATION_MODEL: &str = "claude-3-haiku-20240307";

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerOptions {
    /// Minimum similarity (inclusive) for serving the FAQ answer directly.
    pub confidence_threshold: f32,
    /// Number of passages retrieved on the fallback path.
    pub fallback_k: usize,
    /// Token budget for the context block and for the full prompt.
    pub max_prompt_tokens: usize,
    /// Output cap sent to the generator.
    pub max_output_tokens: usize,
    /// Total window of the generation model. When set, the output budget is reduced
    /// to what the prompt leaves free.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
    pub generation_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_instruction: Option<String>,
    /// Return partial output flagged as truncated instead of failing.
    pub allow_truncated: bool,
    pub language: String,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            fallback_k: DEFAULT_FALLBACK_K,
            max_prompt_tokens: DEFAULT_MAX_PROMPT_TOKENS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            context_window: None,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            user_instruction: None,
            allow_truncated: true,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl AnswerOptions {
    fn invalid(option: &'static str, reason: impl Into<String>) -> PipelineError {
        PipelineError::InvalidOption {
            option,
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.confidence_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(Self::invalid(
                "confidence_threshold",
                format!("{t} is outside [0, 1]"),
            ));
        }
        if self.fallback_k == 0 {
            return Err(Self::invalid("fallback_k", "must be at least 1"));
        }
        if self.max_prompt_tokens == 0 {
            return Err(Self::invalid("max_prompt_tokens", "must be positive"));
        }
        if self.max_output_tokens == 0 {
            return Err(Self::invalid("max_output_tokens", "must be positive"));
        }
        if self.context_window == Some(0) {
            return Err(Self::invalid("context_window", "must be positive"));
        }
        if self.generation_model.trim().is_empty() {
            return Err(Self::invalid("generation_model", "must not be empty"));
        }
        Ok(())
    }

    /// Output tokens to request for a prompt of `prompt_tokens`.
    pub fn output_budget(&self, prompt_tokens: usize) -> usize {
        match self.context_window {
            Some(window) => self
                .max_output_tokens
                .min(window.saturating_sub(prompt_tokens)),
            None => self.max_output_tokens,
        }
    }
}

/// Records the stages of one run and rejects illegal transitions.
struct StageTracker {
    visited: Vec<Stage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            visited: vec![Stage::Start],
        }
    }

    fn current(&self) -> Stage {
        self.visited.last().copied().unwrap_or(Stage::Start)
    }

    fn advance(&mut self, next: Stage) -> Result<()> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(PipelineError::InvalidStateTransition { from, to: next });
        }
        debug!(from = %from, to = %next, "Stage transition");
        self.visited.push(next);
        Ok(())
    }

    fn finish(self) -> Vec<Stage> {
        self.visited
    }
}

/// Everything an `AnswerPipeline` is built from.
pub struct PipelineComponents {
    pub embedder: Arc<dyn Embedder>,
    pub catalog: Catalog,
    pub generator: Arc<dyn Generator>,
    pub token_counter: Arc<dyn TokenCounter>,
    pub preprocessor: Arc<dyn QueryPreprocessor>,
    pub embedding_model: String,
}

/// The answering pipeline. Stateless across calls; `answer` may run concurrently.
pub struct AnswerPipeline {
    catalog: Arc<Catalog>,
    exact: ExactMatchRetriever,
    semantic: SemanticRetriever,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    token_counter: Arc<dyn TokenCounter>,
    check_model_encoding: bool,
}

impl AnswerPipeline {
    pub fn new(components: PipelineComponents) -> Self {
        let catalog = Arc::new(components.catalog);
        Self {
            exact: ExactMatchRetriever::new(
                components.embedder.clone(),
                catalog.clone(),
                components.embedding_model.clone(),
            ),
            semantic: SemanticRetriever::new(
                components.embedder,
                catalog.clone(),
                components.preprocessor,
                components.embedding_model,
            ),
            assembler: ContextAssembler::new(components.token_counter.clone()),
            catalog,
            generator: components.generator,
            token_counter: components.token_counter,
            check_model_encoding: false,
        }
    }

    /// Reject generation models whose tokenizer differs from the token counter's.
    pub fn with_model_encoding_check(mut self, enabled: bool) -> Self {
        self.check_model_encoding = enabled;
        self
    }

    /// Build the pipeline and its HTTP collaborators from configuration.
    ///
    /// Without an explicit `generation.encoding`, the token counter follows the default
    /// generation model and per-call models must use the same encoding.
    pub fn from_config(
        config: &FaqgateConfig,
        cred_store: &dyn CredentialStore,
    ) -> std::result::Result<Self, ConfigError> {
        let token_counter = match &config.generation.encoding {
            Some(encoding) => TiktokenCounter::for_encoding(encoding)?,
            None => TiktokenCounter::for_model(&config.answer.generation_model)?,
        };

        let pipeline = Self::new(PipelineComponents {
            embedder: create_embedder(&config.embedding, cred_store)?,
            catalog: Catalog::from_config(config, cred_store)?,
            generator: create_generator(&config.generation, cred_store)?,
            token_counter: Arc::new(token_counter),
            preprocessor: create_preprocessor(&config.preprocess)?,
            embedding_model: config.embedding.model.clone(),
        });

        info!(
            partitions = pipeline.catalog.partition_ids().len(),
            corpora = pipeline.catalog.corpus_ids().len(),
            embedder = config.embedding.provider.as_str(),
            generator = pipeline.generator.provider_name(),
            encoding = pipeline.token_counter.encoding(),
            "Answer pipeline ready"
        );
        Ok(pipeline.with_model_encoding_check(config.generation.encoding.is_none()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Answer one question.
    ///
    /// Configuration problems (unknown partition or corpus, invalid options) are
    /// reported before any external call. Provider failures are surfaced with the stage
    /// they happened in and are never retried here.
    pub async fn answer(
        &self,
        query: &str,
        topic_partition: &str,
        corpus: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerResult> {
        let query_id = Uuid::new_v4();
        let span = info_span!(
            "answer",
            query_id = %query_id,
            partition = topic_partition,
            corpus = corpus
        );
        self.run(query_id, query, topic_partition, corpus, options)
            .instrument(span)
            .await
    }

    fn check_inputs(&self, query: &str, options: &AnswerOptions) -> Result<()> {
        options.validate()?;
        if query.trim().is_empty() {
            return Err(AnswerOptions::invalid("query", "must not be empty"));
        }
        if self.check_model_encoding {
            let expected = encoding_for_model(&options.generation_model);
            let actual = self.token_counter.encoding();
            if expected != actual {
                return Err(AnswerOptions::invalid(
                    "generation_model",
                    format!(
                        "model '{}' uses {expected} but the token counter uses {actual}",
                        options.generation_model
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn run(
        &self,
        query_id: Uuid,
        text: &str,
        topic_partition: &str,
        corpus: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerResult> {
        self.check_inputs(text, options)?;
        let faq = self.catalog.resolve_partition(topic_partition)?;
        let docs = self.catalog.resolve_corpus(corpus)?;

        let query = Query::new(text)
            .with_language(options.language.clone())
            .with_instruction(options.user_instruction.clone());
        let mut stages = StageTracker::new();

        stages.advance(Stage::ExactLookup)?;
        let candidate = self.exact.lookup_in(query.text(), faq).await?;

        if candidate.similarity_score >= options.confidence_threshold && candidate.has_answer() {
            stages.advance(Stage::ShortCircuit)?;
            info!(
                score = candidate.similarity_score,
                threshold = options.confidence_threshold,
                source = candidate.source_id.as_str(),
                "Serving FAQ answer"
            );
            stages.advance(Stage::Done)?;
            return Ok(AnswerResult {
                query_id,
                query: query.text().to_string(),
                citations: vec![Citation {
                    source_id: candidate.source_id.clone(),
                    rank: 1,
                    retrieval_score: candidate.similarity_score,
                    excerpt: candidate.answer_text.clone(),
                }],
                origin: AnswerOrigin::ExactMatch {
                    confidence_score: candidate.similarity_score,
                    source_id: candidate.source_id,
                },
                answer_text: candidate.answer_text,
                supplementary_reference: None,
                stages: stages.finish(),
                answered_at: chrono::Utc::now(),
            });
        }

        if candidate.similarity_score >= options.confidence_threshold {
            warn!(
                score = candidate.similarity_score,
                source = candidate.source_id.as_str(),
                "FAQ match above threshold has no answer text, falling back"
            );
        }
        info!(
            score = candidate.similarity_score,
            threshold = options.confidence_threshold,
            k = options.fallback_k,
            "Falling back to semantic search"
        );

        stages.advance(Stage::FallbackSearch)?;
        let fragments = self
            .semantic
            .search_in(query.text(), docs, options.fallback_k)
            .await?;

        stages.advance(Stage::Assemble)?;
        let fallback_answer = candidate
            .has_answer()
            .then_some(candidate.answer_text.as_str());
        let context = self
            .assembler
            .assemble(fragments, fallback_answer, options.max_prompt_tokens)?;

        stages.advance(Stage::Generate)?;
        let prompt = PromptEnvelope::new(&query, &context).render();
        let prompt_tokens = self.token_counter.count(&prompt);
        let max_output_tokens = options.output_budget(prompt_tokens);
        if prompt_tokens > options.max_prompt_tokens || max_output_tokens == 0 {
            let max_tokens = match options.context_window {
                Some(window) if prompt_tokens <= options.max_prompt_tokens => window,
                _ => options.max_prompt_tokens,
            };
            return Err(PipelineError::ContextTooLarge {
                stage: Stage::Generate,
                token_count: prompt_tokens,
                max_tokens,
                minimum_tokens: prompt_tokens.saturating_sub(context.token_count()),
            });
        }

        let request = GenerationRequest {
            prompt,
            model: options.generation_model.clone(),
            max_output_tokens,
        };
        debug!(prompt_tokens, max_output_tokens, "Calling generator");

        let started = Instant::now();
        let outcome = self.generator.generate(request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (generation, truncated) = match outcome {
            Ok(generation) => (generation, false),
            Err(GenerationError::Truncated { partial, .. }) if options.allow_truncated => {
                warn!(
                    model = partial.model.as_str(),
                    max_output_tokens, "Returning truncated answer"
                );
                (partial, true)
            }
            Err(GenerationError::Truncated { partial, .. }) => {
                return Err(PipelineError::GenerationTruncated {
                    model: options.generation_model.clone(),
                    max_output_tokens,
                    partial_text: strip_markers(&partial.text),
                });
            }
            Err(GenerationError::Provider(source)) => {
                return Err(PipelineError::GenerationUnavailable {
                    model: options.generation_model.clone(),
                    source,
                });
            }
        };

        stages.advance(Stage::Done)?;
        let citations: Vec<Citation> = context.fragments().iter().map(Citation::from).collect();
        info!(
            latency_ms,
            prompt_tokens,
            tokens_used = generation.tokens_used(),
            citations = citations.len(),
            truncated,
            "Generated answer"
        );

        Ok(AnswerResult {
            query_id,
            query: query.text().to_string(),
            answer_text: strip_markers(&generation.text),
            origin: AnswerOrigin::Generated(GenerationMetadata {
                model: generation.model.clone(),
                prompt_tokens,
                tokens_used: generation.tokens_used(),
                latency_ms,
                max_output_tokens,
                truncated,
            }),
            citations,
            supplementary_reference: context.fallback_answer().map(str::to_string),
            stages: stages.finish(),
            answered_at: chrono::Utc::now(),
        })
    }
}
