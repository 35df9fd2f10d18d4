//! Top-K semantic search over a document corpus.

use crate::catalog::{Catalog, Collection};
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};
use crate::preprocess::QueryPreprocessor;
use crate::retrieval::exact::clamp_score;
use crate::stage::Stage;
use crate::types::RetrievedFragment;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retrieves the `k` passages nearest to a query.
pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    catalog: Arc<Catalog>,
    preprocessor: Arc<dyn QueryPreprocessor>,
    embedding_model: String,
}

impl SemanticRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        catalog: Arc<Catalog>,
        preprocessor: Arc<dyn QueryPreprocessor>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            catalog,
            preprocessor,
            embedding_model: embedding_model.into(),
        }
    }

    pub async fn search(&self, query: &str, corpus: &str, k: usize) -> Result<Vec<RetrievedFragment>> {
        let collection = self.catalog.resolve_corpus(corpus)?;
        self.search_in(query, collection, k).await
    }

    /// Search an already-resolved collection.
    ///
    /// Fragments keep the store's order and are ranked 1..n in it. Points without
    /// text at the schema's path are skipped.
    pub async fn search_in(
        &self,
        query: &str,
        collection: &Collection,
        k: usize,
    ) -> Result<Vec<RetrievedFragment>> {
        if k == 0 {
            return Err(PipelineError::InvalidOption {
                option: "fallback_k",
                reason: "must be at least 1".into(),
            });
        }

        let segmented = self.preprocessor.segment(query);
        debug!(query = segmented.as_str(), k, "Semantic search query");

        let vector = self
            .embedder
            .embed(&segmented, &self.embedding_model)
            .await
            .map_err(|source| PipelineError::EmbeddingUnavailable {
                stage: Stage::FallbackSearch,
                model: self.embedding_model.clone(),
                source,
            })?;

        let hits = collection
            .store
            .search(&collection.name, &vector, k)
            .await
            .map_err(|source| PipelineError::SearchUnavailable {
                stage: Stage::FallbackSearch,
                collection: collection.name.clone(),
                source,
            })?;

        let mut fragments = Vec::with_capacity(hits.len().min(k));
        for hit in hits.into_iter().take(k) {
            let Some(text) = collection
                .schema
                .text(&hit.payload)
                .filter(|text| !text.trim().is_empty())
            else {
                warn!(
                    collection = collection.name.as_str(),
                    point = hit.id.as_str(),
                    "Skipping passage without text"
                );
                continue;
            };
            fragments.push(RetrievedFragment {
                content_text: self.preprocessor.restore(text),
                rank: fragments.len() + 1,
                source_id: collection.schema.source_id(&hit.payload, &hit.id),
                retrieval_score: clamp_score(hit.score),
            });
        }

        debug!(
            collection = collection.name.as_str(),
            returned = fragments.len(),
            "Semantic search complete"
        );
        Ok(fragments)
    }
}
