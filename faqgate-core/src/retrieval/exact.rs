//! Top-1 lookup against a curated FAQ collection.

use crate::catalog::{Catalog, Collection};
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use crate::types::MatchCandidate;
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds the single nearest curated answer for a query.
pub struct ExactMatchRetriever {
    embedder: Arc<dyn Embedder>,
    catalog: Arc<Catalog>,
    embedding_model: String,
}

impl ExactMatchRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        catalog: Arc<Catalog>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            catalog,
            embedding_model: embedding_model.into(),
        }
    }

    /// Resolve `topic_partition` and look the query up in it.
    ///
    /// An unknown partition is reported before any external call.
    pub async fn lookup(&self, query: &str, topic_partition: &str) -> Result<MatchCandidate> {
        let collection = self.catalog.resolve_partition(topic_partition)?;
        self.lookup_in(query, collection).await
    }

    /// Look the raw query up in an already-resolved collection.
    ///
    /// Always yields exactly one candidate; an empty collection produces
    /// `MatchCandidate::empty()`.
    pub async fn lookup_in(&self, query: &str, collection: &Collection) -> Result<MatchCandidate> {
        let vector = self
            .embedder
            .embed(query, &self.embedding_model)
            .await
            .map_err(|source| PipelineError::EmbeddingUnavailable {
                stage: Stage::ExactLookup,
                model: self.embedding_model.clone(),
                source,
            })?;

        let hits = collection
            .store
            .search(&collection.name, &vector, 1)
            .await
            .map_err(|source| PipelineError::SearchUnavailable {
                stage: Stage::ExactLookup,
                collection: collection.name.clone(),
                source,
            })?;

        let Some(hit) = hits.into_iter().next() else {
            warn!(collection = collection.name.as_str(), "FAQ collection returned no entries");
            return Ok(MatchCandidate::empty());
        };

        let answer_text = match collection.schema.text(&hit.payload) {
            Some(text) => text.to_string(),
            None => {
                warn!(
                    collection = collection.name.as_str(),
                    point = hit.id.as_str(),
                    path = collection.schema.text_path.as_str(),
                    "FAQ entry has no answer text at the configured payload path"
                );
                String::new()
            }
        };

        let candidate = MatchCandidate {
            answer_text,
            similarity_score: clamp_score(hit.score),
            source_id: collection.schema.source_id(&hit.payload, &hit.id),
        };
        debug!(
            collection = collection.name.as_str(),
            score = candidate.similarity_score,
            source = candidate.source_id.as_str(),
            "Exact-match candidate"
        );
        Ok(candidate)
    }
}

/// Clamp a store score into `[0.0, 1.0]`. NaN maps to 0.
pub(crate) fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PayloadSchema;
    use crate::error::ErrorKind;
    use crate::mock::{MockEmbedder, MockVectorStore};
    use crate::types::ScoredPoint;
    use serde_json::json;

    fn faq_hit(score: f32, answer: &str) -> ScoredPoint {
        ScoredPoint {
            id: "7".into(),
            score,
            payload: json!({"page_content": "Giờ làm việc là gì?", "metadata": {"answer": answer}}),
        }
    }

    fn setup(store: Arc<MockVectorStore>) -> (ExactMatchRetriever, Arc<MockEmbedder>) {
        let embedder = Arc::new(MockEmbedder::new(4));
        let catalog = Catalog::new().with_partition(
            "Congdoan",
            Collection::new("faqVieProcessed", store, PayloadSchema::faq()),
        );
        let retriever =
            ExactMatchRetriever::new(embedder.clone(), Arc::new(catalog), "multilingual-22-12");
        (retriever, embedder)
    }

    #[tokio::test]
    async fn test_lookup_reads_metadata_answer() {
        let store = Arc::new(MockVectorStore::new().with_hits("faqVieProcessed", vec![faq_hit(0.98, "8:00–17:00")]));
        let (retriever, embedder) = setup(store.clone());

        let candidate = retriever.lookup("Giờ làm việc là gì?", "Congdoan").await.unwrap();
        assert_eq!(candidate.answer_text, "8:00–17:00");
        assert_eq!(candidate.similarity_score, 0.98);
        assert_eq!(candidate.source_id, "7");

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].limit, 1);
        assert_eq!(embedder.calls()[0].text, "Giờ làm việc là gì?");
        assert_eq!(embedder.calls()[0].model, "multilingual-22-12");
    }

    #[tokio::test]
    async fn test_empty_collection_yields_empty_candidate() {
        let (retriever, _) = setup(Arc::new(MockVectorStore::new()));
        let candidate = retriever.lookup("q", "Congdoan").await.unwrap();
        assert_eq!(candidate, MatchCandidate::empty());
    }

    #[tokio::test]
    async fn test_unknown_partition_makes_no_calls() {
        let store = Arc::new(MockVectorStore::new());
        let (retriever, embedder) = setup(store.clone());
        let err = retriever.lookup("q", "Taichinh").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownPartition);
        assert!(embedder.calls().is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let store = Arc::new(MockVectorStore::new().with_hits("faqVieProcessed", vec![faq_hit(1.0001, "a")]));
        let (retriever, _) = setup(store);
        let candidate = retriever.lookup("q", "Congdoan").await.unwrap();
        assert_eq!(candidate.similarity_score, 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(f32::NAN), 0.0);
    }

    #[tokio::test]
    async fn test_search_failure_is_search_unavailable() {
        let store = Arc::new(MockVectorStore::new().failing());
        let (retriever, _) = setup(store);
        let err = retriever.lookup("q", "Congdoan").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SearchUnavailable);
        assert_eq!(err.stage(), Stage::ExactLookup);
    }
}
