//! Vector store search.
//!
//! The pipeline only ever reads from a vector store: one nearest-neighbour search per
//! retrieval. Index maintenance and ingestion live elsewhere.

use crate::error::{ConfigError, ProviderError};
use crate::providers::{http_client, send_json};
use crate::types::{EmbeddingVector, ScoredPoint};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

/// A nearest-neighbour search backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return at most `limit` points ordered by descending score.
    async fn search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, ProviderError>;

    /// Identifier used in logs (usually the deployment URL).
    fn endpoint(&self) -> &str;
}

/// Qdrant REST client.
pub struct QdrantStore {
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl QdrantStore {
    pub fn new(url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, ConfigError> {
        if url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "stores.<name>.url".into(),
            });
        }
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: url.trim().trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
        })
    }

    fn parse_points(body: &Value) -> Result<Vec<ScoredPoint>, ProviderError> {
        let results = body
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::ResponseParse {
                message: "No result array in Qdrant response".into(),
            })?;

        results
            .iter()
            .map(|point| {
                // Qdrant ids are either unsigned integers or UUID strings.
                let id = match point.get("id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => {
                        return Err(ProviderError::ResponseParse {
                            message: "Qdrant point without id".into(),
                        });
                    }
                };
                let score = point
                    .get("score")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| ProviderError::ResponseParse {
                        message: format!("Qdrant point {id} without score"),
                    })? as f32;
                Ok(ScoredPoint {
                    id,
                    score,
                    payload: point.get("payload").cloned().unwrap_or(Value::Null),
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(
        &self,
        collection: &str,
        vector: &EmbeddingVector,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, ProviderError> {
        let url = format!("{}/collections/{collection}/points/search", self.url);
        debug!(collection, limit, dims = vector.dimensions(), "Searching Qdrant");

        let mut builder = self.client.post(&url).json(&json!({
            "vector": vector.as_slice(),
            "limit": limit,
            "with_payload": true,
        }));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }

        let response = send_json(builder, "Qdrant", self.timeout_secs).await?;
        Self::parse_points(&response)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_points_mixed_ids() {
        let body = json!({
            "result": [
                {"id": 42, "score": 0.98, "payload": {"metadata": {"answer": "8:00–17:00"}}},
                {"id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "score": 0.5}
            ],
            "status": "ok"
        });
        let points = QdrantStore::parse_points(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "42");
        assert_eq!(points[0].payload["metadata"]["answer"], "8:00–17:00");
        assert_eq!(points[1].id, "5c56c793-69f3-4fbf-87e6-c4bf54c28c26");
        assert_eq!(points[1].payload, Value::Null);
    }

    #[test]
    fn test_parse_points_empty_result() {
        let points = QdrantStore::parse_points(&json!({"result": []})).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_parse_points_missing_score() {
        let err = QdrantStore::parse_points(&json!({"result": [{"id": 1}]})).unwrap_err();
        assert!(matches!(err, ProviderError::ResponseParse { .. }));
    }

    #[test]
    fn test_new_trims_url() {
        let store = QdrantStore::new("https://qd.example:6333/ ", None, 5).unwrap();
        assert_eq!(store.endpoint(), "https://qd.example:6333");
        assert!(QdrantStore::new("  ", None, 5).is_err());
    }
}
