//! The generative model seam.

use crate::error::GenerationError;
use crate::types::{Generation, GenerationRequest};
use async_trait::async_trait;

/// A text generator backed by a hosted language model.
///
/// Implementations make exactly one provider call per `generate` and never retry.
/// When the model stops because it reached `max_output_tokens`, the partial output is
/// returned inside `GenerationError::Truncated`.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError>;

    /// Human-readable provider name used in logs.
    fn provider_name(&self) -> &str;
}
