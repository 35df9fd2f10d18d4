//! Context assembly for fallback generation.
//!
//! Retrieved passages and the near-miss FAQ answer are merged into one block whose
//! token count is checked against a budget. An over-budget context is an error; nothing
//! is ever silently dropped to make it fit.

use crate::error::PipelineError;
use crate::prompt::{FRAGMENT_DELIMITER, reference_block, strip_markers};
use crate::stage::Stage;
use crate::tokens::TokenCounter;
use crate::types::RetrievedFragment;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Bounded context handed to the prompt. `token_count <= max_tokens` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    fragments: Vec<RetrievedFragment>,
    fallback_answer: Option<String>,
    text: String,
    token_count: usize,
    max_tokens: usize,
}

impl AssembledContext {
    /// Fragments included in the block, in retrieval order, with markers neutralized.
    /// Passages left empty by neutralization are dropped and ranks renumbered.
    pub fn fragments(&self) -> &[RetrievedFragment] {
        &self.fragments
    }

    pub fn fallback_answer(&self) -> Option<&str> {
        self.fallback_answer.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

fn render_block(fragments: &[RetrievedFragment], fallback: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(fragments.len() * 2 + 2);
    if !fragments.is_empty() {
        parts.push(FRAGMENT_DELIMITER.to_string());
        for fragment in fragments {
            parts.push(fragment.content_text.clone());
            parts.push(FRAGMENT_DELIMITER.to_string());
        }
    }
    if let Some(answer) = fallback {
        parts.push(reference_block(answer));
    }
    parts.join("\n")
}

/// Context assembler with exact, tokenizer-backed budgeting.
#[derive(Clone)]
pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
}

impl ContextAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Build the context block.
    ///
    /// Fails with `ContextTooLarge` when the block exceeds `max_tokens`. The error
    /// carries the minimum size (reference answer plus the first passage) so callers can
    /// tell whether a smaller `fallback_k` would help.
    pub fn assemble(
        &self,
        fragments: Vec<RetrievedFragment>,
        fallback_answer: Option<&str>,
        max_tokens: usize,
    ) -> Result<AssembledContext, PipelineError> {
        let fragments: Vec<RetrievedFragment> = fragments
            .into_iter()
            .filter_map(|f| {
                let content_text = strip_markers(&f.content_text);
                if content_text.trim().is_empty() {
                    debug!(source = f.source_id.as_str(), "Dropping empty passage");
                    return None;
                }
                Some(RetrievedFragment { content_text, ..f })
            })
            .enumerate()
            .map(|(i, f)| RetrievedFragment { rank: i + 1, ..f })
            .collect();
        let fallback_answer = fallback_answer
            .map(strip_markers)
            .filter(|a| !a.is_empty());

        let text = render_block(&fragments, fallback_answer.as_deref());
        let token_count = if text.is_empty() {
            0
        } else {
            self.counter.count(&text)
        };

        if token_count > max_tokens {
            let minimum_tokens = self
                .counter
                .count(&render_block(&fragments[..fragments.len().min(1)], fallback_answer.as_deref()));
            return Err(PipelineError::ContextTooLarge {
                stage: Stage::Assemble,
                token_count,
                max_tokens,
                minimum_tokens,
            });
        }

        debug!(
            fragments = fragments.len(),
            has_reference = fallback_answer.is_some(),
            token_count,
            max_tokens,
            "Assembled context"
        );

        Ok(AssembledContext {
            fragments,
            fallback_answer,
            text,
            token_count,
            max_tokens,
        })
    }
}
