//! Retrieval against the curated FAQ collections and the document corpora.

pub mod exact;
pub mod semantic;

pub use exact::ExactMatchRetriever;
pub use semantic::SemanticRetriever;
