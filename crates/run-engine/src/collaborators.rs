//! Contracts for the external collaborators the engine consumes but does
//! not own: the plan producer, the brand-context retriever, and the
//! embedding provider behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use runflow_core_types::EngineError;
use runflow_plan_dsl::PlanDraft;

/// One retrieved context snippet, ordered by relevance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub doc_id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
}

/// Turns task text plus retrieved context into a proposed plan. A failure
/// here rejects plan creation; no run is persisted.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, task: &str, context: &[ContextSnippet]) -> Result<PlanDraft, EngineError>;
}

/// Ordered top-k context lookup. An empty result is non-fatal.
#[async_trait]
pub trait Retrieval: Send + Sync {
    async fn top_k(&self, task: &str, k: usize) -> Result<Vec<ContextSnippet>, EngineError>;
}

/// Text embedding provider backing the retrieval index.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, dimension: usize) -> Result<Vec<f32>, EngineError>;
}
