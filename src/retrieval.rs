//! Brand-kit grounding: a deterministic local embedder, an in-memory
//! document index, and cosine top-k retrieval over it. All three sit behind
//! the engine's collaborator traits so a hosted embedding service can be
//! swapped in without touching the engine.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use runflow_core_types::EngineError;
use runflow_run_engine::{ContextSnippet, Embedder, Retrieval};

/// One document as submitted for indexing.
#[derive(Clone, Debug, Deserialize)]
pub struct BrandDocInput {
    pub title: String,
    pub content: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_source() -> String {
    "manual".into()
}

#[derive(Clone, Debug)]
struct IndexedDoc {
    title: String,
    content: String,
    embedding: Vec<f32>,
}

/// In-memory embedding index keyed by a dense id.
#[derive(Default)]
pub struct BrandIndex {
    docs: DashMap<u64, IndexedDoc>,
}

impl BrandIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn index(
        &self,
        embedder: &dyn Embedder,
        docs: Vec<BrandDocInput>,
        dimension: usize,
    ) -> Result<usize, EngineError> {
        let mut count = 0;
        for doc in docs {
            let embedding = embedder.embed(&doc.content, dimension).await?;
            let id = self.docs.len() as u64 + 1;
            self.docs.insert(
                id,
                IndexedDoc {
                    title: doc.title,
                    content: doc.content,
                    embedding,
                },
            );
            count += 1;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Cosine similarity; zero vectors score zero rather than dividing by zero.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-9);
    let nb: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt().max(1e-9);
    dot / (na * nb)
}

/// Top-k retrieval over the brand index.
pub struct CosineRetrieval {
    index: Arc<BrandIndex>,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
}

impl CosineRetrieval {
    pub fn new(index: Arc<BrandIndex>, embedder: Arc<dyn Embedder>, dimension: usize) -> Self {
        Self {
            index,
            embedder,
            dimension,
        }
    }
}

#[async_trait]
impl Retrieval for CosineRetrieval {
    async fn top_k(&self, task: &str, k: usize) -> Result<Vec<ContextSnippet>, EngineError> {
        let query = self.embedder.embed(task, self.dimension).await?;
        let mut scored: Vec<ContextSnippet> = self
            .index
            .docs
            .iter()
            .map(|entry| ContextSnippet {
                doc_id: entry.key().to_string(),
                title: entry.value().title.clone(),
                content: entry.value().content.clone(),
                score: cosine(&query, &entry.value().embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Deterministic local embedder: a hash-seeded pseudo-random unit vector per
/// text. No model, no network; the same text always embeds identically,
/// which is exactly what demos and tests need.
#[derive(Clone, Debug, Default)]
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str, dimension: usize) -> Result<Vec<f32>, EngineError> {
        if dimension == 0 {
            return Err(EngineError::internal("embedding dimension must be > 0"));
        }
        let mut hasher = DefaultHasher::new();
        dimension.hash(&mut hasher);
        text.hash(&mut hasher);
        let mut state = hasher.finish() | 1;

        let mut vec = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            // xorshift64*; uniform enough for a similarity toy.
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let sample = (state.wrapping_mul(0x2545F4914F6CDD1D) >> 40) as f32;
            vec.push(sample / (1u64 << 24) as f32 - 0.5);
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-9);
        for v in &mut vec {
            *v /= norm;
        }
        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let embedder = HashEmbedder;
        let a = embedder.embed("brand voice", 64).await.unwrap();
        let b = embedder.embed("brand voice", 64).await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        let c = embedder.embed("something else", 64).await.unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &v), 0.0);
    }

    #[tokio::test]
    async fn retrieval_ranks_the_matching_doc_first() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder);
        let index = Arc::new(BrandIndex::new());
        index
            .index(
                embedder.as_ref(),
                vec![
                    BrandDocInput {
                        title: "Voice".into(),
                        content: "friendly and concise product voice".into(),
                        source: "manual".into(),
                        tags: vec![],
                    },
                    BrandDocInput {
                        title: "Legal".into(),
                        content: "terms of service boilerplate".into(),
                        source: "manual".into(),
                        tags: vec![],
                    },
                ],
                64,
            )
            .await
            .unwrap();

        let retrieval = CosineRetrieval::new(index, embedder, 64);
        // The identical text must dominate every other document.
        let hits = retrieval
            .top_k("friendly and concise product voice", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Voice");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn empty_index_returns_empty_context() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder);
        let retrieval = CosineRetrieval::new(Arc::new(BrandIndex::new()), embedder, 32);
        assert!(retrieval.top_k("anything", 4).await.unwrap().is_empty());
    }
}
