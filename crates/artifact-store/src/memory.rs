//! In-memory store for tests and single-process deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use runflow_core_types::ArtifactKey;

use crate::errors::ArtifactError;
use crate::{public_path, sanitize_label, ArtifactStore, StoredArtifact};

#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: DashMap<ArtifactKey, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<StoredArtifact, ArtifactError> {
        let base_label = sanitize_label(&key.label);
        let mut chosen = ArtifactKey::new(key.run.clone(), key.step.clone(), base_label.clone());
        let mut variant = 1u32;
        while self.blobs.contains_key(&chosen) {
            variant += 1;
            chosen.label = format!("{base_label}_{variant}");
        }
        let len = bytes.len();
        self.blobs.insert(chosen.clone(), bytes);
        Ok(StoredArtifact {
            public_path: public_path(&chosen),
            key: chosen,
            len,
        })
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, ArtifactError> {
        self.blobs
            .get(key)
            .map(|b| b.clone())
            .ok_or(ArtifactError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use runflow_core_types::{RunId, StepId};

    use super::*;

    #[tokio::test]
    async fn write_once_semantics() {
        let store = MemoryArtifactStore::new();
        let key = ArtifactKey::new(RunId("r".into()), StepId("s1".into()), "done");
        let first = store.put(&key, vec![9]).await.unwrap();
        let second = store.put(&key, vec![8]).await.unwrap();
        assert_eq!(first.key.label, "done");
        assert_eq!(second.key.label, "done_2");
        assert_eq!(store.get(&first.key).await.unwrap(), vec![9]);
        assert_eq!(store.len(), 2);
    }
}
