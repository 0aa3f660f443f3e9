//! Filesystem store: `{root}/{run}/{step}/{label}.png`, write-once.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use runflow_core_types::ArtifactKey;

use crate::errors::ArtifactError;
use crate::{public_path, sanitize_label, ArtifactStore, StoredArtifact};

const MAX_LABEL_VARIANTS: u32 = 100;

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root
            .join(&key.run.0)
            .join(&key.step.0)
            .join(format!("{}.png", key.label))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<StoredArtifact, ArtifactError> {
        let base_label = sanitize_label(&key.label);

        let mut chosen = ArtifactKey::new(key.run.clone(), key.step.clone(), base_label.clone());
        let mut variant = 1u32;
        loop {
            let path = self.blob_path(&chosen);
            if tokio::fs::try_exists(&path)
                .await
                .map_err(|e| ArtifactError::Io(e.to_string()))?
            {
                variant += 1;
                if variant > MAX_LABEL_VARIANTS {
                    return Err(ArtifactError::LabelExhausted(base_label));
                }
                chosen.label = format!("{base_label}_{variant}");
                continue;
            }

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ArtifactError::Io(e.to_string()))?;
            }
            let len = bytes.len();
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| ArtifactError::Io(e.to_string()))?;
            debug!(path = %path.display(), len, "artifact written");
            return Ok(StoredArtifact {
                public_path: public_path(&chosen),
                key: chosen,
                len,
            });
        }
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, ArtifactError> {
        let path = self.blob_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArtifactError::NotFound),
            Err(e) => Err(ArtifactError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use runflow_core_types::{RunId, StepId};

    use super::*;

    fn key(label: &str) -> ArtifactKey {
        ArtifactKey::new(RunId("run-a".into()), StepId("s3".into()), label)
    }

    #[tokio::test]
    async fn roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let stored = store.put(&key("login"), vec![1, 2, 3]).await.unwrap();
        assert_eq!(stored.public_path, "/artifacts/run-a/s3/login");
        assert_eq!(store.get(&stored.key).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn second_write_gets_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let first = store.put(&key("login"), vec![1]).await.unwrap();
        let second = store.put(&key("login"), vec![2]).await.unwrap();
        assert_eq!(first.key.label, "login");
        assert_eq!(second.key.label, "login_2");
        // Original evidence is untouched.
        assert_eq!(store.get(&first.key).await.unwrap(), vec![1]);
        assert_eq!(store.get(&second.key).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn labels_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let stored = store.put(&key("after login/../x"), vec![0]).await.unwrap();
        assert_eq!(stored.key.label, "after_login____x");
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        assert!(matches!(
            store.get(&key("nope")).await,
            Err(ArtifactError::NotFound)
        ));
    }
}
