//! Write-once artifact blobs (screenshot evidence). A second write for the
//! same `(run, step, label)` key never overwrites: it is stored under a
//! numbered variant of the label instead.

pub mod errors;
pub mod fs;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use runflow_core_types::ArtifactKey;

pub use errors::ArtifactError;
pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Receipt for a stored artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Key actually used; differs from the requested key only in the label
    /// suffix applied on collision.
    pub key: ArtifactKey,
    /// Stable public path, resolvable against the artifact route.
    pub public_path: String,
    pub len: usize,
}

/// Content-addressable write/read surface over the external byte store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes under the key; on key collision a numbered label variant
    /// is used so existing evidence is never overwritten.
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<StoredArtifact, ArtifactError>;

    /// Byte-for-byte retrieval of what was written.
    async fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, ArtifactError>;
}

/// Public path for a key: `/artifacts/{run}/{step}/{label}`.
pub fn public_path(key: &ArtifactKey) -> String {
    format!("/artifacts/{}/{}/{}", key.run, key.step, key.label)
}

/// Collapse a free-text label to a filesystem-safe slug.
pub fn sanitize_label(label: &str) -> String {
    let slug: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "shot".to_string()
    } else {
        slug
    }
}
