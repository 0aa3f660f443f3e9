use thiserror::Error;

use runflow_core_types::{EngineError, ErrorKind};

#[derive(Clone, Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found")]
    NotFound,

    #[error("io failure: {0}")]
    Io(String),

    #[error("too many variants for label '{0}'")]
    LabelExhausted(String),
}

impl From<ArtifactError> for EngineError {
    fn from(err: ArtifactError) -> Self {
        EngineError::new(ErrorKind::CaptureFailed, err.to_string())
    }
}
