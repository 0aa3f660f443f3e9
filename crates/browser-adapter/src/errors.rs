use thiserror::Error;

use runflow_core_types::{EngineError, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdapterErrorKind {
    /// No element matched the selector or text.
    SelectorNotFound,
    /// The action exceeded its budget.
    Timeout,
    /// Screenshot capture failed.
    CaptureFailed,
    /// Browser process could not be launched or died.
    Launch,
    /// DevTools protocol or transport failure.
    Io,
    Internal,
}

/// Adapter failure: a kind plus an optional hint with the underlying cause.
#[derive(Clone, Debug, Error)]
#[error("{kind:?}{}", .hint.as_deref().map(|h| format!(": {h}")).unwrap_or_default())]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self { kind, hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn kind(&self) -> AdapterErrorKind {
        self.kind
    }
}

impl From<AdapterError> for EngineError {
    fn from(err: AdapterError) -> Self {
        let kind = match err.kind {
            AdapterErrorKind::SelectorNotFound => ErrorKind::SelectorNotFound,
            AdapterErrorKind::Timeout => ErrorKind::Timeout,
            AdapterErrorKind::CaptureFailed => ErrorKind::CaptureFailed,
            AdapterErrorKind::Launch => ErrorKind::SessionUnavailable,
            AdapterErrorKind::Io | AdapterErrorKind::Internal => ErrorKind::Internal,
        };
        EngineError::new(kind, err.to_string())
    }
}
