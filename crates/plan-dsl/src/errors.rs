use thiserror::Error;

use runflow_core_types::{EngineError, ErrorKind};

/// Rejection reasons for a proposed plan. The plan is rejected as a whole;
/// the index points at the first offending step.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PlanError {
    #[error("plan is empty")]
    Empty,

    #[error("plan has {len} steps, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("step {index}: unrecognized instruction: {text}")]
    UnknownInstruction { index: usize, text: String },

    #[error("step {index}: {reason}")]
    BadArgument { index: usize, reason: String },

    #[error("step {index}: duplicate step id '{id}'")]
    DuplicateStepId { index: usize, id: String },
}

impl PlanError {
    /// Index of the first offending step, when the error is step-scoped.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            PlanError::Empty | PlanError::TooLong { .. } => None,
            PlanError::UnknownInstruction { index, .. }
            | PlanError::BadArgument { index, .. }
            | PlanError::DuplicateStepId { index, .. } => Some(*index),
        }
    }
}

impl From<PlanError> for EngineError {
    fn from(err: PlanError) -> Self {
        let kind = match &err {
            PlanError::UnknownInstruction { .. } => ErrorKind::UnknownInstruction,
            _ => ErrorKind::PlanValidation,
        };
        EngineError::new(kind, err.to_string())
    }
}
