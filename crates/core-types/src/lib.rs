//! Shared identifiers, status enums, and the engine-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of one run (one execution instance of a validated plan).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one step, stable within its run.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    /// Plan-ordinal id (`s1`, `s2`, ...) assigned during validation when the
    /// planner did not supply one.
    pub fn from_index(index: usize) -> Self {
        Self(format!("s{}", index + 1))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a write-once artifact blob.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub run: RunId,
    pub step: StepId,
    pub label: String,
}

impl ArtifactKey {
    pub fn new(run: RunId, step: StepId, label: impl Into<String>) -> Self {
        Self {
            run,
            step,
            label: label.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.run, self.step, self.label)
    }
}

/// Lifecycle state of a run. Terminal states accept no further dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Created,
    Running,
    AwaitingApproval,
    Done,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Created => "CREATED",
            RunStatus::Running => "RUNNING",
            RunStatus::AwaitingApproval => "AWAITING_APPROVAL",
            RunStatus::Done => "DONE",
            RunStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a step. Moves forward only; a terminal step is never
/// re-executed within the same run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Executed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepStatus::Pending)
    }
}

/// Whether a step drives the browser or is a non-UI bookkeeping step.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Ui,
    NonUi,
}

/// Severity of an audit log entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// Classified failure cause, surfaced in audit payloads and API responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PlanValidation,
    UnknownInstruction,
    SsrfBlocked,
    SessionUnavailable,
    SelectorNotFound,
    Timeout,
    AssertionFailed,
    CaptureFailed,
    ApprovalRequired,
    RunNotFound,
    RunBusy,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::PlanValidation => "plan_validation",
            ErrorKind::UnknownInstruction => "unknown_instruction",
            ErrorKind::SsrfBlocked => "ssrf_blocked",
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::SelectorNotFound => "selector_not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AssertionFailed => "assertion_failed",
            ErrorKind::CaptureFailed => "capture_failed",
            ErrorKind::ApprovalRequired => "approval_required",
            ErrorKind::RunNotFound => "run_not_found",
            ErrorKind::RunBusy => "run_busy",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Engine-wide error: a classified kind plus human-readable detail.
///
/// Component crates keep their own richer error enums and fold into this at
/// the engine boundary, so audit payloads always carry a stable `kind`.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    pub fn selector_not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SelectorNotFound, detail)
    }

    pub fn session_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionUnavailable, detail)
    }

    pub fn ssrf_blocked(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SsrfBlocked, detail)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn step_id_from_index_is_one_based() {
        assert_eq!(StepId::from_index(0).0, "s1");
        assert_eq!(StepId::from_index(4).0, "s5");
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::AwaitingApproval.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
    }

    #[test]
    fn run_status_serializes_screaming() {
        let s = serde_json::to_string(&RunStatus::AwaitingApproval).unwrap();
        assert_eq!(s, "\"AWAITING_APPROVAL\"");
    }

    #[test]
    fn engine_error_display_includes_kind() {
        let err = EngineError::timeout("click budget exceeded");
        assert_eq!(err.to_string(), "timeout: click budget exceeded");
    }
}
