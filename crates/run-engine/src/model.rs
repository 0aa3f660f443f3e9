use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runflow_core_types::{RunId, RunStatus, StepId, StepKind, StepStatus};
use runflow_plan_dsl::{Instruction, Plan, PlanStep};

/// Mutable per-step state inside a run record. The instruction itself is
/// immutable; only `status` and the approval mark move, and they move
/// forward only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepState {
    pub id: StepId,
    pub kind: StepKind,
    pub instruction: Instruction,
    /// Original instruction text, for display and audit.
    pub raw: String,
    pub requires_approval: bool,
    pub approved: bool,
    pub status: StepStatus,
    pub evidence: Option<String>,
}

impl From<PlanStep> for StepState {
    fn from(step: PlanStep) -> Self {
        Self {
            id: step.id,
            kind: step.kind,
            instruction: step.instruction,
            raw: step.raw,
            requires_approval: step.requires_approval,
            approved: false,
            status: StepStatus::Pending,
            evidence: step.evidence,
        }
    }
}

impl StepState {
    /// Whether dispatching this step right now must pause for a human.
    pub fn gated(&self) -> bool {
        self.requires_approval && !self.approved && self.status == StepStatus::Pending
    }
}

/// One run: identity, task text, immutable plan, mutable status. The unit
/// of concurrency isolation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub task: String,
    pub starting_url: String,
    pub status: RunStatus,
    pub steps: Vec<StepState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(task: impl Into<String>, plan: Plan, starting_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            task: task.into(),
            starting_url: starting_url.into(),
            status: RunStatus::Created,
            steps: plan.steps.into_iter().map(StepState::from).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Index of the first step that has not reached a terminal status.
    /// Plan order is dispatch order; nothing is ever reordered.
    pub fn next_pending(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// Run status derived purely from step statuses: any failure wins, then
    /// all-terminal means done. Approval pauses are layered on top by the
    /// engine, since they depend on a dispatch attempt having hit the gate.
    pub fn derived_status(&self) -> RunStatus {
        if self
            .steps
            .iter()
            .any(|s| s.status == StepStatus::Failed)
        {
            RunStatus::Error
        } else if self.steps.iter().all(|s| s.status.is_terminal()) {
            RunStatus::Done
        } else {
            RunStatus::Running
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Wire-facing view of one step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepView {
    pub id: StepId,
    pub kind: StepKind,
    pub instruction: String,
    pub requires_approval: bool,
    pub status: StepStatus,
}

impl From<&StepState> for StepView {
    fn from(step: &StepState) -> Self {
        Self {
            id: step.id.clone(),
            kind: step.kind,
            instruction: step.raw.clone(),
            requires_approval: step.requires_approval,
            status: step.status,
        }
    }
}

/// Wire-facing view of one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: RunId,
    pub task: String,
    pub status: RunStatus,
    pub starting_url: String,
    pub steps: Vec<StepView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&RunRecord> for RunSnapshot {
    fn from(record: &RunRecord) -> Self {
        Self {
            id: record.id.clone(),
            task: record.task.clone(),
            status: record.status,
            starting_url: record.starting_url.clone(),
            steps: record.steps.iter().map(StepView::from).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Result of one `execute_next_step` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchReport {
    pub run_id: RunId,
    pub status: RunStatus,
    /// The step consumed by this call, if any. `None` means the call was a
    /// no-op (terminal run) or paused at an approval gate.
    pub executed_step_id: Option<StepId>,
}
