use serde::{Deserialize, Serialize};

use runflow_core_types::{StepId, StepKind};

use crate::instruction::Instruction;

/// One step as proposed by a planner, before validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawStep {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_kind", rename = "type")]
    pub kind: StepKind,
    pub instruction: String,
    #[serde(default)]
    pub requires_approval: bool,
    /// Free-text note on what this step should prove. Carried through to the
    /// stored plan but never interpreted.
    #[serde(default)]
    pub evidence: Option<String>,
}

fn default_kind() -> StepKind {
    StepKind::Ui
}

impl RawStep {
    pub fn ui(instruction: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: StepKind::Ui,
            instruction: instruction.into(),
            requires_approval: false,
            evidence: None,
        }
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// A whole proposed plan as produced by a planner.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanDraft {
    #[serde(default)]
    pub starting_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// One validated, normalized step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    pub kind: StepKind,
    pub instruction: Instruction,
    /// The original instruction text as submitted, for display.
    pub raw: String,
    pub requires_approval: bool,
    pub evidence: Option<String>,
}

/// A validated plan, ready for storage. Immutable once a run is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plan {
    pub starting_url: Option<String>,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
