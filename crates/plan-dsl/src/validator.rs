use std::collections::HashSet;

use runflow_core_types::StepId;

use crate::errors::PlanError;
use crate::instruction::{Instruction, ParseFailure};
use crate::model::{Plan, PlanDraft, PlanStep};

/// Bounds enforced on every accepted plan.
#[derive(Clone, Copy, Debug)]
pub struct PlanLimits {
    /// Maximum number of steps; longer plans are rejected outright.
    pub max_plan_len: usize,
    /// `WAIT_MS` arguments are clamped to this many milliseconds.
    pub max_wait_ms: u64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_plan_len: 32,
            max_wait_ms: 30_000,
        }
    }
}

/// Validates a proposed plan against the instruction grammar and the
/// configured bounds. Pure: no IO, no side effects, rejection means the run
/// is never created.
#[derive(Clone, Debug, Default)]
pub struct PlanValidator {
    limits: PlanLimits,
}

impl PlanValidator {
    pub fn new(limits: PlanLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PlanLimits {
        self.limits
    }

    /// Validate the whole draft, returning a normalized [`Plan`] on success
    /// or the first offending step on failure.
    pub fn validate(&self, draft: &PlanDraft) -> Result<Plan, PlanError> {
        if draft.steps.is_empty() {
            return Err(PlanError::Empty);
        }
        if draft.steps.len() > self.limits.max_plan_len {
            return Err(PlanError::TooLong {
                len: draft.steps.len(),
                max: self.limits.max_plan_len,
            });
        }

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut steps = Vec::with_capacity(draft.steps.len());

        for (index, raw) in draft.steps.iter().enumerate() {
            let mut instruction = match Instruction::parse(&raw.instruction) {
                Ok(instruction) => instruction,
                Err(ParseFailure::UnknownVerb) => {
                    return Err(PlanError::UnknownInstruction {
                        index,
                        text: raw.instruction.trim().to_string(),
                    })
                }
                Err(ParseFailure::BadArgument(reason)) => {
                    return Err(PlanError::BadArgument { index, reason })
                }
            };

            if let Instruction::WaitMs(ms) = &mut instruction {
                *ms = (*ms).min(self.limits.max_wait_ms);
            }

            let id = match raw.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => StepId(id.to_string()),
                _ => StepId::from_index(index),
            };
            if !seen_ids.insert(id.0.clone()) {
                return Err(PlanError::DuplicateStepId { index, id: id.0 });
            }

            steps.push(PlanStep {
                id,
                kind: raw.kind,
                instruction,
                raw: raw.instruction.trim().to_string(),
                requires_approval: raw.requires_approval,
                evidence: raw.evidence.clone(),
            });
        }

        Ok(Plan {
            starting_url: draft
                .starting_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            steps,
        })
    }
}
