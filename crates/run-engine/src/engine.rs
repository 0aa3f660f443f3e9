//! Pull-based dispatch: the caller's `execute_next_step` is the only driver
//! of progress. Every state transition is committed to the repository before
//! the call returns, and every observable event lands in the audit log.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tracing::{info, instrument, warn};

use runflow_audit_log::{AuditLog, LogEntry};
use runflow_core_types::{
    EngineError, ErrorKind, LogLevel, RunId, RunStatus, StepKind, StepStatus,
};
use runflow_plan_dsl::Plan;
use runflow_session_manager::{SessionEvents, SessionManager};
use runflow_step_interpreter::{StepInterpreter, StepOutcome};
use runflow_ssrf_guard::SsrfGuard;

use crate::metrics::EngineMetrics;
use crate::model::{DispatchReport, RunRecord, RunSnapshot};
use crate::repository::RunRepository;

/// Everything the engine needs, injected by the composition root.
pub struct EngineDeps {
    pub repo: Arc<dyn RunRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub sessions: Arc<SessionManager>,
    pub interpreter: StepInterpreter,
    pub guard: SsrfGuard,
}

/// Appends session lifecycle events to the audit trail, including idle
/// reclamations performed by the background reaper.
pub struct AuditSessionEvents {
    audit: Arc<dyn AuditLog>,
}

impl AuditSessionEvents {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl SessionEvents for AuditSessionEvents {
    async fn session_opened(&self, run: &RunId) {
        self.audit
            .append(run, LogLevel::Info, "session opened", json!({}))
            .await;
    }

    async fn session_closed(&self, run: &RunId, reason: &str) {
        self.audit
            .append(run, LogLevel::Info, "session closed", json!({ "reason": reason }))
            .await;
    }
}

pub struct RunEngine {
    repo: Arc<dyn RunRepository>,
    audit: Arc<dyn AuditLog>,
    sessions: Arc<SessionManager>,
    interpreter: StepInterpreter,
    guard: SsrfGuard,
    dispatch_locks: DashMap<RunId, Arc<tokio::sync::Mutex<()>>>,
    metrics: EngineMetrics,
}

impl RunEngine {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            repo: deps.repo,
            audit: deps.audit,
            sessions: deps.sessions,
            interpreter: deps.interpreter,
            guard: deps.guard,
            dispatch_locks: DashMap::new(),
            metrics: EngineMetrics::default(),
        }
    }

    /// Create a run from an already-validated plan. The record is durably
    /// stored before the id is returned; a failed store means no run exists.
    pub async fn create_run(
        &self,
        task: &str,
        plan: Plan,
        starting_url: &str,
    ) -> Result<RunId, EngineError> {
        let record = RunRecord::new(task, plan, starting_url);
        let id = record.id.clone();
        let steps: Vec<_> = record
            .steps
            .iter()
            .map(|s| {
                json!({
                    "id": &s.id,
                    "instruction": &s.raw,
                    "kind": s.kind,
                    "requires_approval": s.requires_approval,
                })
            })
            .collect();
        self.repo.create(record).await?;
        self.audit
            .append(
                &id,
                LogLevel::Info,
                "run created",
                json!({ "task": task, "starting_url": starting_url, "steps": steps }),
            )
            .await;
        info!(run = %id, "run created");
        Ok(id)
    }

    /// Current snapshot plus the ordered audit trail.
    pub async fn get_run(&self, run: &RunId) -> Result<(RunSnapshot, Vec<LogEntry>), EngineError> {
        let record = self.load(run).await?;
        let logs = self.audit.read_all(run).await;
        Ok((RunSnapshot::from(&record), logs))
    }

    /// Execute the next pending step. Strictly serialized per run: a second
    /// concurrent call for the same run is rejected with `RunBusy` rather
    /// than interleaved. Terminal runs are a no-op.
    #[instrument(skip_all, fields(run = %run))]
    pub async fn execute_next_step(&self, run: &RunId) -> Result<DispatchReport, EngineError> {
        let lock = self
            .dispatch_locks
            .entry(run.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _permit = lock.try_lock_owned().map_err(|_| {
            EngineError::new(ErrorKind::RunBusy, format!("run {run} has a step in flight"))
        })?;

        let mut record = self.load(run).await?;

        if record.status.is_terminal() {
            return Ok(DispatchReport {
                run_id: run.clone(),
                status: record.status,
                executed_step_id: None,
            });
        }

        let Some(index) = record.next_pending() else {
            // Nothing pending; settle the status and report.
            record.status = record.derived_status();
            record.touch();
            self.repo.store(record.clone()).await?;
            return Ok(DispatchReport {
                run_id: run.clone(),
                status: record.status,
                executed_step_id: None,
            });
        };

        if record.steps[index].gated() {
            return self.pause_for_approval(record, index).await;
        }

        record.status = RunStatus::Running;
        record.touch();
        self.repo.store(record.clone()).await?;

        let step_id = record.steps[index].id.clone();
        self.audit
            .append(
                run,
                LogLevel::Info,
                "step dispatch attempted",
                json!({
                    "step_index": index,
                    "step_id": &step_id,
                    "instruction": record.steps[index].instruction.to_string(),
                    "starting_url": &record.starting_url,
                }),
            )
            .await;

        if record.steps[index].kind == StepKind::NonUi {
            return self.skip_non_ui(record, index).await;
        }

        // Implicit initial navigation happens when the session is created
        // (or recreated after idle); vet the target before that can occur.
        if !self.sessions.has_session(run) {
            if let Err(guard_err) = self.guard.check(&record.starting_url).await {
                self.metrics.record_ssrf_block();
                return self
                    .fail_step(record, index, guard_err.into(), "navigation blocked")
                    .await;
            }
        }

        let lease = match self.sessions.acquire(run, &record.starting_url).await {
            Ok(lease) => lease,
            Err(err) => {
                // The step stays pending and the run stays resumable: the
                // next dispatch retries session creation.
                self.audit
                    .append(
                        run,
                        LogLevel::Error,
                        "session unavailable",
                        json!({ "step_id": &step_id, "detail": &err.detail }),
                    )
                    .await;
                self.metrics.record_dispatch_fail("session_unavailable");
                return Err(err);
            }
        };

        let started = Instant::now();
        let session = lease.session();
        let result = self
            .interpreter
            .execute(run, &step_id, &record.steps[index].instruction, session.as_ref())
            .await;
        drop(lease);

        match result {
            Ok(outcome) => {
                self.metrics
                    .record_dispatch_ok(started.elapsed().as_millis() as u64);
                self.complete_step(record, index, outcome).await
            }
            Err(err) => {
                self.metrics.record_dispatch_fail(&err.kind.to_string());
                self.fail_step(record, index, err, "step failed").await
            }
        }
    }

    /// Grant the pending approval gate, moving the run back to `Running`.
    /// Approving a run that is not paused is a no-op.
    pub async fn approve(&self, run: &RunId) -> Result<RunSnapshot, EngineError> {
        let mut record = self.load(run).await?;
        if record.status == RunStatus::AwaitingApproval {
            if let Some(index) = record.next_pending() {
                record.steps[index].approved = true;
                record.status = RunStatus::Running;
                record.touch();
                let step_id = record.steps[index].id.clone();
                self.repo.store(record.clone()).await?;
                self.audit
                    .append(
                        run,
                        LogLevel::Info,
                        "approval granted",
                        json!({ "step_id": &step_id }),
                    )
                    .await;
                info!(run = %run, step = %step_id, "approval granted");
            }
        }
        Ok(RunSnapshot::from(&record))
    }

    /// Release the run's session resources. Valid in any run state and
    /// idempotent; the run status is never changed by this call.
    pub async fn close_session(&self, run: &RunId) -> Result<(), EngineError> {
        self.load(run).await?;
        self.sessions.close(run).await;
        Ok(())
    }

    async fn load(&self, run: &RunId) -> Result<RunRecord, EngineError> {
        self.repo.get(run).await.ok_or_else(|| {
            EngineError::new(ErrorKind::RunNotFound, format!("run {run} not found"))
        })
    }

    async fn pause_for_approval(
        &self,
        mut record: RunRecord,
        index: usize,
    ) -> Result<DispatchReport, EngineError> {
        let run = record.id.clone();
        let step_id = record.steps[index].id.clone();
        if record.status != RunStatus::AwaitingApproval {
            record.status = RunStatus::AwaitingApproval;
            record.touch();
            self.repo.store(record.clone()).await?;
            self.audit
                .append(
                    &run,
                    LogLevel::Info,
                    "approval requested",
                    json!({ "step_id": &step_id, "instruction": &record.steps[index].raw }),
                )
                .await;
            self.metrics.record_approval_gate();
            info!(run = %run, step = %step_id, "awaiting approval");
        }
        Ok(DispatchReport {
            run_id: run,
            status: RunStatus::AwaitingApproval,
            executed_step_id: None,
        })
    }

    async fn skip_non_ui(
        &self,
        mut record: RunRecord,
        index: usize,
    ) -> Result<DispatchReport, EngineError> {
        let run = record.id.clone();
        let step_id = record.steps[index].id.clone();
        record.steps[index].status = StepStatus::Skipped;
        record.status = record.derived_status();
        record.touch();
        self.repo.store(record.clone()).await?;
        self.audit
            .append(
                &run,
                LogLevel::Info,
                "step skipped",
                json!({ "step_id": &step_id, "reason": "non-ui step" }),
            )
            .await;
        Ok(DispatchReport {
            run_id: run,
            status: record.status,
            executed_step_id: Some(step_id),
        })
    }

    async fn complete_step(
        &self,
        mut record: RunRecord,
        index: usize,
        outcome: StepOutcome,
    ) -> Result<DispatchReport, EngineError> {
        let run = record.id.clone();
        let step_id = record.steps[index].id.clone();
        record.steps[index].status = StepStatus::Executed;
        record.status = record.derived_status();
        record.touch();
        self.repo.store(record.clone()).await?;

        let mut payload = json!({
            "step_index": index,
            "step_id": &step_id,
            "verb": record.steps[index].instruction.verb(),
            "argument": record.steps[index].instruction.argument(),
            "final_url": &outcome.final_url,
            "title": &outcome.title,
        });
        if let Some(artifact) = &outcome.artifact {
            payload["screenshot_url"] = json!(&artifact.public_path);
        }
        self.audit
            .append(&run, LogLevel::Info, "step executed", payload)
            .await;
        info!(run = %run, step = %step_id, status = %record.status, "step executed");

        Ok(DispatchReport {
            run_id: run,
            status: record.status,
            executed_step_id: Some(step_id),
        })
    }

    async fn fail_step(
        &self,
        mut record: RunRecord,
        index: usize,
        err: EngineError,
        message: &str,
    ) -> Result<DispatchReport, EngineError> {
        let run = record.id.clone();
        let step_id = record.steps[index].id.clone();
        record.steps[index].status = StepStatus::Failed;
        record.status = RunStatus::Error;
        record.touch();
        self.repo.store(record.clone()).await?;

        self.audit
            .append(
                &run,
                LogLevel::Error,
                message,
                json!({
                    "step_index": index,
                    "step_id": &step_id,
                    "verb": record.steps[index].instruction.verb(),
                    "argument": record.steps[index].instruction.argument(),
                    "error_kind": err.kind,
                    "detail": &err.detail,
                }),
            )
            .await;
        warn!(run = %run, step = %step_id, kind = %err.kind, "step failed, run terminal");

        Ok(DispatchReport {
            run_id: run,
            status: RunStatus::Error,
            executed_step_id: Some(step_id),
        })
    }
}
