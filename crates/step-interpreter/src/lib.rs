//! Executes exactly one normalized instruction against the run's acquired
//! session. One call performs at most one browser-visible action; it never
//! chains actions, and every blocking verb runs under its own budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use runflow_artifact_store::{ArtifactStore, StoredArtifact};
use runflow_browser_adapter::BrowserSession;
use runflow_core_types::{ArtifactKey, EngineError, ErrorKind, RunId, StepId};
use runflow_plan_dsl::Instruction;

/// Per-verb budgets. The defaults follow what interactive pages tolerate;
/// overrides are capped so a plan can never stall a worker indefinitely.
#[derive(Clone, Copy, Debug)]
pub struct InterpreterTimeouts {
    pub click: Duration,
    pub wait: Duration,
    /// Short grace window for ASSERT_TEXT before it fails.
    pub assert_grace: Duration,
    /// Post-action window for an in-flight navigation to finish.
    pub settle: Duration,
    pub poll_interval: Duration,
    /// Stability pause before every action.
    pub pre_step_pause: Duration,
}

impl Default for InterpreterTimeouts {
    fn default() -> Self {
        Self {
            click: Duration::from_secs(20),
            wait: Duration::from_secs(25),
            assert_grace: Duration::from_secs(8),
            settle: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            pre_step_pause: Duration::from_millis(250),
        }
    }
}

/// Hard cap on any configured budget.
pub const MAX_STEP_TIMEOUT: Duration = Duration::from_secs(60);

impl InterpreterTimeouts {
    /// Clamp every budget to [`MAX_STEP_TIMEOUT`].
    pub fn clamped(mut self) -> Self {
        self.click = self.click.min(MAX_STEP_TIMEOUT);
        self.wait = self.wait.min(MAX_STEP_TIMEOUT);
        self.assert_grace = self.assert_grace.min(MAX_STEP_TIMEOUT);
        self.settle = self.settle.min(MAX_STEP_TIMEOUT);
        self
    }
}

/// Structured result of one executed step.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StepOutcome {
    pub final_url: Option<String>,
    pub title: Option<String>,
    /// Present only for SCREENSHOT steps.
    pub artifact: Option<StoredArtifact>,
}

pub struct StepInterpreter {
    timeouts: InterpreterTimeouts,
    artifacts: Arc<dyn ArtifactStore>,
}

impl StepInterpreter {
    pub fn new(timeouts: InterpreterTimeouts, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            timeouts: timeouts.clamped(),
            artifacts,
        }
    }

    pub fn timeouts(&self) -> InterpreterTimeouts {
        self.timeouts
    }

    /// Execute one instruction. Success marks the step executable-complete;
    /// any error is final for this attempt (no retry happens here).
    #[instrument(skip_all, fields(run = %run, step = %step, verb = instruction.verb()))]
    pub async fn execute(
        &self,
        run: &RunId,
        step: &StepId,
        instruction: &Instruction,
        session: &dyn BrowserSession,
    ) -> Result<StepOutcome, EngineError> {
        let t = self.timeouts;
        tokio::time::sleep(t.pre_step_pause).await;

        let mut outcome = StepOutcome::default();
        match instruction {
            Instruction::ClickText(text) => {
                session.click_text(text, t.click).await?;
                session.settle(t.settle).await;
            }
            Instruction::ClickId(id) => {
                session.click_css(&format!("#{id}"), t.click).await?;
                session.settle(t.settle).await;
            }
            Instruction::ClickCss(selector) => {
                session.click_css(selector, t.click).await?;
                session.settle(t.settle).await;
            }
            Instruction::TypeId { field, value } => {
                session.fill_css(&format!("#{field}"), value, t.click).await?;
            }
            Instruction::WaitText(text) => {
                if !self.poll_text(session, text, t.wait).await? {
                    return Err(EngineError::timeout(format!("text '{text}' did not appear")));
                }
            }
            Instruction::AssertText(text) => {
                // Short grace window, then a hard failure: asserts prove
                // state, they do not wait for it.
                if !self.poll_text(session, text, t.assert_grace).await? {
                    return Err(EngineError::new(
                        ErrorKind::AssertionFailed,
                        format!("expected text '{text}' not found/visible"),
                    ));
                }
            }
            Instruction::WaitUrlContains(fragment) => {
                if !self.poll_url_contains(session, fragment, t.wait).await? {
                    return Err(EngineError::timeout(format!(
                        "url never contained '{fragment}'"
                    )));
                }
            }
            Instruction::WaitMs(ms) => {
                // Bounded at validation; a plain sleep, never fails.
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Instruction::Screenshot(label) => {
                let bytes = session.screenshot_full_page().await?;
                let key = ArtifactKey::new(run.clone(), step.clone(), label.clone());
                let stored = self.artifacts.put(&key, bytes).await?;
                debug!(path = %stored.public_path, "screenshot stored");
                outcome.artifact = Some(stored);
            }
        }

        outcome.final_url = session.current_url().await.ok();
        outcome.title = session.title().await.ok().filter(|t| !t.is_empty());
        Ok(outcome)
    }

    /// Poll for visible text until it appears or the budget elapses.
    async fn poll_text(
        &self,
        session: &dyn BrowserSession,
        text: &str,
        budget: Duration,
    ) -> Result<bool, EngineError> {
        let deadline = Instant::now() + budget;
        loop {
            if session.text_present(text).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!(budget_ms = budget.as_millis() as u64, "text probe budget exhausted");
                return Ok(false);
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }

    /// Poll the current URL for a fragment until it matches or the budget
    /// elapses.
    async fn poll_url_contains(
        &self,
        session: &dyn BrowserSession,
        fragment: &str,
        budget: Duration,
    ) -> Result<bool, EngineError> {
        let deadline = Instant::now() + budget;
        loop {
            if session.current_url().await?.contains(fragment) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!(budget_ms = budget.as_millis() as u64, "url probe budget exhausted");
                return Ok(false);
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use runflow_artifact_store::MemoryArtifactStore;
    use runflow_browser_adapter::ScriptedSession;
    use runflow_core_types::ErrorKind;

    use super::*;

    fn fast_timeouts() -> InterpreterTimeouts {
        InterpreterTimeouts {
            click: Duration::from_millis(100),
            wait: Duration::from_millis(100),
            assert_grace: Duration::from_millis(50),
            settle: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            pre_step_pause: Duration::ZERO,
        }
    }

    fn interpreter() -> (StepInterpreter, Arc<MemoryArtifactStore>) {
        let store = Arc::new(MemoryArtifactStore::new());
        (
            StepInterpreter::new(fast_timeouts(), Arc::clone(&store) as Arc<dyn ArtifactStore>),
            store,
        )
    }

    fn ids() -> (RunId, StepId) {
        (RunId::new(), StepId("s1".into()))
    }

    #[tokio::test]
    async fn click_css_success_reports_final_url() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::new("https://demo.test/login")
            .with_selector("button[type=\"submit\"]")
            .on_click("button[type=\"submit\"]", Some("https://demo.test/secure"), None);

        let outcome = interp
            .execute(
                &run,
                &step,
                &Instruction::ClickCss("button[type=\"submit\"]".into()),
                &session,
            )
            .await
            .unwrap();
        assert_eq!(outcome.final_url.as_deref(), Some("https://demo.test/secure"));
    }

    #[tokio::test]
    async fn click_id_maps_to_an_id_selector() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default().with_selector("#submit");
        interp
            .execute(&run, &step, &Instruction::ClickId("submit".into()), &session)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_selector_is_selector_not_found() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default();
        let err = interp
            .execute(&run, &step, &Instruction::ClickCss("#nope".into()), &session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelectorNotFound);
    }

    #[tokio::test]
    async fn type_id_fills_the_field() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default().with_selector("#username");
        interp
            .execute(
                &run,
                &step,
                &Instruction::TypeId {
                    field: "username".into(),
                    value: "tomsmith".into(),
                },
                &session,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_text_polls_until_present() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default().text_after_polls("Welcome", 3);
        interp
            .execute(&run, &step, &Instruction::WaitText("Welcome".into()), &session)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_text_times_out() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default();
        let err = interp
            .execute(&run, &step, &Instruction::WaitText("Never".into()), &session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn assert_text_fails_with_assertion_kind() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default().with_body("something else");
        let err = interp
            .execute(&run, &step, &Instruction::AssertText("Secure Area".into()), &session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AssertionFailed);
    }

    #[tokio::test]
    async fn assert_text_passes_when_present() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default().with_body("You logged into a secure area");
        interp
            .execute(
                &run,
                &step,
                &Instruction::AssertText("secure area".into()),
                &session,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_url_contains_observes_navigation() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::new("https://demo.test/secure");
        interp
            .execute(
                &run,
                &step,
                &Instruction::WaitUrlContains("/secure".into()),
                &session,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_ms_just_elapses() {
        let (interp, _) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default();
        let started = Instant::now();
        interp
            .execute(&run, &step, &Instruction::WaitMs(20), &session)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn screenshot_stores_exactly_one_artifact() {
        let (interp, store) = interpreter();
        let (run, step) = ids();
        let session = ScriptedSession::default();
        let outcome = interp
            .execute(&run, &step, &Instruction::Screenshot("login".into()), &session)
            .await
            .unwrap();
        let artifact = outcome.artifact.expect("screenshot artifact");
        assert_eq!(
            artifact.public_path,
            format!("/artifacts/{}/{}/login", run, step)
        );
        assert_eq!(store.len(), 1);
        assert!(store.get(&artifact.key).await.unwrap().starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn budgets_are_clamped() {
        let t = InterpreterTimeouts {
            click: Duration::from_secs(600),
            ..InterpreterTimeouts::default()
        }
        .clamped();
        assert_eq!(t.click, MAX_STEP_TIMEOUT);
    }
}
