//! Deterministic heuristic planner. It stands in for a hosted model behind
//! the same [`Planner`] trait: same task text in, same plan out, no network.

use async_trait::async_trait;
use url::Url;

use runflow_core_types::EngineError;
use runflow_plan_dsl::{PlanDraft, RawStep};
use runflow_run_engine::{ContextSnippet, Planner};

pub struct HeuristicPlanner {
    demo_url: String,
}

impl HeuristicPlanner {
    pub fn new(demo_url: impl Into<String>) -> Self {
        Self {
            demo_url: demo_url.into(),
        }
    }

    fn first_url_in(text: &str) -> Option<String> {
        text.split_whitespace()
            .map(|token| token.trim_end_matches(|c: char| matches!(c, ',' | ')' | ']' | '"' | '\'')))
            .find(|token| token.starts_with("http://") || token.starts_with("https://"))
            .and_then(|token| Url::parse(token).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|url| url.to_string())
    }

    fn login_demo_plan(&self) -> PlanDraft {
        let steps = vec![
            step("S1", "CLICK_TEXT: Form Authentication", "Navigated to Form Authentication page"),
            step("S2", "TYPE_ID: username=tomsmith", "Entered username"),
            step("S3", "TYPE_ID: password=SuperSecretPassword!", "Entered password"),
            step("S4", "CLICK_CSS: button[type=\"submit\"]", "Submitted login form"),
            step(
                "S5",
                "WAIT_TEXT: You logged into a secure area!",
                "Verified successful login",
            ),
            step("S6", "SCREENSHOT: after_login", "Captured post-login screen"),
        ];
        PlanDraft {
            starting_url: Some(self.demo_url.clone()),
            steps,
        }
    }

    fn generic_plan(&self, starting_url: String) -> PlanDraft {
        let host = Url::parse(&starting_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let steps = vec![
            step(
                "S1",
                format!("WAIT_URL_CONTAINS: {host}"),
                "Page loaded (URL contains expected host)",
            ),
            step("S2", "SCREENSHOT: landing", "Captured landing page screenshot"),
            step("S3", "WAIT_MS: 500", "Brief wait for stability"),
            step("S4", "SCREENSHOT: landing_2", "Captured a second screenshot for evidence"),
        ];
        PlanDraft {
            starting_url: Some(starting_url),
            steps,
        }
    }
}

fn step(id: &str, instruction: impl Into<String>, evidence: &str) -> RawStep {
    let mut raw = RawStep::ui(instruction);
    raw.id = Some(id.to_string());
    raw.evidence = Some(evidence.to_string());
    raw
}

#[async_trait]
impl Planner for HeuristicPlanner {
    async fn plan(
        &self,
        task: &str,
        _context: &[ContextSnippet],
    ) -> Result<PlanDraft, EngineError> {
        let task_lower = task.to_lowercase();

        if task_lower.contains("form authentication")
            || task_lower.contains("tomsmith")
            || task_lower.contains("supersecretpassword")
        {
            return Ok(self.login_demo_plan());
        }

        let starting_url =
            Self::first_url_in(task).unwrap_or_else(|| self.demo_url.clone());
        Ok(self.generic_plan(starting_url))
    }
}

#[cfg(test)]
mod tests {
    use runflow_plan_dsl::PlanValidator;

    use super::*;

    fn planner() -> HeuristicPlanner {
        HeuristicPlanner::new("https://the-internet.herokuapp.com/")
    }

    #[tokio::test]
    async fn login_tasks_get_the_six_step_plan() {
        let draft = planner()
            .plan("Log in via Form Authentication and prove it", &[])
            .await
            .unwrap();
        assert_eq!(draft.steps.len(), 6);
        assert_eq!(draft.steps[0].instruction, "CLICK_TEXT: Form Authentication");
        // Every generated step must survive validation.
        PlanValidator::default().validate(&draft).unwrap();
    }

    #[tokio::test]
    async fn url_in_task_becomes_the_starting_url() {
        let draft = planner()
            .plan("check https://example.org/pricing loads", &[])
            .await
            .unwrap();
        assert_eq!(draft.starting_url.as_deref(), Some("https://example.org/pricing"));
        assert_eq!(draft.steps[0].instruction, "WAIT_URL_CONTAINS: example.org");
        PlanValidator::default().validate(&draft).unwrap();
    }

    #[tokio::test]
    async fn plain_tasks_fall_back_to_the_demo_url() {
        let draft = planner().plan("take a look at the landing page", &[]).await.unwrap();
        assert_eq!(
            draft.starting_url.as_deref(),
            Some("https://the-internet.herokuapp.com/")
        );
        assert_eq!(draft.steps.len(), 4);
    }

    #[tokio::test]
    async fn identical_tasks_plan_identically() {
        let a = planner().plan("screenshot the docs", &[]).await.unwrap();
        let b = planner().plan("screenshot the docs", &[]).await.unwrap();
        let a_instr: Vec<_> = a.steps.iter().map(|s| s.instruction.clone()).collect();
        let b_instr: Vec<_> = b.steps.iter().map(|s| s.instruction.clone()).collect();
        assert_eq!(a_instr, b_instr);
    }
}
