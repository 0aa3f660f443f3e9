use std::sync::Arc;

use runflow_artifact_store::{ArtifactStore, FsArtifactStore};
use runflow_audit_log::MemoryAuditLog;
use runflow_browser_adapter::ChromiumConfig;
use runflow_plan_dsl::{PlanLimits, PlanValidator};
use runflow_run_engine::{
    engine::AuditSessionEvents, Embedder, EngineDeps, InMemoryRunRepository, Planner, Retrieval,
    RunEngine,
};
use runflow_session_manager::{ChromiumSessionFactory, SessionConfig, SessionManager};
use runflow_ssrf_guard::{GuardConfig, SsrfGuard};
use runflow_step_interpreter::{InterpreterTimeouts, StepInterpreter};

use crate::config::{Settings, StartingUrlMode};
use crate::planner::HeuristicPlanner;
use crate::retrieval::{BrandIndex, CosineRetrieval, HashEmbedder};

/// Everything the HTTP handlers touch. Cheap to clone; all heavy parts are
/// shared behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RunEngine>,
    pub sessions: Arc<SessionManager>,
    pub planner: Arc<dyn Planner>,
    pub retrieval: Arc<dyn Retrieval>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<BrandIndex>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub validator: PlanValidator,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Composition root: wires the engine, the brand-kit retrieval stack,
    /// and the Chromium session factory from settings.
    pub fn from_settings(settings: Settings) -> Self {
        let settings = Arc::new(settings);

        let audit = Arc::new(MemoryAuditLog::new());
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(settings.artifacts_dir.clone()));

        let factory = Arc::new(ChromiumSessionFactory::new(ChromiumConfig {
            headless: settings.headless,
            ..ChromiumConfig::default()
        }));
        let sessions = Arc::new(
            SessionManager::new(
                factory,
                SessionConfig {
                    idle_timeout: settings.session_idle_timeout(),
                    reap_interval: settings.session_reap_interval(),
                },
            )
            .with_events(Arc::new(AuditSessionEvents::new(audit.clone()))),
        );

        let guard = SsrfGuard::new(GuardConfig {
            dns_timeout: settings.dns_timeout(),
            allowed_hosts: match settings.starting_url_mode {
                StartingUrlMode::Plan => Some(settings.allowed_starting_hosts.clone()),
                StartingUrlMode::Demo | StartingUrlMode::AnyPublic => None,
            },
        });

        let engine = Arc::new(RunEngine::new(EngineDeps {
            repo: Arc::new(InMemoryRunRepository::new()),
            audit,
            sessions: Arc::clone(&sessions),
            interpreter: StepInterpreter::new(
                InterpreterTimeouts::default(),
                Arc::clone(&artifacts),
            ),
            guard,
        }));

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder);
        let index = Arc::new(BrandIndex::new());
        let retrieval: Arc<dyn Retrieval> = Arc::new(CosineRetrieval::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            settings.embedding_dimension,
        ));
        let planner: Arc<dyn Planner> =
            Arc::new(HeuristicPlanner::new(settings.demo_starting_url.clone()));

        let validator = PlanValidator::new(PlanLimits {
            max_plan_len: settings.max_plan_len,
            ..PlanLimits::default()
        });

        Self {
            engine,
            sessions,
            planner,
            retrieval,
            embedder,
            index,
            artifacts,
            validator,
            settings,
        }
    }
}
