//! Persistence seam for run records. The engine commits every state
//! transition to the repository before answering the caller; swapping in a
//! relational store only means implementing this trait.

use async_trait::async_trait;
use dashmap::DashMap;

use runflow_core_types::{EngineError, ErrorKind, RunId};

use crate::model::RunRecord;

#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Persist a brand-new run. Fails on id collision.
    async fn create(&self, record: RunRecord) -> Result<(), EngineError>;

    /// Full record by id.
    async fn get(&self, run: &RunId) -> Option<RunRecord>;

    /// Persist the updated record. Fails if the run does not exist.
    async fn store(&self, record: RunRecord) -> Result<(), EngineError>;
}

/// In-process repository. Durable enough for a single-node deployment; the
/// trait is the seam for anything stronger.
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: DashMap<RunId, RunRecord>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create(&self, record: RunRecord) -> Result<(), EngineError> {
        let id = record.id.clone();
        if self.runs.contains_key(&id) {
            return Err(EngineError::internal(format!("run {id} already exists")));
        }
        self.runs.insert(id, record);
        Ok(())
    }

    async fn get(&self, run: &RunId) -> Option<RunRecord> {
        self.runs.get(run).map(|r| r.clone())
    }

    async fn store(&self, record: RunRecord) -> Result<(), EngineError> {
        if !self.runs.contains_key(&record.id) {
            return Err(EngineError::new(
                ErrorKind::RunNotFound,
                format!("run {} not found", record.id),
            ));
        }
        self.runs.insert(record.id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use runflow_plan_dsl::{PlanDraft, PlanValidator, RawStep};

    use super::*;

    fn record() -> RunRecord {
        let plan = PlanValidator::default()
            .validate(&PlanDraft {
                starting_url: None,
                steps: vec![RawStep::ui("WAIT_MS: 1")],
            })
            .unwrap();
        RunRecord::new("t", plan, "https://demo.test/")
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let repo = InMemoryRunRepository::new();
        let r = record();
        let id = r.id.clone();
        repo.create(r).await.unwrap();
        assert!(repo.get(&id).await.is_some());
    }

    #[tokio::test]
    async fn store_requires_existing_run() {
        let repo = InMemoryRunRepository::new();
        let err = repo.store(record()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RunNotFound);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let repo = InMemoryRunRepository::new();
        let r = record();
        repo.create(r.clone()).await.unwrap();
        assert!(repo.create(r).await.is_err());
    }
}
