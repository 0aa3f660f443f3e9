//! The run execution engine: run records, the run state machine, approval
//! gating, and the pull-based "execute next step" dispatch loop.

pub mod collaborators;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod repository;

pub use collaborators::{ContextSnippet, Embedder, Planner, Retrieval};
pub use engine::{EngineDeps, RunEngine};
pub use metrics::EngineMetrics;
pub use model::{DispatchReport, RunRecord, RunSnapshot, StepState, StepView};
pub use repository::{InMemoryRunRepository, RunRepository};
