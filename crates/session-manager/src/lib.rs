//! Owns the one-session-per-run invariant.
//!
//! Sessions are created lazily on first acquire, serialized behind a per-run
//! guard, torn down explicitly or by the idle reaper. An idle-reclaimed
//! session is transparently recreated by the next [`SessionManager::acquire`];
//! in-page state does not survive that restart, so callers must treat
//! "session may restart on idle" as part of the contract.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use runflow_browser_adapter::{launch_session, BrowserSession, ChromiumConfig};
use runflow_core_types::{EngineError, RunId};

/// Session lifetime policy.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Sessions untouched for this long are eligible for reclamation.
    pub idle_timeout: Duration,
    /// Reaper tick interval.
    pub reap_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
            reap_interval: Duration::from_secs(30),
        }
    }
}

/// Creates the underlying browser session for a run. Injected so tests can
/// script sessions without a live browser.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        run: &RunId,
        starting_url: &str,
    ) -> Result<Arc<dyn BrowserSession>, EngineError>;
}

/// Chromium-backed factory used in production.
pub struct ChromiumSessionFactory {
    cfg: ChromiumConfig,
}

impl ChromiumSessionFactory {
    pub fn new(cfg: ChromiumConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn create(
        &self,
        run: &RunId,
        starting_url: &str,
    ) -> Result<Arc<dyn BrowserSession>, EngineError> {
        debug!(run = %run, url = %starting_url, "launching browser session");
        let session = launch_session(&self.cfg, starting_url).await?;
        Ok(Arc::new(session))
    }
}

/// Observer for session lifecycle events; the engine uses this to append
/// audit entries for opens and closes (including idle reclamation).
#[async_trait]
pub trait SessionEvents: Send + Sync {
    async fn session_opened(&self, run: &RunId);
    async fn session_closed(&self, run: &RunId, reason: &str);
}

/// Default observer that only traces.
#[derive(Default)]
pub struct NoopSessionEvents;

#[async_trait]
impl SessionEvents for NoopSessionEvents {
    async fn session_opened(&self, run: &RunId) {
        debug!(run = %run, "session opened");
    }

    async fn session_closed(&self, run: &RunId, reason: &str) {
        debug!(run = %run, reason, "session closed");
    }
}

struct SlotState {
    session: Option<Arc<dyn BrowserSession>>,
    last_active: Instant,
}

type Slot = Arc<Mutex<SlotState>>;

/// Exclusive lease on a run's session, held for the duration of one step.
/// While a lease is live no other caller (including the reaper) can touch
/// the session. Dropping the lease refreshes the idle clock.
pub struct SessionLease {
    guard: OwnedMutexGuard<SlotState>,
    created: bool,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl SessionLease {
    pub fn session(&self) -> Arc<dyn BrowserSession> {
        // Present by construction: acquire() only returns a lease after the
        // slot has a session.
        Arc::clone(self.guard.session.as_ref().expect("lease without session"))
    }

    /// Whether this acquire created a fresh session.
    pub fn freshly_created(&self) -> bool {
        self.created
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.guard.last_active = Instant::now();
    }
}

pub struct SessionManager {
    slots: DashMap<RunId, Slot>,
    factory: Arc<dyn SessionFactory>,
    events: Arc<dyn SessionEvents>,
    cfg: SessionConfig,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn SessionFactory>, cfg: SessionConfig) -> Self {
        Self {
            slots: DashMap::new(),
            factory,
            events: Arc::new(NoopSessionEvents),
            cfg,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn SessionEvents>) -> Self {
        self.events = events;
        self
    }

    /// Acquire the run's session, creating one if none exists. Concurrent
    /// acquires for the same run serialize behind the per-run guard, so at
    /// most one caller holds the session at a time. Note: a session idle
    /// beyond the configured window may have been reclaimed; the recreated
    /// session starts over at the given URL.
    pub async fn acquire(
        &self,
        run: &RunId,
        starting_url: &str,
    ) -> Result<SessionLease, EngineError> {
        let slot = self
            .slots
            .entry(run.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SlotState {
                    session: None,
                    last_active: Instant::now(),
                }))
            })
            .clone();

        let mut guard = slot.lock_owned().await;
        let mut created = false;
        if guard.session.is_none() {
            let session = self.factory.create(run, starting_url).await.map_err(|err| {
                warn!(run = %run, %err, "session creation failed");
                EngineError::session_unavailable(err.detail)
            })?;
            guard.session = Some(session);
            created = true;
            self.events.session_opened(run).await;
        }
        guard.last_active = Instant::now();
        Ok(SessionLease { guard, created })
    }

    /// Tear down the run's session. Waits for an in-flight step to drain
    /// (the per-run guard), then closes the browser. Idempotent: closing an
    /// absent session is a no-op. Returns whether a live session was closed.
    ///
    /// The slot itself stays registered so an acquire racing this close can
    /// never strand a freshly created session outside the map.
    pub async fn close(&self, run: &RunId) -> bool {
        let Some(slot) = self.slots.get(run).map(|s| Arc::clone(s.value())) else {
            return false;
        };
        let mut guard = slot.lock().await;
        let Some(session) = guard.session.take() else {
            return false;
        };
        session.close().await;
        self.events.session_closed(run, "explicit").await;
        info!(run = %run, "session closed");
        true
    }

    /// Whether a live session (or one currently in use) exists for the run.
    pub fn has_session(&self, run: &RunId) -> bool {
        match self.slots.get(run) {
            Some(slot) => match slot.try_lock() {
                Ok(state) => state.session.is_some(),
                // Guard held: a step is mid-flight on a live session.
                Err(_) => true,
            },
            None => false,
        }
    }

    /// One reaper pass: close sessions idle beyond the window. Never touches
    /// a session whose guard is held by an in-flight step.
    pub async fn reap_once(&self) -> usize {
        let candidates: Vec<(RunId, Slot)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut reaped = 0;
        for (run, slot) in candidates {
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            let idle = guard.last_active.elapsed();
            if idle < self.cfg.idle_timeout {
                continue;
            }
            if let Some(session) = guard.session.take() {
                drop(guard);
                session.close().await;
                self.events.session_closed(&run, "idle").await;
                info!(run = %run, idle_ms = idle.as_millis() as u64, "idle session reclaimed");
                reaped += 1;
            }
        }
        reaped
    }

    /// Background reaper loop.
    pub fn spawn_reaper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.cfg.reap_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.reap_once().await;
            }
        })
    }

    /// Close everything; used on shutdown.
    pub async fn close_all(&self) {
        let runs: Vec<RunId> = self.slots.iter().map(|e| e.key().clone()).collect();
        for run in runs {
            self.close(&run).await;
        }
    }
}
