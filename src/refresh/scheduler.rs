//! Supervised background refresh loop.
//!
//! The scheduler owns the refresh cadence as an explicit state machine
//! (`Idle -> Refreshing -> Idle` on success, `Idle -> Refreshing -> Backoff
//! -> Idle` on failure) running in a spawned tokio task. The task's
//! `JoinHandle` is retained for liveness checks; a supervisor can respawn
//! the same loop if the task ever dies, and restarting an alive scheduler
//! is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::provider::CatalogGateway;
use crate::store::CatalogStore;

use super::controller::{run_refresh_cycle, RetryPolicy};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Backoff,
}

/// Cadence and failure-handling settings for the scheduler.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Sleep between successful cycles.
    pub interval: Duration,
    /// Sleep after a failed cycle, applied without recomputing the interval.
    pub failure_reschedule: Duration,
    pub retry: RetryPolicy,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            failure_reschedule: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct RefreshScheduler {
    gateway: Arc<dyn CatalogGateway>,
    store: Arc<CatalogStore>,
    policy: RefreshPolicy,
    state: Arc<RwLock<RefreshState>>,
    last_update: Arc<RwLock<DateTime<Utc>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        gateway: Arc<dyn CatalogGateway>,
        store: Arc<CatalogStore>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            gateway,
            store,
            policy,
            state: Arc::new(RwLock::new(RefreshState::Idle)),
            last_update: Arc::new(RwLock::new(Utc::now())),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the refresh loop. Idempotent: a second call while the loop is
    /// alive does nothing.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        info!("Starting refresh scheduler");
        *handle = Some(tokio::spawn(run_loop(
            self.gateway.clone(),
            self.store.clone(),
            self.policy.clone(),
            self.state.clone(),
            self.last_update.clone(),
        )));
    }

    /// Whether the refresh task is currently alive.
    pub fn is_alive(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Supervisory restart: respawns the loop only when the task has died.
    pub fn restart_if_needed(&self) {
        if self.is_alive() {
            return;
        }
        warn!("Refresh scheduler task died, restarting");
        self.start();
    }

    /// Abort the refresh task. Used on shutdown and in tests.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn state(&self) -> RefreshState {
        *self.state.read()
    }

    /// Timestamp of the most recent successful refresh. Shared with the
    /// service layer for the manifest and `last_update` endpoints.
    pub fn last_update_cell(&self) -> Arc<RwLock<DateTime<Utc>>> {
        self.last_update.clone()
    }
}

async fn run_loop(
    gateway: Arc<dyn CatalogGateway>,
    store: Arc<CatalogStore>,
    policy: RefreshPolicy,
    state: Arc<RwLock<RefreshState>>,
    last_update: Arc<RwLock<DateTime<Utc>>>,
) {
    info!("Refresh scheduler started");

    // An empty store at startup forces an immediate first refresh.
    let mut interval = if store.is_empty() {
        info!("No catalogs cached, refreshing immediately");
        Duration::ZERO
    } else {
        info!(catalogs = store.catalog_count(), "Resuming with cached catalogs");
        policy.interval
    };

    loop {
        tokio::time::sleep(interval).await;

        *state.write() = RefreshState::Refreshing;
        match run_refresh_cycle(gateway.as_ref(), store.as_ref(), &policy.retry).await {
            Ok(()) => {
                *last_update.write() = Utc::now();
                *state.write() = RefreshState::Idle;
                interval = policy.interval;
            }
            Err(e) => {
                error!(error = %e, "Refresh cycle failed, rescheduling");
                *state.write() = RefreshState::Backoff;
                tokio::time::sleep(policy.failure_reschedule).await;
                *state.write() = RefreshState::Idle;
                // Interval intentionally not recomputed after a failure.
            }
        }
    }
}

/// Periodically restart the scheduler if its task has died.
pub fn spawn_supervisor(
    scheduler: Arc<RefreshScheduler>,
    check_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        // The immediate first tick would race scheduler startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            scheduler.restart_if_needed();
        }
    })
}
