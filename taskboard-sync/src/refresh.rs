//! Authoritative refresh: list both collections and resync the cache.

use crate::cache::{OptimisticCache, ResyncOutcome};
use chrono::Utc;
use std::sync::Arc;
use taskboard_core::BoardSnapshot;
use taskboard_gateway::{GatewayResult, RemoteStore};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched snapshot became the confirmed state.
    Applied,
    /// One of our creates is in flight; the snapshot is applied once it
    /// settles.
    Deferred,
    /// A newer refresh already landed; this one was dropped.
    Stale,
    /// The cache is closed.
    Skipped,
}

/// Shared by the orchestrator (after failures) and the realtime controller.
#[derive(Clone)]
pub struct Refresher {
    store: Arc<dyn RemoteStore>,
    cache: Arc<OptimisticCache>,
}

impl Refresher {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<OptimisticCache>) -> Self {
        Self { store, cache }
    }

    pub async fn refresh(&self) -> GatewayResult<RefreshOutcome> {
        if self.cache.is_closed() {
            return Ok(RefreshOutcome::Skipped);
        }
        let ticket = self.cache.begin_fetch();
        let (columns, tasks) =
            tokio::try_join!(self.store.list_columns(), self.store.list_tasks())?;
        debug!(columns = columns.len(), tasks = tasks.len(), "fetched board");

        let snapshot = BoardSnapshot::fetched(columns, tasks, Utc::now());
        Ok(match self.cache.resync(ticket, snapshot) {
            ResyncOutcome::Applied => RefreshOutcome::Applied,
            ResyncOutcome::Deferred => RefreshOutcome::Deferred,
            ResyncOutcome::Stale => RefreshOutcome::Stale,
            ResyncOutcome::Closed => RefreshOutcome::Skipped,
        })
    }

    /// Refresh, logging instead of returning failures. The last good
    /// snapshot stays in place on error.
    pub async fn refresh_logged(&self, reason: &'static str) -> Option<RefreshOutcome> {
        match self.refresh().await {
            Ok(outcome) => {
                debug!(reason, ?outcome, "refresh finished");
                Some(outcome)
            }
            Err(e) => {
                warn!(reason, error = %e, "refresh failed; keeping last snapshot");
                None
            }
        }
    }

    pub fn cache(&self) -> &Arc<OptimisticCache> {
        &self.cache
    }
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher").field("cache", &self.cache).finish()
    }
}
