//! Periodic background upkeep: purge expired cache entries and drop agents
//! that have sat idle past the configured limit.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::pool::AgentPool;

/// Shortest sweep period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_entries: usize,
    pub idle_agents: usize,
}

/// Run one maintenance pass immediately.
pub fn sweep(pool: &AgentPool, cache: &ResponseCache, max_idle: Duration) -> SweepReport {
    let report = SweepReport {
        expired_entries: cache.cleanup(),
        idle_agents: pool.evict_idle(max_idle),
    };
    debug!(
        expired_entries = report.expired_entries,
        idle_agents = report.idle_agents,
        "Maintenance sweep"
    );
    report
}

/// Handle to the background maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that sweeps every `interval` until shut down.
///
/// The first sweep happens one `interval` after spawning. Intervals shorter
/// than one second are raised to one second.
pub fn start_maintenance(
    pool: AgentPool,
    cache: Arc<ResponseCache>,
    interval: Duration,
    max_idle: Duration,
) -> MaintenanceHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.tick().await; // skip first immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep(&pool, &cache, max_idle);
                }
                _ = token.cancelled() => {
                    info!("Maintenance task stopped");
                    break;
                }
            }
        }
    });
    MaintenanceHandle { cancel, task }
}
