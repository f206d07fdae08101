//! Bounded pool of reusable agent clients keyed by model identifier.
//!
//! Holds at most one client per model and at most `pool_size` clients in
//! total. A client is either idle or checked out by exactly one
//! [`AgentLease`]. When the pool is full and a new model is requested, the
//! idle entry with the oldest `last_used_at` is evicted (ties go to the entry
//! with the lower `use_count`). Checked-out entries are never evicted.
//!
//! The index lives behind a `std::sync::Mutex` that is never held across an
//! `.await`: client construction and invocation both happen outside it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::providers::{AgentClient, AgentFactory};

use super::lease::{AgentLease, LeaseId};

enum Slot {
    Idle(Arc<dyn AgentClient>),
    CheckedOut {
        lease: LeaseId,
        client: Arc<dyn AgentClient>,
    },
    /// Reserved while the factory builds the client; counts toward capacity.
    Constructing { lease: LeaseId },
}

struct PooledAgent {
    slot: Slot,
    last_used_at: Instant,
    use_count: u64,
}

impl PooledAgent {
    fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Idle(_))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    constructions: u64,
    construction_failures: u64,
    reuses: u64,
    evictions: u64,
    idle_evictions: u64,
    releases: u64,
    invalid_releases: u64,
    exhausted: u64,
}

#[derive(Default)]
struct PoolState {
    entries: HashMap<String, PooledAgent>,
    /// Checked-out leases → model id.
    leases: HashMap<LeaseId, String>,
    counters: Counters,
}

struct PoolInner {
    factory: Arc<dyn AgentFactory>,
    capacity: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    /// Signalled whenever a slot may have become available.
    released: Notify,
}

enum Checkout {
    Ready {
        lease: LeaseId,
        client: Arc<dyn AgentClient>,
    },
    Construct {
        lease: LeaseId,
        evicted: Option<Arc<dyn AgentClient>>,
    },
    /// `model_busy`: the model's own agent is held, as opposed to every
    /// slot being taken.
    Wait { model_busy: bool },
}

/// Shared handle to an agent pool. Cloning is cheap and every clone refers
/// to the same pool.
#[derive(Clone)]
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl AgentPool {
    /// Create a pool that builds clients with `factory`.
    ///
    /// `pool_size` is clamped to a minimum of 1.
    pub fn new(factory: Arc<dyn AgentFactory>, config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                capacity: config.pool_size.max(1),
                acquire_timeout: config.acquire_timeout(),
                state: Mutex::new(PoolState::default()),
                released: Notify::new(),
            }),
        }
    }

    /// Maximum number of pooled agents.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of pooled agents (idle, checked out or being constructed).
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    /// Check out the agent for `model_id`, constructing it if needed.
    ///
    /// Waits up to the configured acquire timeout when the model's agent is
    /// already checked out, or when the pool is full and nothing is idle.
    /// Fails with [`PoolError::PoolExhausted`] once the deadline passes and
    /// with [`PoolError::Construction`] if the factory fails.
    pub async fn acquire(&self, model_id: &str) -> Result<AgentLease> {
        let started = Instant::now();
        let deadline = started + self.inner.acquire_timeout;
        let mut model_busy = false;

        loop {
            // Register interest before inspecting state so a release that
            // lands in between is not missed.
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.checkout(model_id) {
                Checkout::Ready { lease, client } => {
                    return Ok(AgentLease::new(self.clone(), lease, model_id, client));
                }
                Checkout::Construct { lease, evicted } => {
                    // Evicted client is torn down outside the lock.
                    drop(evicted);
                    return self.construct(model_id, lease).await;
                }
                Checkout::Wait { model_busy: busy } => model_busy = busy,
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                self.lock_state().counters.exhausted += 1;
                warn!(
                    model = %model_id,
                    capacity = self.inner.capacity,
                    model_busy,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Agent pool exhausted"
                );
                return Err(PoolError::PoolExhausted {
                    model_id: model_id.to_string(),
                    capacity: self.inner.capacity,
                    waited: started.elapsed(),
                    model_busy,
                });
            }
        }
    }

    /// Run `f` with a leased agent. The lease is returned to the pool when
    /// `f`'s future completes, fails or is dropped.
    pub async fn with_agent<F, Fut, T>(&self, model_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(AgentLease) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let lease = self.acquire(model_id).await?;
        f(lease).await
    }

    /// Return a lease to this pool.
    ///
    /// A lease from another pool is rejected with
    /// [`PoolError::InvalidRelease`]; it then returns to its own pool when
    /// dropped.
    pub fn release(&self, lease: AgentLease) -> Result<()> {
        if !lease.belongs_to(self) {
            self.lock_state().counters.invalid_releases += 1;
            warn!(lease = %lease.id(), "Release of a lease from a different pool");
            return Err(PoolError::InvalidRelease(format!(
                "lease {} belongs to a different pool",
                lease.id()
            )));
        }
        lease.release()
    }

    /// Return the checkout identified by `lease` to idle.
    ///
    /// Fails with [`PoolError::InvalidRelease`] if the lease is not currently
    /// checked out; pool state is left untouched in that case.
    pub fn release_id(&self, lease: LeaseId) -> Result<()> {
        let now = Instant::now();
        {
            let mut guard = self.lock_state();
            let state = &mut *guard;

            let Some(model_id) = state.leases.get(&lease).cloned() else {
                state.counters.invalid_releases += 1;
                warn!(lease = %lease, "Release of a lease that is not checked out");
                return Err(PoolError::InvalidRelease(format!(
                    "lease {} is not checked out",
                    lease
                )));
            };

            let returned = match state.entries.get_mut(&model_id) {
                Some(entry) => match &entry.slot {
                    Slot::CheckedOut { lease: held, client } if *held == lease => {
                        let client = Arc::clone(client);
                        entry.slot = Slot::Idle(client);
                        entry.last_used_at = now;
                        true
                    }
                    _ => false,
                },
                None => false,
            };

            if !returned {
                state.counters.invalid_releases += 1;
                warn!(lease = %lease, model = %model_id, "Lease index out of step with pool entry");
                return Err(PoolError::InvalidRelease(format!(
                    "lease {} does not hold '{}'",
                    lease, model_id
                )));
            }

            state.leases.remove(&lease);
            state.counters.releases += 1;
            debug!(lease = %lease, model = %model_id, "Agent released");
        }
        self.inner.released.notify_waiters();
        Ok(())
    }

    /// Drop idle agents not used for longer than `max_idle`.
    ///
    /// Returns the number of agents removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        self.remove_idle(|entry| now.saturating_duration_since(entry.last_used_at) > max_idle)
    }

    /// Drop every idle agent. Checked-out agents stay until released.
    pub fn clear_idle(&self) -> usize {
        self.remove_idle(|_| true)
    }

    /// Point-in-time statistics. Has no side effects on the pool.
    pub fn stats(&self) -> PoolStats {
        let now = Instant::now();
        let state = self.lock_state();
        let mut stats = PoolStats {
            size: state.entries.len(),
            capacity: self.inner.capacity,
            idle: 0,
            checked_out: 0,
            constructing: 0,
            constructions: state.counters.constructions,
            construction_failures: state.counters.construction_failures,
            reuses: state.counters.reuses,
            evictions: state.counters.evictions,
            idle_evictions: state.counters.idle_evictions,
            releases: state.counters.releases,
            invalid_releases: state.counters.invalid_releases,
            exhausted: state.counters.exhausted,
            models: BTreeMap::new(),
        };
        for (model_id, entry) in &state.entries {
            let status = match entry.slot {
                Slot::Idle(_) => {
                    stats.idle += 1;
                    AgentStatus::Idle
                }
                Slot::CheckedOut { .. } => {
                    stats.checked_out += 1;
                    AgentStatus::CheckedOut
                }
                Slot::Constructing { .. } => {
                    stats.constructing += 1;
                    AgentStatus::Constructing
                }
            };
            stats.models.insert(
                model_id.clone(),
                ModelStats {
                    status,
                    use_count: entry.use_count,
                    idle_ms: now.saturating_duration_since(entry.last_used_at).as_millis() as u64,
                },
            );
        }
        stats
    }

    pub(crate) fn same_pool(&self, other: &AgentPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -- private helpers ---------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().expect("agent pool lock poisoned")
    }

    /// Decide what `acquire` does next, atomically with respect to every
    /// other pool operation.
    fn checkout(&self, model_id: &str) -> Checkout {
        let now = Instant::now();
        let mut guard = self.lock_state();
        let state = &mut *guard;

        if let Some(entry) = state.entries.get_mut(model_id) {
            let client = match &entry.slot {
                Slot::Idle(client) => Arc::clone(client),
                // One instance per model: wait for the holder to release.
                Slot::CheckedOut { .. } | Slot::Constructing { .. } => {
                    return Checkout::Wait { model_busy: true }
                }
            };
            let lease = LeaseId::next();
            entry.slot = Slot::CheckedOut {
                lease,
                client: Arc::clone(&client),
            };
            entry.last_used_at = now;
            entry.use_count += 1;
            state.leases.insert(lease, model_id.to_string());
            state.counters.reuses += 1;
            debug!(model = %model_id, lease = %lease, use_count = entry.use_count, "Reusing pooled agent");
            return Checkout::Ready { lease, client };
        }

        let evicted = if state.entries.len() >= self.inner.capacity {
            let victim = state
                .entries
                .iter()
                .filter(|(_, e)| e.is_idle())
                .min_by_key(|(_, e)| (e.last_used_at, e.use_count))
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                return Checkout::Wait { model_busy: false };
            };
            state.counters.evictions += 1;
            debug!(evicted = %victim, model = %model_id, "Evicting least recently used agent");
            match state.entries.remove(&victim).map(|e| e.slot) {
                Some(Slot::Idle(client)) => Some(client),
                _ => None,
            }
        } else {
            None
        };

        let lease = LeaseId::next();
        state.entries.insert(
            model_id.to_string(),
            PooledAgent {
                slot: Slot::Constructing { lease },
                last_used_at: now,
                use_count: 0,
            },
        );
        Checkout::Construct { lease, evicted }
    }

    async fn construct(&self, model_id: &str, lease: LeaseId) -> Result<AgentLease> {
        let reservation = Reservation {
            pool: self,
            model_id,
            lease,
            armed: true,
        };
        debug!(model = %model_id, "Constructing agent client");

        match self.inner.factory.create(model_id).await {
            Ok(client) => {
                reservation.fulfil(Arc::clone(&client));
                Ok(AgentLease::new(self.clone(), lease, model_id, client))
            }
            Err(e) => {
                drop(reservation);
                self.lock_state().counters.construction_failures += 1;
                warn!(model = %model_id, error = %e, "Agent construction failed");
                Err(e)
            }
        }
    }

    fn remove_idle<P>(&self, mut should_remove: P) -> usize
    where
        P: FnMut(&PooledAgent) -> bool,
    {
        let removed: Vec<(String, PooledAgent)> = {
            let mut state = self.lock_state();
            let ids: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, e)| e.is_idle() && should_remove(*e))
                .map(|(id, _)| id.clone())
                .collect();
            let removed: Vec<_> = ids
                .into_iter()
                .filter_map(|id| state.entries.remove(&id).map(|e| (id, e)))
                .collect();
            state.counters.idle_evictions += removed.len() as u64;
            removed
        };

        let count = removed.len();
        if count > 0 {
            for (id, _) in &removed {
                debug!(model = %id, "Dropped idle agent");
            }
            // Clients drop here, outside the lock.
            drop(removed);
            self.inner.released.notify_waiters();
        }
        count
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("AgentPool")
            .field("capacity", &self.inner.capacity)
            .field("size", &state.entries.len())
            .field("checked_out", &state.leases.len())
            .finish()
    }
}

/// Slot reserved for a client under construction. Removed again if
/// construction fails or the acquiring future is dropped mid-construction.
struct Reservation<'a> {
    pool: &'a AgentPool,
    model_id: &'a str,
    lease: LeaseId,
    armed: bool,
}

impl Reservation<'_> {
    fn fulfil(mut self, client: Arc<dyn AgentClient>) {
        let now = Instant::now();
        let mut guard = self.pool.lock_state();
        let state = &mut *guard;
        if let Some(entry) = state.entries.get_mut(self.model_id) {
            entry.slot = Slot::CheckedOut {
                lease: self.lease,
                client,
            };
            entry.last_used_at = now;
            entry.use_count = 1;
            state.leases.insert(self.lease, self.model_id.to_string());
            state.counters.constructions += 1;
        }
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.pool.lock_state();
            let ours = matches!(
                state.entries.get(self.model_id).map(|e| &e.slot),
                Some(Slot::Constructing { lease }) if *lease == self.lease
            );
            if ours {
                state.entries.remove(self.model_id);
            }
        }
        self.pool.inner.released.notify_waiters();
    }
}

/// Lifecycle state of a pooled agent in a stats snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    CheckedOut,
    Constructing,
}

/// Per-model entry in [`PoolStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub status: AgentStatus,
    /// Number of successful acquires of this agent.
    pub use_count: u64,
    /// Time since the agent was last acquired or released.
    pub idle_ms: u64,
}

/// Snapshot of pool occupancy and lifetime counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub capacity: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub constructing: usize,
    pub constructions: u64,
    pub construction_failures: u64,
    /// Acquires served by an existing idle agent.
    pub reuses: u64,
    /// Capacity-driven LRU evictions.
    pub evictions: u64,
    /// Agents dropped by [`AgentPool::evict_idle`] or [`AgentPool::clear_idle`].
    pub idle_evictions: u64,
    pub releases: u64,
    pub invalid_releases: u64,
    /// Acquires that timed out with `PoolExhausted`.
    pub exhausted: u64,
    pub models: BTreeMap<String, ModelStats>,
}

impl PoolStats {
    /// Fraction of capacity in use (0.0 – 1.0).
    pub fn utilisation(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.size as f64 / self.capacity as f64
    }
}
