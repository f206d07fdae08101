//! Checked-out agent handles.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::providers::AgentClient;

use super::agent_pool::AgentPool;

// Process-wide so a lease id never matches a checkout in another pool.
static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);

/// Identifier of a single acquire/release cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(u64);

impl LeaseId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LEASE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exclusive access to a pooled agent client.
///
/// Dereferences to the client. The lease returns the client to the pool when
/// released explicitly or when dropped, so an abandoned or cancelled caller
/// never leaves the slot checked out.
pub struct AgentLease {
    pool: AgentPool,
    id: LeaseId,
    model_id: String,
    client: Arc<dyn AgentClient>,
    released: bool,
}

impl AgentLease {
    pub(crate) fn new(
        pool: AgentPool,
        id: LeaseId,
        model_id: &str,
        client: Arc<dyn AgentClient>,
    ) -> Self {
        Self {
            pool,
            id,
            model_id: model_id.to_string(),
            client,
            released: false,
        }
    }

    pub fn id(&self) -> LeaseId {
        self.id
    }

    /// Canonical model identifier of the pooled entry.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Return the client to its pool now instead of on drop.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.pool.release_id(self.id)
    }

    pub(crate) fn belongs_to(&self, pool: &AgentPool) -> bool {
        self.pool.same_pool(pool)
    }
}

impl Deref for AgentLease {
    type Target = dyn AgentClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.pool.release_id(self.id) {
            warn!(lease = %self.id, model = %self.model_id, error = %e, "Lease drop could not release agent");
        }
    }
}

impl fmt::Debug for AgentLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentLease")
            .field("id", &self.id)
            .field("model_id", &self.model_id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_ids_are_unique() {
        let a = LeaseId::next();
        let b = LeaseId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_lease_id_display() {
        assert_eq!(LeaseId(42).to_string(), "#42");
    }
}
