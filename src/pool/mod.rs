//! Agent-instance pool with LRU eviction and scoped leases.

pub mod agent_pool;
pub mod lease;

pub use agent_pool::{AgentPool, AgentStatus, ModelStats, PoolStats};
pub use lease::{AgentLease, LeaseId};
