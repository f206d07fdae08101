//! LLM response caching keyed by request fingerprint, with TTL expiry and an
//! optional entry bound.

pub mod fingerprint;
pub mod response_cache;

pub use fingerprint::{Fingerprint, Fingerprinter};
pub use response_cache::{CacheEntry, CacheStats, ResponseCache};
