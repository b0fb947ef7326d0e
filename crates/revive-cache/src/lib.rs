//! In-memory stores for the Revive backend.
//!
//! Both stores are explicit injected instances rather than module-level
//! globals, so tests can construct isolated copies and nothing leaks
//! between sessions or test cases.

pub mod quota;
pub mod result_cache;

pub use quota::{QuotaConfig, QuotaDecision, QuotaStore};
pub use result_cache::{ResultCache, ResultCacheConfig};
