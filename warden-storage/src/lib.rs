//! Warden Storage - key-value layer
//!
//! [`KeyValueStore`] is what the cache and the rate limiter talk to. Behind
//! it sit two [`StoreBackend`] implementations:
//!
//! - [`RedisBackend`]: the shared remote store (Redis, Upstash, Valkey).
//! - [`MemoryBackend`]: the process-local fallback, also usable on its own
//!   in tests and single-process deployments.
//!
//! Both backends answer `KEYS` with the same glob rules ([`pattern`]), so a
//! cache invalidation pattern selects the same keys in either layer.

pub mod backend;
pub mod codec;
pub mod memory;
pub mod pattern;
pub mod redis_backend;
pub mod store;

pub use backend::{window_start, StoreBackend, WindowOutcome, WindowRequest};
pub use memory::MemoryBackend;
pub use pattern::{escape, glob_match, prefix_pattern};
pub use redis_backend::RedisBackend;
pub use store::KeyValueStore;
