//! Warden Cache - typed domain caching
//!
//! [`DomainCache`] maps entity identifiers to store keys with a TTL per
//! namespace:
//!
//! | Namespace | Key | TTL |
//! | --------- | --- | --- |
//! | prediction | `prediction:{customer_id}:{input_hash}` | 600s |
//! | user | `user:{user_id}` | 300s |
//! | analytics | `analytics:{kind}` | 900s |
//! | history | `history:{user_id}:{limit}` | 180s |
//! | model info | `model:info` | 3600s |
//!
//! [`CachedFn`] memoizes arbitrary computations through the same store.

pub mod domain;
pub mod hash;
pub mod memo;
pub mod namespace;

pub use domain::{CacheStats, DomainCache};
pub use hash::{canonical_json, input_hash};
pub use memo::CachedFn;
pub use namespace::{
    history_pattern, predictions_pattern, CacheKey, CacheNamespace, CacheTtls, KeyCounts,
};
