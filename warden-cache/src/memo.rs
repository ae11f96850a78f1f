//! Explicit memoization.
//!
//! [`CachedFn`] wraps an expensive computation with a key builder and a TTL.
//! Call sites opt in by routing through [`CachedFn::get_or_compute`]; nothing
//! is cached implicitly.
//!
//! Keys are `{prefix}:{builder(args)}` with a custom builder, otherwise
//! `{prefix}:{name}:{input_hash(args)}`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::Ttl;
use warden_storage::KeyValueStore;

use crate::hash::input_hash;

type KeyBuilder<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;

/// A memoized computation over arguments of type `A`.
pub struct CachedFn<A: ?Sized> {
    store: Arc<KeyValueStore>,
    prefix: String,
    name: String,
    ttl: Ttl,
    key_builder: Option<KeyBuilder<A>>,
    _args: PhantomData<fn(&A)>,
}

impl<A: ?Sized> Clone for CachedFn<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            ttl: self.ttl,
            key_builder: self.key_builder.clone(),
            _args: PhantomData,
        }
    }
}

impl<A: ?Sized> fmt::Debug for CachedFn<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFn")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("custom_key", &self.key_builder.is_some())
            .finish()
    }
}

impl<A: Serialize + ?Sized> CachedFn<A> {
    pub fn new(
        store: Arc<KeyValueStore>,
        prefix: impl Into<String>,
        name: impl Into<String>,
        ttl: Ttl,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            name: name.into(),
            ttl,
            key_builder: None,
            _args: PhantomData,
        }
    }

    /// Replace the hashed default key with `{prefix}:{builder(args)}`.
    pub fn with_key_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        self.key_builder = Some(Arc::new(builder));
        self
    }

    /// Cache key for `args`. `None` when the arguments cannot be hashed.
    pub fn key_for(&self, args: &A) -> Option<String> {
        match &self.key_builder {
            Some(builder) => Some(format!("{}:{}", self.prefix, builder(args))),
            None => match input_hash(args) {
                Ok(hash) => Some(format!("{}:{}:{}", self.prefix, self.name, hash)),
                Err(e) => {
                    warn!(name = %self.name, error = %e, "Arguments not hashable, bypassing cache");
                    None
                }
            },
        }
    }

    /// Return the cached result for `args`, or run `compute` and cache it.
    pub async fn get_or_compute<T, F, Fut>(&self, args: &A, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(key) = self.key_for(args) else {
            return compute().await;
        };

        if let Some(hit) = self.store.get_json::<T>(&key).await {
            debug!(key = %key, "Cache HIT");
            return hit;
        }

        debug!(key = %key, "Cache MISS");
        let result = compute().await;
        self.store.set_json(&key, &result, Some(self.ttl)).await;
        result
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for fallible work.
    /// Errors are returned and never cached.
    pub async fn try_get_or_compute<T, E, F, Fut>(&self, args: &A, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = self.key_for(args) else {
            return compute().await;
        };

        if let Some(hit) = self.store.get_json::<T>(&key).await {
            debug!(key = %key, "Cache HIT");
            return Ok(hit);
        }

        debug!(key = %key, "Cache MISS");
        let result = compute().await?;
        self.store.set_json(&key, &result, Some(self.ttl)).await;
        Ok(result)
    }

    /// Drop the cached result for `args`.
    pub async fn invalidate(&self, args: &A) -> bool {
        match self.key_for(args) {
            Some(key) => self.store.delete(&[key]).await > 0,
            None => false,
        }
    }
}
