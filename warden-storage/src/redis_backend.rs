//! Redis backend.
//!
//! Wraps a `redis` [`ConnectionManager`], which reconnects on its own once a
//! connection exists. The first connection is made lazily and retried no
//! more often than `retry_interval`, so a store that is down at startup
//! costs one bounded connect attempt per interval rather than one per call.
//!
//! Every command runs under `operation_timeout`. A timeout is reported as
//! [`StoreError::Timeout`] and handled by callers like any other transient
//! failure.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warden_core::{
    BackendKind, KeyTtl, StoreConfig, StoreError, StoreInfo, StoreResult, StoreStatus, Ttl,
};

use crate::backend::{window_start, StoreBackend, WindowOutcome, WindowRequest};

/// Prune, count, conditionally record and refresh expiry in one step.
///
/// KEYS[1] window key. ARGV: now, window start, max, expiry secs, member.
/// Returns `{admitted, count, has_oldest, oldest}`.
const WINDOW_ADMIT_LUA: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = ARGV[2]
local max_requests = tonumber(ARGV[3])
local expiry = tonumber(ARGV[4])
local member = ARGV[5]

redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
local count = redis.call('ZCARD', key)
local admitted = 0
if count < max_requests then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, expiry)
    count = redis.call('ZCARD', key)
    admitted = 1
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if #oldest == 0 then
    return {admitted, count, 0, 0}
end
return {admitted, count, 1, tonumber(oldest[2])}
";

#[derive(Default)]
struct ConnectionState {
    manager: Option<ConnectionManager>,
    last_attempt: Option<Instant>,
}

/// Backend talking to a Redis-protocol server (Redis, Upstash, Valkey).
pub struct RedisBackend {
    client: Client,
    kind: BackendKind,
    connect_timeout: Duration,
    operation_timeout: Duration,
    retry_interval: Duration,
    state: Mutex<ConnectionState>,
    window_script: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("kind", &self.kind)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Build a backend for `config.url`. Does not touch the network.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let url = config.url.as_deref().ok_or(StoreError::NotConfigured)?;
        let client = Client::open(url).map_err(|e| StoreError::connection(e.to_string()))?;
        let kind = if url.contains("upstash") {
            BackendKind::Upstash
        } else {
            BackendKind::Redis
        };

        Ok(Self {
            client,
            kind,
            connect_timeout: config.connect_timeout,
            operation_timeout: config.operation_timeout,
            retry_interval: config.retry_interval,
            state: Mutex::new(ConnectionState::default()),
            window_script: Script::new(WINDOW_ADMIT_LUA),
        })
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let mut state = self.state.lock().await;
        if let Some(manager) = &state.manager {
            return Ok(manager.clone());
        }

        if let Some(last) = state.last_attempt {
            if last.elapsed() < self.retry_interval {
                return Err(StoreError::connection("waiting before next reconnect attempt"));
            }
        }
        state.last_attempt = Some(Instant::now());

        let connect = ConnectionManager::new(self.client.clone());
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(manager)) => {
                info!(backend = ?self.kind, "Connected to remote store");
                state.manager = Some(manager.clone());
                Ok(manager)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Remote store connection failed");
                Err(StoreError::connection(e.to_string()))
            }
            Err(_) => {
                warn!(after = ?self.connect_timeout, "Remote store connection timed out");
                Err(StoreError::Timeout {
                    operation: "CONNECT",
                    after: self.connect_timeout,
                })
            }
        }
    }

    /// Run one command future under the operation timeout.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(operation, &e)),
            Err(_) => Err(StoreError::Timeout {
                operation,
                after: self.operation_timeout,
            }),
        }
    }
}

/// Map a client error onto the store taxonomy.
fn classify(operation: &str, e: &RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        return StoreError::connection(e.to_string());
    }
    StoreError::command(operation, e.to_string())
}

/// Pick the fields we report out of an `INFO` reply.
fn parse_info(raw: &str) -> (Option<String>, Option<String>, Option<u64>) {
    let mut version = None;
    let mut used_memory = None;
    let mut clients = None;
    for line in raw.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        match field {
            "redis_version" => version = Some(value.to_string()),
            "used_memory_human" => used_memory = Some(value.to_string()),
            "connected_clients" => clients = value.parse().ok(),
            _ => {}
        }
    }
    (version, used_memory, clients)
}

#[async_trait]
impl StoreBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = self
            .bounded("GET", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        let _: () = self.bounded("SET", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let removed: u64 = self
            .bounded("DEL", redis::cmd("DEL").arg(keys).query_async(&mut conn))
            .await?;
        Ok(removed)
    }

    async fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let found: u64 = self
            .bounded("EXISTS", redis::cmd("EXISTS").arg(keys).query_async(&mut conn))
            .await?;
        Ok(found)
    }

    async fn incr_by(&self, key: &str, by: i64) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = self
            .bounded(
                "INCRBY",
                redis::cmd("INCRBY").arg(key).arg(by).query_async(&mut conn),
            )
            .await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Ttl) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let applied: bool = self
            .bounded(
                "EXPIRE",
                redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl.as_secs())
                    .query_async(&mut conn),
            )
            .await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut conn = self.connection().await?;
        let secs: i64 = self
            .bounded("TTL", redis::cmd("TTL").arg(key).query_async(&mut conn))
            .await?;
        Ok(KeyTtl::from_redis_secs(secs))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut keys: Vec<String> = self
            .bounded("KEYS", redis::cmd("KEYS").arg(pattern).query_async(&mut conn))
            .await?;
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = self
            .bounded("FLUSHDB", redis::cmd("FLUSHDB").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        let mut conn = self.connection().await?;
        let raw: String = self
            .bounded("INFO", redis::cmd("INFO").query_async(&mut conn))
            .await?;
        let total_keys: u64 = self
            .bounded("DBSIZE", redis::cmd("DBSIZE").query_async(&mut conn))
            .await?;
        let (version, used_memory, connected_clients) = parse_info(&raw);

        Ok(StoreInfo {
            status: StoreStatus::Connected,
            backend: self.kind,
            version,
            used_memory,
            connected_clients,
            total_keys,
            error: None,
        })
    }

    async fn window_admit(
        &self,
        key: &str,
        request: &WindowRequest,
    ) -> StoreResult<WindowOutcome> {
        let mut conn = self.connection().await?;
        let (admitted, count, has_oldest, oldest): (i64, u64, i64, i64) = self
            .bounded(
                "EVALSHA",
                self.window_script
                    .key(key)
                    .arg(request.now)
                    .arg(request.window_start())
                    .arg(request.max_requests)
                    .arg(request.expiry.as_secs())
                    .arg(&request.member)
                    .invoke_async(&mut conn),
            )
            .await?;

        debug!(key, admitted, count, "Window admission evaluated");
        Ok(WindowOutcome {
            admitted: admitted == 1,
            count,
            oldest: (has_oldest == 1).then_some(oldest),
        })
    }

    async fn window_peek(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
    ) -> StoreResult<WindowOutcome> {
        let mut conn = self.connection().await?;
        let (count, oldest): (u64, Vec<(String, f64)>) = self
            .bounded(
                "MULTI",
                redis::pipe()
                    .atomic()
                    .cmd("ZREMRANGEBYSCORE")
                    .arg(key)
                    .arg("-inf")
                    .arg(window_start(now, window_secs))
                    .ignore()
                    .cmd("ZCARD")
                    .arg(key)
                    .cmd("ZRANGE")
                    .arg(key)
                    .arg(0)
                    .arg(0)
                    .arg("WITHSCORES")
                    .query_async(&mut conn),
            )
            .await?;

        Ok(WindowOutcome {
            admitted: false,
            count,
            oldest: oldest.first().map(|(_, score)| *score as i64),
        })
    }
}
