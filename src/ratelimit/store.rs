//! Shared counter stores.
//!
//! The limiter only needs four primitives from a store: read a value,
//! check for a key, atomically increment an existing key, and set a key with
//! an expiry. [`RedisStore`] binds them to a Redis-compatible server;
//! [`MemoryStore`] keeps them in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use crate::error::{QuotagateError, Result};

/// The operations the limiter requires from a key-value store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the raw value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Check whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically add one to the integer at `key`, leaving its expiry alone.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Store `value` at `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: i64, ttl: Duration) -> Result<()>;
}

/// Counter store backed by a Redis-compatible server.
///
/// In production the connection is a `ConnectionManager`, which multiplexes
/// commands over one connection and reconnects on its own after connection
/// loss. Each command runs on a clone of the connection.
#[derive(Clone)]
pub struct RedisStore<C = ConnectionManager> {
    connection: C,
}

impl RedisStore<ConnectionManager> {
    /// Connect to the server at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| {
            QuotagateError::StoreUnavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            QuotagateError::StoreUnavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        info!(url = %url, "Connected to Redis counter store");
        Ok(Self { connection })
    }
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wrap an already established connection.
    pub fn with_connection(connection: C) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl<C> CounterStore for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        Ok(conn.exists(key).await?)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn set_ex(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process counter store with TTL expiry.
///
/// Expiry is evaluated lazily against the injected clock, so a
/// [`ManualClock`](super::clock::ManualClock) controls when keys disappear.
/// Counters are not shared between processes.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent operation fail with `StoreUnavailable`, or
    /// bring the store back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Store a raw value without expiry.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    /// Remaining time to live of a key, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let entry = Self::live_entry(&mut entries, key, now)?;
        entry
            .expires_at
            .and_then(|at| (at - now).to_std().ok())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| !Self::is_expired(e, now));
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QuotagateError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }

    fn is_expired(entry: &Entry, now: DateTime<Utc>) -> bool {
        entry.expires_at.is_some_and(|at| at <= now)
    }

    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| Self::is_expired(e, now)) {
            debug!(key = %key, "Expiring in-memory counter");
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, key, now).map(|e| e.value.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, key, now).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key, now) {
            Some(entry) => {
                let current: i64 = entry.value.parse().map_err(|_| {
                    QuotagateError::MalformedCounterValue {
                        key: key.to_string(),
                        value: entry.value.clone(),
                    }
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn set_ex(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl));
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}
