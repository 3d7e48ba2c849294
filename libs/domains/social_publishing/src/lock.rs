//! Short-lived per-product dedup lock.
//!
//! A flag with a timed expiry, not a queue: a second trigger arriving inside
//! the window is dropped.

use crate::error::PublishResult;
use crate::models::ProductId;
use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Lock key of a product, e.g. `product:42`
pub fn lock_key(product_id: ProductId) -> String {
    format!("product:{}", product_id)
}

/// Keyed mutual exclusion with expiry.
#[async_trait]
pub trait PublishLock: Send + Sync {
    /// Set `key` for `ttl` unless it is already held.
    ///
    /// Returns `true` when this call acquired the lock.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> PublishResult<bool>;
}

/// Time source for the in-memory lock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Process-wide lock. Enough for a single publisher instance.
pub struct InMemoryPublishLock<C: Clock = SystemClock> {
    clock: C,
    expiries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryPublishLock<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryPublishLock<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryPublishLock<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            expiries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<C: Clock> PublishLock for InMemoryPublishLock<C> {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> PublishResult<bool> {
        let now = self.clock.now();
        let mut expiries = self.expiries.lock().await;
        expiries.retain(|_, expires_at| *expires_at > now);

        if expiries.contains_key(key) {
            debug!(key = %key, "Publish lock already held");
            return Ok(false);
        }
        expiries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

/// Lock shared by every publisher instance through Redis.
#[derive(Clone)]
pub struct RedisPublishLock {
    conn: ConnectionManager,
}

impl RedisPublishLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect and verify the connection with `PING`.
    pub async fn connect(url: &str) -> PublishResult<Self> {
        info!("Connecting publish lock to Redis");
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self::new(manager))
    }
}

#[async_trait]
impl PublishLock for RedisPublishLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> PublishResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX replies nil when the key exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_lock_key() {
        assert_eq!(lock_key(42), "product:42");
    }

    #[tokio::test]
    async fn test_second_acquire_inside_window_fails() {
        let lock = InMemoryPublishLock::with_clock(ManualClock::new());

        assert!(lock.try_acquire("product:1", TTL).await.unwrap());
        assert!(!lock.try_acquire("product:1", TTL).await.unwrap());
        assert!(lock.try_acquire("product:2", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_expires_after_ttl() {
        let clock = ManualClock::new();
        let lock = InMemoryPublishLock::with_clock(clock.clone());

        assert!(lock.try_acquire("product:1", TTL).await.unwrap());

        clock.advance(Duration::from_secs(59));
        assert!(!lock.try_acquire("product:1", TTL).await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(lock.try_acquire("product:1", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_acquires_have_one_winner() {
        let lock = Arc::new(InMemoryPublishLock::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let lock = lock.clone();
                tokio::spawn(async move { lock.try_acquire("product:7", TTL).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
