//! Fixed-window request counters.
//!
//! A key's window starts on its first increment and fully resets once it has elapsed, so a
//! burst straddling a boundary can reach twice the limit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::RateLimitProvider;
use crate::services::clock::Clock;

/// Expired windows are swept after this many increments.
const SWEEP_INTERVAL: u64 = 1000;

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one hit against `key` and return the count within the current window.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, anyhow::Error>;
    /// Time until the current window for `key` resets; zero if there is none.
    async fn ttl(&self, key: &str) -> Result<Duration, anyhow::Error>;
}

pub async fn create_rate_limiter(
    provider: &RateLimitProvider,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn RateLimitStore>, anyhow::Error> {
    Ok(match provider {
        RateLimitProvider::None => {
            tracing::warn!("Rate limiting disabled");
            Arc::new(NoopRateLimiter)
        }
        RateLimitProvider::Local => Arc::new(MemoryRateLimiter::new(clock)),
        RateLimitProvider::Redis { url } => Arc::new(RedisRateLimiter::connect(url).await?),
    })
}

// ==================== Noop ====================

pub struct NoopRateLimiter;

#[async_trait]
impl RateLimitStore for NoopRateLimiter {
    async fn increment(&self, _key: &str, _window: Duration) -> Result<u64, anyhow::Error> {
        Ok(1)
    }

    async fn ttl(&self, _key: &str) -> Result<Duration, anyhow::Error> {
        Ok(Duration::ZERO)
    }
}

// ==================== In-process ====================

struct Window {
    count: u64,
    expires: DateTime<Utc>,
}

#[derive(Default)]
struct Windows {
    entries: HashMap<String, Window>,
    operations: u64,
}

pub struct MemoryRateLimiter {
    clock: Arc<dyn Clock>,
    windows: Mutex<Windows>,
}

impl MemoryRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(Windows::default()),
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, anyhow::Error> {
        let span = chrono::Duration::from_std(window)
            .map_err(|e| anyhow::anyhow!("Invalid rate limit window: {}", e))?;
        let now = self.clock.now();

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.operations += 1;
        if windows.operations % SWEEP_INTERVAL == 0 {
            windows.entries.retain(|_, w| w.expires > now);
        }

        let entry = windows.entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires: now + span,
        });
        if entry.expires <= now {
            entry.count = 0;
            entry.expires = now + span;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn ttl(&self, key: &str) -> Result<Duration, anyhow::Error> {
        let now = self.clock.now();
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(windows
            .entries
            .get(key)
            .and_then(|w| (w.expires - now).to_std().ok())
            .unwrap_or(Duration::ZERO))
    }
}

// ==================== Redis ====================

#[derive(Clone)]
pub struct RedisRateLimiter {
    manager: ConnectionManager,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, anyhow::Error> {
        let mut conn = self.manager.clone();
        let window_ms = window.as_millis() as u64;

        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(window_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start rate limit window: {}", e))?;
        if created.is_some() {
            return Ok(1);
        }

        let count: u64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment rate limit: {}", e))?;

        // The key expired between SET and INCR; INCR recreated it without a TTL.
        if count == 1 {
            let _: i64 = redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window_ms)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to set rate limit expiry: {}", e))?;
        }
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Duration, anyhow::Error> {
        let mut conn = self.manager.clone();
        let remaining: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read rate limit ttl: {}", e))?;
        Ok(Duration::from_millis(remaining.max(0) as u64))
    }
}
