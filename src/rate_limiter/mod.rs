//! Fixed-window rate limiting for the network-facing payment endpoints.
//!
//! The limiter is an injected capability held in `AppState`, keyed by
//! `{endpoint}:{client_ip}`. The default backend is a process-local
//! `DashMap`; a Redis backend shares counters across instances and falls
//! back to the in-process store when Redis is unreachable.

use axum::http::HeaderMap;
use dashmap::DashMap;
use metrics::counter;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets; only meaningful when rejected.
    pub retry_after_secs: u64,
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

#[derive(Clone)]
pub enum RateLimitBackend {
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

#[derive(Clone)]
enum Store {
    InMemory {
        entries: Arc<DashMap<String, WindowEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, WindowEntry>>,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Store,
}

impl RateLimiter {
    pub fn new(backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => Store::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => Store::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(RateLimitBackend::InMemory)
    }

    pub async fn check(&self, key: &str, config: RateLimitConfig) -> RateLimitDecision {
        let decision = match &self.store {
            Store::InMemory { entries } => Self::check_in_memory(entries, key, config),
            Store::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, config).await {
                        Ok(decision) => decision,
                        Err(err) => {
                            warn!(error = %err, "redis rate limit check failed, using fallback");
                            Self::check_in_memory(fallback, key, config)
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "redis unavailable for rate limiting, using fallback");
                    Self::check_in_memory(fallback, key, config)
                }
            },
        };

        if !decision.allowed {
            counter!("storefront_rate_limiter.rejected", 1);
        }
        decision
    }

    fn check_in_memory(
        entries: &DashMap<String, WindowEntry>,
        key: &str,
        config: RateLimitConfig,
    ) -> RateLimitDecision {
        let now = Instant::now();
        let mut entry = entries.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            reset_at: now + config.window,
        });

        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now + config.window;
        }

        if entry.count >= config.limit {
            let remaining_window = entry.reset_at.saturating_duration_since(now);
            // Round up so a caller never retries inside the closed window.
            let retry_after_secs = remaining_window.as_secs()
                + u64::from(remaining_window.subsec_nanos() > 0);
            return RateLimitDecision {
                allowed: false,
                limit: config.limit,
                remaining: 0,
                retry_after_secs: retry_after_secs.max(1),
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: config.limit,
            remaining: config.limit - entry.count,
            retry_after_secs: 0,
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: RateLimitConfig,
    ) -> Result<RateLimitDecision, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{namespace}:{key}");
        let window_secs = config.window.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&redis_key, window_secs as usize).await?;
        }

        if count > i64::from(config.limit) {
            let ttl: i64 = conn.ttl(&redis_key).await.unwrap_or(-1);
            let retry_after_secs = if ttl > 0 { ttl as u64 } else { window_secs };
            return Ok(RateLimitDecision {
                allowed: false,
                limit: config.limit,
                remaining: 0,
                retry_after_secs,
            });
        }

        Ok(RateLimitDecision {
            allowed: true,
            limit: config.limit,
            remaining: config.limit.saturating_sub(count as u32),
            retry_after_secs: 0,
        })
    }
}

/// Best-effort client address for rate-limit keys: first `x-forwarded-for`
/// hop, then `x-real-ip`, else "unknown".
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
