//! Daily rate limiting against a shared counter store.
//!
//! Counters are keyed `daily:{scope}:{yyyy-mm-dd}` so the UTC-midnight
//! reset is implicit in the key; a TTL comfortably above one day garbage
//! collects them. Check-and-increment is a single atomic operation (one
//! Lua script in the Redis implementation): the entity and global counters
//! are only bumped when the request is admitted.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gateway_core::GatewayError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Counter TTL: 36 hours, comfortably past the daily rollover.
const COUNTER_TTL_SECS: i64 = 36 * 3600;

const CHECK_AND_INCR_LUA: &str = r#"
local global = tonumber(redis.call('GET', KEYS[1]) or '0')
if global >= tonumber(ARGV[1]) then
    return {-1, global}
end
local entity = tonumber(redis.call('GET', KEYS[2]) or '0')
if entity >= tonumber(ARGV[2]) then
    return {-2, entity}
end
entity = redis.call('INCR', KEYS[2])
if entity == 1 then
    redis.call('EXPIRE', KEYS[2], ARGV[3])
end
global = redis.call('INCR', KEYS[1])
if global == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[3])
end
return {entity, global}
"#;

/// Outcome of an atomic check-and-increment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateOutcome {
    Allowed { used: u64 },
    EntityLimited,
    GlobalLimited,
}

/// Capability over the shared counter store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Check the global then the entity counter and increment both iff the
    /// request is admitted. Atomic with respect to concurrent callers.
    async fn check_and_incr(
        &self,
        global_key: &str,
        global_limit: u64,
        entity_key: &str,
        entity_limit: u64,
        ttl_secs: i64,
    ) -> Result<RateOutcome, GatewayError>;

    /// Read one counter (0 when absent).
    async fn get(&self, key: &str) -> Result<u64, GatewayError>;

    /// Liveness probe.
    async fn ping(&self) -> bool;
}

/// Redis-backed counter store.
pub struct RedisCounterStore {
    manager: redis::aio::ConnectionManager,
    script: redis::Script,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GatewayError::DependencyUnavailable(format!("redis: {e}")))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::DependencyUnavailable(format!("redis: {e}")))?;
        Ok(Self {
            manager,
            script: redis::Script::new(CHECK_AND_INCR_LUA),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn check_and_incr(
        &self,
        global_key: &str,
        global_limit: u64,
        entity_key: &str,
        entity_limit: u64,
        ttl_secs: i64,
    ) -> Result<RateOutcome, GatewayError> {
        let mut conn = self.manager.clone();
        let result: Vec<i64> = self
            .script
            .key(global_key)
            .key(entity_key)
            .arg(global_limit)
            .arg(entity_limit)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GatewayError::DependencyUnavailable(format!("redis: {e}")))?;

        match result.first().copied() {
            Some(-1) => Ok(RateOutcome::GlobalLimited),
            Some(-2) => Ok(RateOutcome::EntityLimited),
            Some(used) if used > 0 => Ok(RateOutcome::Allowed { used: used as u64 }),
            _ => Err(GatewayError::DependencyUnavailable(
                "redis: unexpected script reply".into(),
            )),
        }
    }

    async fn get(&self, key: &str) -> Result<u64, GatewayError> {
        let mut conn = self.manager.clone();
        let value: Option<u64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::DependencyUnavailable(format!("redis: {e}")))?;
        Ok(value.unwrap_or(0))
    }

    async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

/// In-memory counter store for tests and single-process development.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn check_and_incr(
        &self,
        global_key: &str,
        global_limit: u64,
        entity_key: &str,
        entity_limit: u64,
        _ttl_secs: i64,
    ) -> Result<RateOutcome, GatewayError> {
        let mut counters = self.counters.lock();
        let global = counters.get(global_key).copied().unwrap_or(0);
        if global >= global_limit {
            return Ok(RateOutcome::GlobalLimited);
        }
        let entity = counters.get(entity_key).copied().unwrap_or(0);
        if entity >= entity_limit {
            return Ok(RateOutcome::EntityLimited);
        }
        counters.insert(entity_key.to_string(), entity + 1);
        counters.insert(global_key.to_string(), global + 1);
        Ok(RateOutcome::Allowed { used: entity + 1 })
    }

    async fn get(&self, key: &str) -> Result<u64, GatewayError> {
        Ok(self.counters.lock().get(key).copied().unwrap_or(0))
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// Daily limits per scope.
#[derive(Clone, Copy, Debug)]
pub struct RateLimits {
    pub per_miner: u64,
    pub per_validator: u64,
    pub per_ip: u64,
    pub global: u64,
}

/// Who is being limited.
#[derive(Clone, Copy, Debug)]
pub enum Scope<'a> {
    Miner(&'a str),
    Validator(&'a str),
    Ip(&'a str),
}

impl Scope<'_> {
    fn key(&self, date: &str) -> String {
        match self {
            Scope::Miner(hotkey) => format!("daily:miner:{hotkey}:{date}"),
            Scope::Validator(hotkey) => format!("daily:validator:{hotkey}:{date}"),
            Scope::Ip(addr) => format!("daily:ip:{addr}:{date}"),
        }
    }

    fn limit(&self, limits: &RateLimits) -> u64 {
        match self {
            Scope::Miner(_) => limits.per_miner,
            Scope::Validator(_) => limits.per_validator,
            Scope::Ip(_) => limits.per_ip,
        }
    }
}

/// Admission decision for an allowed request.
#[derive(Clone, Copy, Debug)]
pub struct RateDecision {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// Daily rate limiter over a [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limits: RateLimits,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limits: RateLimits, enabled: bool) -> Self {
        Self {
            store,
            limits,
            enabled,
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Next UTC midnight after `now`; counters implicitly reset there.
    pub fn reset_at(now: DateTime<Utc>) -> DateTime<Utc> {
        (now + Duration::days(1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    /// Consume one unit of quota for `scope`, or reject.
    ///
    /// With rate limiting disabled this is a no-op (fail open); otherwise a
    /// store failure rejects the request with a retriable error (fail
    /// closed).
    pub async fn check(
        &self,
        scope: Scope<'_>,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, GatewayError> {
        let reset_at = Self::reset_at(now);
        if !self.enabled {
            return Ok(RateDecision {
                remaining: u64::MAX,
                reset_at,
            });
        }

        let date = now.format("%Y-%m-%d").to_string();
        let entity_key = scope.key(&date);
        let entity_limit = scope.limit(&self.limits);
        let global_key = format!("daily:global:{date}");

        let outcome = self
            .store
            .check_and_incr(
                &global_key,
                self.limits.global,
                &entity_key,
                entity_limit,
                COUNTER_TTL_SECS,
            )
            .await?;

        match outcome {
            RateOutcome::Allowed { used } => Ok(RateDecision {
                remaining: entity_limit.saturating_sub(used),
                reset_at,
            }),
            RateOutcome::EntityLimited => Err(GatewayError::RateExceeded {
                detail: format!("Daily limit of {entity_limit} exceeded."),
                reset_at,
            }),
            RateOutcome::GlobalLimited => Err(GatewayError::RateExceeded {
                detail: "Global request limit reached.".into(),
                reset_at,
            }),
        }
    }

    /// Today's global counter, for the `/rate-limits` endpoint.
    pub async fn global_usage(&self, now: DateTime<Utc>) -> Result<u64, GatewayError> {
        let date = now.format("%Y-%m-%d").to_string();
        self.store.get(&format!("daily:global:{date}")).await
    }

    pub async fn store_ok(&self) -> bool {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limiter(per_miner: u64, global: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            RateLimits {
                per_miner,
                per_validator: 10_000,
                per_ip: 1_000,
                global,
            },
            true,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_counts_up_to_limit_then_rejects() {
        let limiter = limiter(50, 1_000_000);
        for i in 0..50 {
            let decision = limiter.check(Scope::Miner("5HK"), t0()).await.unwrap();
            assert_eq!(decision.remaining, 50 - i - 1);
        }
        let err = limiter.check(Scope::Miner("5HK"), t0()).await.unwrap_err();
        match err {
            GatewayError::RateExceeded { reset_at, .. } => {
                assert_eq!(
                    reset_at,
                    Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
                );
            }
            other => panic!("expected RateExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_request_does_not_consume() {
        let store = Arc::new(MemoryCounterStore::new());
        let limiter = RateLimiter::new(
            store.clone(),
            RateLimits {
                per_miner: 1,
                per_validator: 1,
                per_ip: 1,
                global: 100,
            },
            true,
        );
        limiter.check(Scope::Miner("5HK"), t0()).await.unwrap();
        for _ in 0..3 {
            assert!(limiter.check(Scope::Miner("5HK"), t0()).await.is_err());
        }
        let key = "daily:miner:5HK:2025-06-01";
        assert_eq!(store.get(key).await.unwrap(), 1);
        assert_eq!(store.get("daily:global:2025-06-01").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_global_cap_applies_across_scopes() {
        let limiter = limiter(100, 2);
        limiter.check(Scope::Miner("5A"), t0()).await.unwrap();
        limiter.check(Scope::Miner("5B"), t0()).await.unwrap();
        let err = limiter.check(Scope::Miner("5C"), t0()).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateExceeded { .. }));
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let limiter = limiter(1, 1_000);
        limiter.check(Scope::Miner("5A"), t0()).await.unwrap();
        limiter.check(Scope::Miner("5B"), t0()).await.unwrap();
        limiter.check(Scope::Validator("5A"), t0()).await.unwrap();
        limiter.check(Scope::Ip("1.2.3.4"), t0()).await.unwrap();
    }

    #[tokio::test]
    async fn test_date_rollover_resets() {
        let limiter = limiter(1, 1_000);
        limiter.check(Scope::Miner("5A"), t0()).await.unwrap();
        assert!(limiter.check(Scope::Miner("5A"), t0()).await.is_err());

        let tomorrow = t0() + Duration::days(1);
        limiter.check(Scope::Miner("5A"), tomorrow).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_limiter_is_noop() {
        let store = Arc::new(MemoryCounterStore::new());
        let limiter = RateLimiter::new(
            store.clone(),
            RateLimits {
                per_miner: 0,
                per_validator: 0,
                per_ip: 0,
                global: 0,
            },
            false,
        );
        limiter.check(Scope::Miner("5A"), t0()).await.unwrap();
        assert_eq!(store.get("daily:miner:5A:2025-06-01").await.unwrap(), 0);
    }

    #[test]
    fn test_reset_at_is_next_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap();
        assert_eq!(
            RateLimiter::reset_at(now),
            Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
        );
    }
}
