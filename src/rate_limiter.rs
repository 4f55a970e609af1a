// Pacing between successive upstream calls (per-pool fetches during a sync)
use crate::error::{EngineError, Result};
use crate::settings::{PacingMode, SyncSettings};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gate awaited before every paced call.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pace(&self);
}

/// Guarantees at least `delay` between the starts of two consecutive calls.
/// The first call passes immediately.
pub struct FixedDelayPacer {
    delay: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl FixedDelayPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_start: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Pacer for FixedDelayPacer {
    async fn pace(&self) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            tokio::time::sleep_until(previous + self.delay).await;
        }
        *last_start = Some(Instant::now());
    }
}

/// Token bucket backed by `governor`, for upstreams that publish a QPS budget.
pub struct TokenBucketPacer {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl TokenBucketPacer {
    pub fn new(requests_per_second: u32, burst: u32) -> Result<Self> {
        let rps = NonZeroU32::new(requests_per_second)
            .ok_or_else(|| EngineError::validation("requests_per_second must be non-zero"))?;
        let burst = NonZeroU32::new(burst).unwrap_or(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);
        Ok(Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }
}

#[async_trait]
impl Pacer for TokenBucketPacer {
    async fn pace(&self) {
        self.limiter.until_ready().await;
    }
}

/// No pacing at all.
pub struct NoopPacer;

#[async_trait]
impl Pacer for NoopPacer {
    async fn pace(&self) {}
}

pub fn pacer_from_settings(settings: &SyncSettings) -> Result<Arc<dyn Pacer>> {
    Ok(match settings.pacing {
        PacingMode::Fixed => Arc::new(FixedDelayPacer::new(Duration::from_millis(
            settings.inter_pool_delay_ms,
        ))),
        PacingMode::TokenBucket => Arc::new(TokenBucketPacer::new(
            settings.requests_per_second,
            settings.burst,
        )?),
        PacingMode::None => Arc::new(NoopPacer),
    })
}
