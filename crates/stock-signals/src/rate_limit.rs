//! Per-domain request pacing

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio::time::Instant;
use tracing::debug;

/// Default minimum gap between two requests to the same domain
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Proof that a request to `domain` may go out now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    domain: String,
    granted_at: Instant,
}

impl Permit {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            granted_at: Instant::now(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }
}

/// Gate that delays callers until a domain may be contacted again
///
/// Implementations never reject a request; they only make the caller wait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn acquire(&self, domain: &str) -> Permit;
}

/// Time since the limiter was built, read from tokio's timer so paused test
/// time drives governor's decisions too.
#[derive(Debug, Clone, Copy)]
struct TokioClock {
    origin: Instant,
}

impl Clock for TokioClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, TokioClock, NoOpMiddleware<Duration>>;

/// One quota shared by every domain it applies to. A zero interval never waits.
struct Pacer {
    interval: Duration,
    limiter: Option<KeyedLimiter>,
}

impl Pacer {
    fn new(interval: Duration, clock: TokioClock) -> Self {
        let limiter = Quota::with_period(interval).map(|quota| {
            RateLimiter::new(
                quota.allow_burst(NonZeroU32::MIN),
                DefaultKeyedStateStore::default(),
                clock,
            )
        });
        Self { interval, limiter }
    }

    async fn wait(&self, domain: &str) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        let key = domain.to_string();
        while let Err(not_until) = limiter.check_key(&key) {
            let wait = not_until.wait_time_from(limiter.clock().now());
            debug!(domain, wait_ms = wait.as_millis() as u64, "Throttling request");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Process-wide [`Throttle`] keyed by domain
///
/// Backed by a keyed GCRA limiter allowing one request per interval per
/// domain with no burst. Domains with an override get a limiter of their own.
pub struct DomainRateLimiter {
    clock: TokioClock,
    default: Pacer,
    overrides: HashMap<String, Pacer>,
}

impl DomainRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        let clock = TokioClock { origin: Instant::now() };
        Self {
            clock,
            default: Pacer::new(min_interval, clock),
            overrides: HashMap::new(),
        }
    }

    /// Use a different interval for one domain
    pub fn with_override(mut self, domain: impl Into<String>, interval: Duration) -> Self {
        self.overrides.insert(domain.into(), Pacer::new(interval, self.clock));
        self
    }

    pub fn interval_for(&self, domain: &str) -> Duration {
        self.pacer(domain).interval
    }

    fn pacer(&self, domain: &str) -> &Pacer {
        self.overrides.get(domain).unwrap_or(&self.default)
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl fmt::Debug for DomainRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overrides: HashMap<&str, Duration> = self
            .overrides
            .iter()
            .map(|(domain, pacer)| (domain.as_str(), pacer.interval))
            .collect();
        f.debug_struct("DomainRateLimiter")
            .field("min_interval", &self.default.interval)
            .field("overrides", &overrides)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Throttle for DomainRateLimiter {
    async fn acquire(&self, domain: &str) -> Permit {
        self.pacer(domain).wait(domain).await;
        Permit::new(domain)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = DomainRateLimiter::default();
        let start = Instant::now();
        limiter.acquire("example.com").await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_domain_waits_for_interval() {
        let limiter = DomainRateLimiter::default();
        let first = limiter.acquire("example.com").await;
        let second = limiter.acquire("example.com").await;
        assert!(second.granted_at() - first.granted_at() >= DEFAULT_MIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_are_independent() {
        let limiter = DomainRateLimiter::default();
        let start = Instant::now();
        limiter.acquire("a.example").await;
        limiter.acquire("b.example").await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(DomainRateLimiter::new(Duration::from_millis(500)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire("example.com").await.granted_at() })
            })
            .collect();

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_interval() {
        let limiter = DomainRateLimiter::default().with_override("slow.example", Duration::from_secs(5));
        assert_eq!(limiter.interval_for("slow.example"), Duration::from_secs(5));
        assert_eq!(limiter.interval_for("other.example"), DEFAULT_MIN_INTERVAL);

        let first = limiter.acquire("slow.example").await;
        let second = limiter.acquire("slow.example").await;
        assert!(second.granted_at() - first.granted_at() >= Duration::from_secs(5));

        // The default domains keep their own pace
        let start = Instant::now();
        limiter.acquire("other.example").await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_waits() {
        let limiter = DomainRateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire("example.com").await;
        }
        assert_eq!(Instant::now(), start);
    }
}
