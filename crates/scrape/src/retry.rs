//! Bounded exponential backoff around a [`Scraper`].

use std::time::Duration;

use {async_trait::async_trait, rand::Rng, tokio::time::sleep, tracing::warn};

use crate::{executor::Scraper, key::ScrapeKey, outcome::ScrapeOutcome};

/// Exponential backoff policy with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        factor: u32,
        max_delay: Duration,
        jitter_pct: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            factor: factor.max(1),
            max_delay: max_delay.max(base_delay),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1, Duration::ZERO, 0.0)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(retry);
        let delay = self.base_delay.saturating_mul(multiplier).min(self.max_delay);
        if self.jitter_pct <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_pct;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&chainscope_config::RetryConfig::default())
    }
}

impl From<&chainscope_config::RetryConfig> for RetryPolicy {
    fn from(cfg: &chainscope_config::RetryConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            Duration::from_millis(cfg.base_delay_ms),
            cfg.factor,
            Duration::from_millis(cfg.max_delay_ms),
            cfg.jitter_pct,
        )
    }
}

/// Retries transient failures of the wrapped scraper. Everything else is
/// returned as soon as it happens.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Scraper> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: Scraper> Scraper for Retrying<S> {
    async fn scrape(&self, key: &ScrapeKey) -> ScrapeOutcome {
        let mut attempt = 1;
        loop {
            let outcome = self.inner.scrape(key).await;
            let failure = match &outcome {
                Err(failure) if failure.is_transient() && attempt < self.policy.max_attempts => {
                    failure
                },
                _ => return outcome,
            };

            let delay = self.policy.delay_for(attempt - 1);
            warn!(
                key = %key,
                attempt,
                max_attempts = self.policy.max_attempts,
                kind = %failure.kind,
                delay_ms = delay.as_millis() as u64,
                "transient scrape failure, backing off"
            );

            #[cfg(feature = "metrics")]
            chainscope_metrics::counter!(
                chainscope_metrics::scrape::RETRIES_TOTAL,
                chainscope_metrics::labels::KIND => key.kind.as_str()
            )
            .increment(1);

            sleep(delay).await;
            attempt += 1;
        }
    }
}
