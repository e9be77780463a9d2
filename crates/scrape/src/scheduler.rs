//! Coalescing Scheduler: the single entry point for resolving a key.
//!
//! Lookup order for `resolve(key)`:
//!
//! 1. fresh cache entry: served without touching the browser
//! 2. scrape already in flight for the key: attach and share its outcome
//! 3. cooldown after a rate limit: fail fast with the recorded failure
//! 4. otherwise register a new flight and run the wrapped [`Scraper`]
//!
//! The flight runs in its own task, so a caller that stops waiting does not
//! cancel it; the result still lands in the cache.

use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use {
    futures::FutureExt,
    tokio::{
        sync::{Mutex, watch},
        time::Instant,
    },
    tracing::{debug, info, warn},
};

use crate::{
    cache::{CacheEntry, ResultCache},
    executor::Scraper,
    key::ScrapeKey,
    outcome::{FailureKind, ScrapeFailure, ScrapeOutcome},
};

/// Outcome of a resolve that keeps the cache metadata of the record.
pub type EntryOutcome = Result<CacheEntry, ScrapeFailure>;
type Flight = watch::Receiver<Option<EntryOutcome>>;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long a key fails fast after a rate-limit signal. Zero disables
    /// cooldowns.
    pub cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&chainscope_config::RateLimitConfig::default())
    }
}

impl From<&chainscope_config::RateLimitConfig> for SchedulerConfig {
    fn from(cfg: &chainscope_config::RateLimitConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(cfg.cooldown_secs),
        }
    }
}

struct Cooldown {
    until: Instant,
    failure: ScrapeFailure,
}

struct SchedulerInner {
    cache: Arc<ResultCache>,
    scraper: Arc<dyn Scraper>,
    config: SchedulerConfig,
    in_flight: Mutex<HashMap<ScrapeKey, Flight>>,
    cooldowns: Mutex<HashMap<ScrapeKey, Cooldown>>,
}

enum Attach {
    Ready(EntryOutcome),
    Wait(Flight),
}

/// Cheap to clone; clones share cache, flights and cooldowns.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        cache: Arc<ResultCache>,
        scraper: Arc<dyn Scraper>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                scraper,
                config,
                in_flight: Mutex::new(HashMap::new()),
                cooldowns: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.inner.cache
    }

    /// Resolve `key` to a record or a classified failure.
    pub async fn resolve(&self, key: &ScrapeKey) -> ScrapeOutcome {
        self.resolve_entry(key).await.map(|entry| entry.value)
    }

    /// Like [`resolve`](Self::resolve), but keeps the cache metadata
    /// (fetch time, TTL) of the record.
    pub async fn resolve_entry(&self, key: &ScrapeKey) -> EntryOutcome {
        if let Some(entry) = self.inner.cache.get(key).await {
            record_lookup(key, true);
            return Ok(entry);
        }
        record_lookup(key, false);

        match self.attach(key).await {
            Attach::Ready(outcome) => outcome,
            Attach::Wait(flight) => wait(flight).await,
        }
    }

    /// Resolve with a bound on this caller's wait. When the deadline passes
    /// the caller gets `Timeout`; the scrape itself keeps running and still
    /// fills the cache.
    pub async fn resolve_with_deadline(
        &self,
        key: &ScrapeKey,
        deadline: Duration,
    ) -> ScrapeOutcome {
        match tokio::time::timeout(deadline, self.resolve(key)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(
                    key = %key,
                    deadline_ms = deadline.as_millis() as u64,
                    "caller deadline elapsed"
                );
                Err(ScrapeFailure::timeout(format!(
                    "no result within {}ms",
                    deadline.as_millis()
                )))
            },
        }
    }

    /// Drop the cached entry for `key` so the next resolve scrapes again.
    pub async fn invalidate(&self, key: &ScrapeKey) -> bool {
        self.inner.cache.invalidate(key).await
    }

    /// Number of keys with a scrape in flight.
    pub async fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    async fn attach(&self, key: &ScrapeKey) -> Attach {
        let mut in_flight = self.inner.in_flight.lock().await;

        if let Some(flight) = in_flight.get(key) {
            debug!(key = %key, "attached to in-flight scrape");
            #[cfg(feature = "metrics")]
            chainscope_metrics::counter!(
                chainscope_metrics::scheduler::COALESCED_TOTAL,
                chainscope_metrics::labels::KIND => key.kind.as_str()
            )
            .increment(1);
            return Attach::Wait(flight.clone());
        }

        // A flight may have finished between the cache miss and taking the
        // registry lock.
        if let Some(entry) = self.inner.cache.get(key).await {
            return Attach::Ready(Ok(entry));
        }
        if let Some(failure) = self.cooling_down(key).await {
            return Attach::Ready(Err(failure));
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.clone(), rx.clone());
        #[cfg(feature = "metrics")]
        chainscope_metrics::gauge!(chainscope_metrics::scheduler::IN_FLIGHT)
            .set(in_flight.len() as f64);
        drop(in_flight);

        debug!(key = %key, "starting scrape");
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::spawn(async move {
            let outcome = inner.run(&key).await;
            {
                let mut in_flight = inner.in_flight.lock().await;
                in_flight.remove(&key);
                #[cfg(feature = "metrics")]
                chainscope_metrics::gauge!(chainscope_metrics::scheduler::IN_FLIGHT)
                    .set(in_flight.len() as f64);
            }
            tx.send_replace(Some(outcome));
        });

        Attach::Wait(rx)
    }

    async fn cooling_down(&self, key: &ScrapeKey) -> Option<ScrapeFailure> {
        let mut cooldowns = self.inner.cooldowns.lock().await;
        let cooldown = cooldowns.get(key)?;
        if Instant::now() < cooldown.until {
            debug!(key = %key, "rejected during rate-limit cooldown");
            #[cfg(feature = "metrics")]
            chainscope_metrics::counter!(
                chainscope_metrics::scheduler::COOLDOWN_REJECTIONS_TOTAL,
                chainscope_metrics::labels::KIND => key.kind.as_str()
            )
            .increment(1);
            return Some(cooldown.failure.clone());
        }
        cooldowns.remove(key);
        None
    }
}

impl SchedulerInner {
    /// Run the scrape and record its effects. Called once per flight.
    async fn run(&self, key: &ScrapeKey) -> EntryOutcome {
        // Requires unwinding panics; the release profile must not abort.
        let outcome = AssertUnwindSafe(self.scraper.scrape(key))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ScrapeFailure::session_unavailable("scrape task panicked")));

        // Keys that are never requested again would otherwise keep their
        // expired cooldown forever.
        let now = Instant::now();
        self.cooldowns
            .lock()
            .await
            .retain(|_, cooldown| cooldown.until > now);

        match outcome {
            Ok(record) => Ok(self.cache.put(key, record).await),
            Err(failure) => {
                if failure.kind == FailureKind::UpstreamRateLimited && !self.config.cooldown.is_zero()
                {
                    info!(
                        key = %key,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "rate limited, cooling down key"
                    );
                    self.cooldowns.lock().await.insert(key.clone(), Cooldown {
                        until: now + self.config.cooldown,
                        failure: failure.clone(),
                    });
                }
                // Whatever is cached is past its TTL; do not keep it around.
                self.cache.invalidate(key).await;
                Err(failure)
            },
        }
    }
}

async fn wait(mut flight: Flight) -> EntryOutcome {
    match flight.wait_for(Option::is_some).await {
        Ok(value) => match &*value {
            Some(outcome) => outcome.clone(),
            None => Err(ScrapeFailure::session_unavailable(
                "scrape finished without an outcome",
            )),
        },
        Err(_) => {
            warn!("scrape task ended without publishing an outcome");
            Err(ScrapeFailure::session_unavailable(
                "scrape task ended without an outcome",
            ))
        },
    }
}

fn record_lookup(key: &ScrapeKey, hit: bool) {
    if !hit {
        debug!(key = %key, "cache miss");
    }
    #[cfg(feature = "metrics")]
    {
        use chainscope_metrics::{cache, counter, labels};
        let name = if hit { cache::HITS_TOTAL } else { cache::MISSES_TOTAL };
        counter!(name, labels::KIND => key.kind.as_str()).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{
            cache::TtlPolicy,
            record::{Quote, Record},
        },
        async_trait::async_trait,
        std::sync::{
            Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
        tokio::sync::Notify,
    };

    /// Counts calls, optionally blocks until released, then replays
    /// scripted outcomes (repeating the last one).
    struct Gate {
        calls: AtomicUsize,
        release: Notify,
        blocking: bool,
        outcomes: StdMutex<Vec<ScrapeOutcome>>,
    }

    impl Gate {
        fn new(blocking: bool, outcomes: Vec<ScrapeOutcome>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
                blocking,
                outcomes: StdMutex::new(outcomes),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Scraper for Gate {
        async fn scrape(&self, _key: &ScrapeKey) -> ScrapeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.blocking {
                self.release.notified().await;
            }
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            }
        }
    }

    fn quote(symbol: &str) -> ScrapeOutcome {
        Ok(Arc::new(Record::Quote(Quote {
            symbol: symbol.into(),
            ..Quote::default()
        })))
    }

    fn scheduler(scraper: Arc<Gate>, ttl_secs: u64, cooldown_secs: u64) -> Scheduler {
        let cache = Arc::new(ResultCache::new(
            TtlPolicy::uniform(Duration::from_secs(ttl_secs)),
            Duration::from_secs(3600),
        ));
        Scheduler::new(cache, scraper, SchedulerConfig {
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_scrape() {
        let gate = Gate::new(true, vec![quote("AAPL")]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let key = ScrapeKey::quote("AAPL").unwrap();

        let mut waiters = Vec::new();
        for _ in 0..10 {
            let scheduler = scheduler.clone();
            let key = key.clone();
            waiters.push(tokio::spawn(async move { scheduler.resolve(&key).await }));
        }
        while gate.calls() == 0 {
            tokio::task::yield_now().await;
        }
        // Let every waiter register before releasing the scrape.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        gate.release.notify_one();

        let results: Vec<_> = futures::future::join_all(waiters).await;
        let first = results[0].as_ref().unwrap().as_ref().unwrap();
        for result in &results {
            let record = result.as_ref().unwrap().as_ref().unwrap();
            assert!(Arc::ptr_eq(first, record));
        }
        assert_eq!(gate.calls(), 1);
        assert_eq!(scheduler.in_flight().await, 0);
    }

    #[tokio::test]
    async fn distinct_keys_scrape_independently() {
        let gate = Gate::new(false, vec![quote("X")]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let a = ScrapeKey::quote("AAPL").unwrap();
        let b = ScrapeKey::quote("MSFT").unwrap();

        let (ra, rb) = tokio::join!(scheduler.resolve(&a), scheduler.resolve(&b));
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(gate.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_skip_the_scraper_until_ttl() {
        let gate = Gate::new(false, vec![quote("AAPL")]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let key = ScrapeKey::quote("AAPL").unwrap();

        scheduler.resolve(&key).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        scheduler.resolve(&key).await.unwrap();
        assert_eq!(gate.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        scheduler.resolve(&key).await.unwrap();
        assert_eq!(gate.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_starts_cooldown() {
        let gate = Gate::new(false, vec![
            Err(ScrapeFailure::rate_limited("HTTP 429")),
            quote("AAPL"),
        ]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let key = ScrapeKey::quote("AAPL").unwrap();

        let first = scheduler.resolve(&key).await.unwrap_err();
        assert_eq!(first.kind, FailureKind::UpstreamRateLimited);

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = scheduler.resolve(&key).await.unwrap_err();
        assert_eq!(second, first);
        assert_eq!(gate.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(scheduler.resolve(&key).await.is_ok());
        assert_eq!(gate.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cooldowns_of_idle_keys_are_pruned() {
        let gate = Gate::new(false, vec![
            Err(ScrapeFailure::rate_limited("HTTP 429")),
            quote("MSFT"),
        ]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let limited = ScrapeKey::quote("AAPL").unwrap();

        scheduler.resolve(&limited).await.unwrap_err();
        assert_eq!(scheduler.inner.cooldowns.lock().await.len(), 1);

        // AAPL is never asked for again; another key's flight reclaims it.
        tokio::time::advance(Duration::from_secs(61)).await;
        scheduler
            .resolve(&ScrapeKey::quote("MSFT").unwrap())
            .await
            .unwrap();
        assert!(scheduler.inner.cooldowns.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cooldown_disables_fail_fast() {
        let gate = Gate::new(false, vec![
            Err(ScrapeFailure::rate_limited("HTTP 429")),
            quote("AAPL"),
        ]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 0);
        let key = ScrapeKey::quote("AAPL").unwrap();

        assert!(scheduler.resolve(&key).await.is_err());
        assert!(scheduler.resolve(&key).await.is_ok());
        assert_eq!(gate.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let gate = Gate::new(false, vec![
            Err(ScrapeFailure::malformed("layout changed")),
            quote("AAPL"),
        ]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let key = ScrapeKey::quote("AAPL").unwrap();

        let failure = scheduler.resolve(&key).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamMalformed);
        assert_eq!(scheduler.cache().stats().await.entries, 0);

        assert!(scheduler.resolve(&key).await.is_ok());
        assert_eq!(gate.calls(), 2);
    }

    #[tokio::test]
    async fn abandoned_caller_does_not_cancel_the_scrape() {
        let gate = Gate::new(true, vec![quote("AAPL")]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let key = ScrapeKey::quote("AAPL").unwrap();

        let outcome = scheduler
            .resolve_with_deadline(&key, Duration::from_millis(20))
            .await;
        assert_eq!(outcome.unwrap_err().kind, FailureKind::Timeout);
        assert_eq!(scheduler.in_flight().await, 1);

        gate.release.notify_one();
        while scheduler.in_flight().await > 0 {
            tokio::task::yield_now().await;
        }

        assert!(scheduler.cache().get(&key).await.is_some());
        assert!(scheduler.resolve(&key).await.is_ok());
        assert_eq!(gate.calls(), 1);
    }

    #[tokio::test]
    async fn resolve_entry_reports_fetch_time() {
        let gate = Gate::new(false, vec![quote("AAPL")]);
        let scheduler = scheduler(Arc::clone(&gate), 300, 60);
        let key = ScrapeKey::quote("AAPL").unwrap();

        let entry = scheduler.resolve_entry(&key).await.unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.ttl, Duration::from_secs(300));
        let again = scheduler.resolve_entry(&key).await.unwrap();
        assert_eq!(entry.fetched_at_utc, again.fetched_at_utc);
    }

    #[tokio::test]
    async fn panicking_scraper_surfaces_a_failure() {
        struct Boom;

        #[async_trait]
        impl Scraper for Boom {
            async fn scrape(&self, _key: &ScrapeKey) -> ScrapeOutcome {
                panic!("boom");
            }
        }

        let cache = Arc::new(ResultCache::new(TtlPolicy::default(), Duration::ZERO));
        let scheduler = Scheduler::new(cache, Arc::new(Boom), SchedulerConfig::default());
        let key = ScrapeKey::quote("AAPL").unwrap();

        let failure = scheduler.resolve(&key).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::SessionUnavailable);
        assert_eq!(scheduler.in_flight().await, 0);
    }
}
