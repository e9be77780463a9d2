//! Result Cache: successful records keyed by [`ScrapeKey`] with a per-kind
//! time-to-live.
//!
//! Entries past their TTL are never served. They are kept for a retention
//! window so stats can report them, then dropped on the next lookup or by
//! the background sweeper. Failures are never stored here.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    chrono::{DateTime, Utc},
    tokio::{sync::RwLock, task::JoinHandle, time::Instant},
    tracing::{debug, info},
};

use crate::{
    key::{ScrapeKey, ScrapeKind},
    record::Record,
};

/// Freshness window per scrape kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub default: Duration,
    pub quote: Option<Duration>,
    pub expirations: Option<Duration>,
    pub chain: Option<Duration>,
}

impl TtlPolicy {
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            default: ttl,
            quote: None,
            expirations: None,
            chain: None,
        }
    }

    pub fn ttl_for(&self, kind: ScrapeKind) -> Duration {
        let specific = match kind {
            ScrapeKind::Quote => self.quote,
            ScrapeKind::Expirations => self.expirations,
            ScrapeKind::Chain => self.chain,
        };
        specific.unwrap_or(self.default)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from(&chainscope_config::CacheConfig::default())
    }
}

impl From<&chainscope_config::CacheConfig> for TtlPolicy {
    fn from(cfg: &chainscope_config::CacheConfig) -> Self {
        Self {
            default: Duration::from_secs(cfg.default_ttl_secs),
            quote: cfg.quote_ttl_secs.map(Duration::from_secs),
            expirations: cfg.expirations_ttl_secs.map(Duration::from_secs),
            chain: cfg.chain_ttl_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ScrapeKey,
    pub value: Arc<Record>,
    pub fetched_at: Instant,
    /// Wall-clock time of the fetch, for display.
    pub fetched_at_utc: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }

    fn expired_beyond(&self, retain: Duration) -> bool {
        self.age() >= self.ttl.saturating_add(retain)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
    pub stale: usize,
}

pub struct ResultCache {
    entries: RwLock<HashMap<ScrapeKey, CacheEntry>>,
    ttl: TtlPolicy,
    retain_stale: Duration,
}

impl ResultCache {
    pub fn new(ttl: TtlPolicy, retain_stale: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            retain_stale,
        }
    }

    pub fn from_config(cfg: &chainscope_config::CacheConfig) -> Self {
        Self::new(
            TtlPolicy::from(cfg),
            Duration::from_secs(cfg.retain_stale_secs),
        )
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// A fresh entry for `key`, if any.
    pub async fn get(&self, key: &ScrapeKey) -> Option<CacheEntry> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh() => {
                    debug!(key = %key, age_ms = entry.age().as_millis() as u64, "cache hit");
                    return Some(entry.clone());
                },
                Some(entry) if !entry.expired_beyond(self.retain_stale) => return None,
                Some(_) => {},
                None => return None,
            }
        }

        // Stale past the retention window: drop it, unless a refresh landed
        // in between.
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|e| e.expired_beyond(self.retain_stale))
        {
            entries.remove(key);
            debug!(key = %key, "dropped expired cache entry");
        }
        None
    }

    /// Store a record with the TTL for its kind, replacing any previous
    /// entry.
    pub async fn put(&self, key: &ScrapeKey, value: Arc<Record>) -> CacheEntry {
        let ttl = self.ttl.ttl_for(key.kind);
        self.put_with_ttl(key, value, ttl).await
    }

    pub async fn put_with_ttl(
        &self,
        key: &ScrapeKey,
        value: Arc<Record>,
        ttl: Duration,
    ) -> CacheEntry {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            ttl,
        };
        {
            let mut entries = self.entries.write().await;
            entries.insert(key.clone(), entry.clone());
            #[cfg(feature = "metrics")]
            chainscope_metrics::gauge!(chainscope_metrics::cache::ENTRIES)
                .set(entries.len() as f64);
        }
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cached scrape result");

        entry
    }

    /// Remove the entry for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &ScrapeKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            debug!(key = %key, "invalidated cache entry");
        }
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let fresh = entries.values().filter(|e| e.is_fresh()).count();
        CacheStats {
            entries: entries.len(),
            fresh,
            stale: entries.len() - fresh,
        }
    }

    /// Drop entries stale for longer than the retention window. Returns the
    /// number removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.expired_beyond(self.retain_stale));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "swept cache");
        }

        #[cfg(feature = "metrics")]
        {
            use chainscope_metrics::{cache, counter, gauge};
            let stale = entries.values().filter(|e| !e.is_fresh()).count();
            counter!(cache::SWEPT_TOTAL).increment(removed as u64);
            gauge!(cache::ENTRIES).set(entries.len() as f64);
            gauge!(cache::STALE_ENTRIES).set(stale as f64);
        }

        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is
    /// aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        info!(interval_secs = interval.as_secs(), "starting cache sweeper");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }
}
