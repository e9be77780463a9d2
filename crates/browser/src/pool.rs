//! Bounded pool of browser sessions.
//!
//! A semaphore caps the number of sessions lent out at once; each permit
//! travels with the [`SessionHandle`] so a session is never held by two
//! callers. Sessions are created lazily up to the cap and either returned to
//! the idle list (healthy) or closed (unhealthy) on release.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    sysinfo::System,
    tokio::{
        sync::{Mutex, OwnedSemaphorePermit, Semaphore},
        time::Instant,
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::BrowserError,
    session::{BrowserSession, SessionFactory},
    types::{BrowserConfig, FetchRequest, RawPage},
};

/// Get current system memory usage as a percentage (0-100).
fn memory_usage_percent() -> u8 {
    let mut sys = System::new();
    sys.refresh_memory();

    let total = sys.total_memory();
    if total == 0 {
        return 0;
    }

    let percent = (sys.used_memory() as f64 / total as f64 * 100.0) as u8;
    percent.min(100)
}

/// Pool sizing and recycling policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum sessions in existence (idle plus lent).
    pub size: usize,
    /// Idle sessions unused for longer than this are closed.
    pub idle_timeout: Duration,
    /// Refuse to launch while memory use is at or above this (100 = never).
    pub memory_limit_percent: u8,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&BrowserConfig::default())
    }
}

impl From<&BrowserConfig> for PoolConfig {
    fn from(cfg: &BrowserConfig) -> Self {
        Self {
            size: cfg.pool_size.max(1),
            idle_timeout: Duration::from_secs(cfg.idle_timeout_secs),
            memory_limit_percent: cfg.memory_limit_percent,
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    /// Sessions currently lent to callers.
    pub lent: usize,
    pub idle: usize,
    /// Total `acquire` calls that obtained a session.
    pub acquired: u64,
    pub launched: u64,
    pub discarded: u64,
}

struct IdleSession {
    id: String,
    session: Box<dyn BrowserSession>,
    last_used: Instant,
}

struct PoolInner {
    factory: Arc<dyn SessionFactory>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleSession>>,
    live: AtomicUsize,
    acquired: AtomicU64,
    launched: AtomicU64,
    discarded: AtomicU64,
}

impl PoolInner {
    fn record_discard(&self, session_id: &str, reason: &str) {
        let live = self.live.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        self.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(session_id, reason, live, "discarded browser session");

        #[cfg(feature = "metrics")]
        {
            chainscope_metrics::gauge!(chainscope_metrics::browser::SESSIONS_ACTIVE).set(live as f64);
            chainscope_metrics::counter!(chainscope_metrics::browser::SESSIONS_DISCARDED_TOTAL)
                .increment(1);
        }
    }
}

/// A session lent to exactly one caller.
///
/// Hand it back with [`SessionPool::release`]. A handle dropped without
/// release (for example when the owning task is cancelled) discards its
/// session, since its state is unknown.
pub struct SessionHandle {
    id: String,
    session: Option<Box<dyn BrowserSession>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl SessionHandle {
    /// Identifier used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `request` on the lent session.
    pub async fn fetch(&mut self, request: &FetchRequest) -> Result<RawPage, BrowserError> {
        match self.session.as_deref_mut() {
            Some(session) => session.fetch(request).await,
            None => Err(BrowserError::SessionUnavailable(format!(
                "session {} already released",
                self.id
            ))),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            warn!(session_id = self.id, "session handle dropped without release");
            self.pool.record_discard(&self.id, "dropped");
        }
    }
}

/// Pool of browser sessions with a hard concurrency cap.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool").finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Build the pool and launch one session up front.
    ///
    /// A factory that cannot produce a session (browser binary missing,
    /// launch flags rejected) fails here rather than on the first request.
    pub async fn new(
        factory: Arc<dyn SessionFactory>,
        config: PoolConfig,
    ) -> Result<Self, BrowserError> {
        let size = config.size.max(1);
        let pool = Self {
            inner: Arc::new(PoolInner {
                factory,
                permits: Arc::new(Semaphore::new(size)),
                config: PoolConfig { size, ..config },
                idle: Mutex::new(Vec::with_capacity(size)),
                live: AtomicUsize::new(0),
                acquired: AtomicU64::new(0),
                launched: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        };

        let (id, session) = pool.launch().await?;
        pool.inner.idle.lock().await.push(IdleSession {
            id,
            session,
            last_used: Instant::now(),
        });

        info!(capacity = size, "browser session pool ready");
        Ok(pool)
    }

    /// Borrow a session, waiting up to `wait` for one to become free.
    pub async fn acquire(&self, wait: Duration) -> Result<SessionHandle, BrowserError> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(
            wait,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(BrowserError::PoolClosed),
            Err(_) => {
                #[cfg(feature = "metrics")]
                chainscope_metrics::counter!(chainscope_metrics::browser::ACQUIRE_TIMEOUTS_TOTAL)
                    .increment(1);
                warn!(wait_ms = wait.as_millis() as u64, "timed out waiting for a browser session");
                return Err(BrowserError::SessionUnavailable(format!(
                    "all {} sessions busy for {}ms",
                    self.inner.config.size,
                    wait.as_millis()
                )));
            },
        };

        #[cfg(feature = "metrics")]
        chainscope_metrics::histogram!(chainscope_metrics::browser::ACQUIRE_WAIT_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let (id, session) = match self.take_idle().await {
            Some(idle) => {
                debug!(session_id = idle.id, "reusing idle browser session");
                (idle.id, idle.session)
            },
            None => self.launch_guarded().await?,
        };

        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        debug!(
            session_id = id,
            waited_ms = started.elapsed().as_millis() as u64,
            "acquired browser session"
        );

        Ok(SessionHandle {
            id,
            session: Some(session),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Return a session. Healthy sessions go back to the idle list; anything
    /// else is closed and replaced lazily on a later `acquire`.
    pub async fn release(&self, mut handle: SessionHandle, healthy: bool) {
        let Some(mut session) = handle.session.take() else {
            return;
        };

        if healthy {
            self.inner.idle.lock().await.push(IdleSession {
                id: handle.id.clone(),
                session,
                last_used: Instant::now(),
            });
            debug!(session_id = handle.id, "returned browser session to pool");
        } else {
            session.close().await;
            self.inner.record_discard(&handle.id, "unhealthy");
        }
        // The permit is released when `handle` drops here, after the session
        // is back in the idle list.
    }

    /// Close every idle session and refuse further acquisitions.
    pub async fn shutdown(&self) {
        self.inner.permits.close();
        let idle: Vec<IdleSession> = self.inner.idle.lock().await.drain(..).collect();
        for mut entry in idle {
            entry.session.close().await;
            self.inner.record_discard(&entry.id, "shutdown");
        }
        info!("browser session pool shut down");
    }

    pub async fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().await.len();
        PoolStats {
            capacity: self.inner.config.size,
            lent: self
                .inner
                .config
                .size
                .saturating_sub(self.inner.permits.available_permits()),
            idle,
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            launched: self.inner.launched.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
        }
    }

    /// Pop the most recently used idle session, closing any that sat idle
    /// past the timeout.
    async fn take_idle(&self) -> Option<IdleSession> {
        let now = Instant::now();
        let idle_timeout = self.inner.config.idle_timeout;

        let (expired, fresh) = {
            let mut idle = self.inner.idle.lock().await;
            let (expired, keep): (Vec<_>, Vec<_>) = idle
                .drain(..)
                .partition(|s| now.duration_since(s.last_used) > idle_timeout);
            *idle = keep;
            (expired, idle.pop())
        };

        for mut entry in expired {
            entry.session.close().await;
            self.inner.record_discard(&entry.id, "idle timeout");
        }

        fresh
    }

    /// Launch a replacement session, respecting the memory guard.
    async fn launch_guarded(&self) -> Result<(String, Box<dyn BrowserSession>), BrowserError> {
        let limit = self.inner.config.memory_limit_percent;
        if limit < 100 {
            let usage = memory_usage_percent();
            if usage >= limit {
                warn!(
                    memory_usage = usage,
                    threshold = limit,
                    "refusing to launch browser session due to high memory usage"
                );
                return Err(BrowserError::SessionUnavailable(format!(
                    "memory usage {usage}% at or above {limit}%"
                )));
            }
        }
        self.launch().await
    }

    async fn launch(&self) -> Result<(String, Box<dyn BrowserSession>), BrowserError> {
        let id = generate_session_id();
        let session = self.inner.factory.launch(&id).await?;

        let live = self.inner.live.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.launched.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        {
            chainscope_metrics::gauge!(chainscope_metrics::browser::SESSIONS_ACTIVE).set(live as f64);
            chainscope_metrics::counter!(chainscope_metrics::browser::SESSIONS_CREATED_TOTAL)
                .increment(1);
        }

        info!(session_id = id, live, "launched new browser session");
        Ok((id, session))
    }
}

/// Generate a random session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let id: u64 = rand::rng().random();
    format!("session-{id:016x}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        std::sync::atomic::AtomicBool,
    };

    struct FakeSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn fetch(&mut self, _request: &FetchRequest) -> Result<RawPage, BrowserError> {
            Ok(RawPage::default())
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        launches: AtomicUsize,
        closed: Arc<AtomicUsize>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn launch(&self, _id: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BrowserError::BrowserNotAvailable("no chrome".into()));
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn config(size: usize) -> PoolConfig {
        PoolConfig {
            size,
            idle_timeout: Duration::from_secs(300),
            memory_limit_percent: 100,
        }
    }

    #[test]
    fn test_generate_session_id() {
        let id1 = generate_session_id();
        let id2 = generate_session_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("session-"));
    }

    #[tokio::test]
    async fn construction_fails_when_factory_cannot_launch() {
        let factory = Arc::new(FakeFactory::default());
        factory.fail.store(true, Ordering::SeqCst);
        let err = SessionPool::new(factory, config(2)).await.unwrap_err();
        assert!(matches!(err, BrowserError::BrowserNotAvailable(_)));
    }

    #[tokio::test]
    async fn healthy_release_reuses_session() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), config(2)).await.unwrap();

        let mut handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let first_id = handle.id().to_string();
        let page = handle
            .fetch(&FetchRequest {
                url: "https://example.com/".into(),
                capture: "/api".into(),
                capture_wait: Duration::from_secs(1),
                settle: Duration::ZERO,
            })
            .await;
        assert!(page.is_ok());
        pool.release(handle, true).await;

        let handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.id(), first_id);
        pool.release(handle, true).await;

        assert_eq!(factory.launches.load(Ordering::SeqCst), 1);
        let stats = pool.stats().await;
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.lent, 0);
    }

    #[tokio::test]
    async fn unhealthy_release_destroys_and_replaces_lazily() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), config(1)).await.unwrap();

        let handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        pool.release(handle, false).await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(factory.launches.load(Ordering::SeqCst), 1);

        let handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(factory.launches.load(Ordering::SeqCst), 2);
        pool.release(handle, true).await;

        let stats = pool.stats().await;
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.launched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_exhausted() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory, config(1)).await.unwrap();

        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let err = pool.acquire(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BrowserError::SessionUnavailable(_)));

        pool.release(held, true).await;
        assert!(pool.acquire(Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn waiter_is_served_once_session_returns() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), config(1)).await.unwrap();

        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(10)).await })
        };
        tokio::task::yield_now().await;
        pool.release(held, true).await;

        let handle = waiter.await.unwrap().unwrap();
        pool.release(handle, true).await;
        assert_eq!(factory.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), config(3)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(pool.acquire(Duration::from_secs(1)).await.unwrap());
        }
        assert_eq!(pool.stats().await.lent, 3);
        assert!(pool.acquire(Duration::from_millis(10)).await.is_err());
        assert_eq!(factory.launches.load(Ordering::SeqCst), 3);

        for handle in handles {
            pool.release(handle, true).await;
        }
        assert_eq!(pool.stats().await.idle, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), PoolConfig {
            idle_timeout: Duration::from_secs(60),
            ..config(1)
        })
        .await
        .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(factory.launches.load(Ordering::SeqCst), 2);
        pool.release(handle, true).await;
    }

    #[tokio::test]
    async fn dropped_handle_frees_permit_and_discards() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), config(1)).await.unwrap();

        let handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        drop(handle);

        let stats = pool.stats().await;
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.lent, 0);
        let handle = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(factory.launches.load(Ordering::SeqCst), 2);
        pool.release(handle, true).await;
    }

    #[tokio::test]
    async fn shutdown_closes_idle_and_rejects_acquire() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), config(2)).await.unwrap();
        pool.shutdown().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            pool.acquire(Duration::from_secs(1)).await,
            Err(BrowserError::PoolClosed)
        ));
    }
}
