//! Wiring of the full stack from configuration.

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    chainscope_browser::{BrowserConfig, PoolConfig, SessionFactory, SessionPool},
    chainscope_config::ChainscopeConfig,
    tokio::task::JoinHandle,
    tracing::info,
};

use crate::{
    cache::ResultCache,
    executor::{ExecutorConfig, ScrapeExecutor},
    retry::{RetryPolicy, Retrying},
    scheduler::{Scheduler, SchedulerConfig},
    source::{BarchartSource, Source},
};

/// A running scheduler with its session pool and optional cache sweeper.
pub struct ScrapeService {
    scheduler: Scheduler,
    pool: SessionPool,
    sweeper: Option<JoinHandle<()>>,
}

impl ScrapeService {
    /// Build the stack against the configured upstream.
    pub async fn start(
        config: &ChainscopeConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self> {
        let source = BarchartSource::from_config(&config.scrape)
            .with_context(|| format!("invalid scrape.base_url {:?}", config.scrape.base_url))?;
        Self::start_with_source(config, factory, Arc::new(source)).await
    }

    pub async fn start_with_source(
        config: &ChainscopeConfig,
        factory: Arc<dyn SessionFactory>,
        source: Arc<dyn Source>,
    ) -> Result<Self> {
        let browser = BrowserConfig::from(&config.browser);
        let pool = SessionPool::new(factory, PoolConfig::from(&browser))
            .await
            .context("failed to start browser session pool")?;

        let executor = ScrapeExecutor::new(
            pool.clone(),
            source,
            ExecutorConfig::from(&config.scrape),
        );
        let scraper = Retrying::new(executor, RetryPolicy::from(&config.retry));

        let cache = Arc::new(ResultCache::from_config(&config.cache));
        let sweeper = match config.cache.sweep_interval_secs {
            0 => None,
            secs => Some(cache.spawn_sweeper(Duration::from_secs(secs))),
        };

        let scheduler = Scheduler::new(
            cache,
            Arc::new(scraper),
            SchedulerConfig::from(&config.rate_limit),
        );

        info!(
            pool_size = config.browser.pool_size,
            max_attempts = config.retry.max_attempts,
            cooldown_secs = config.rate_limit.cooldown_secs,
            "scrape service started"
        );

        Ok(Self {
            scheduler,
            pool,
            sweeper,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Stop the sweeper and close every idle browser session.
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        self.pool.shutdown().await;
        info!("scrape service stopped");
    }
}
