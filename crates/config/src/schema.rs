/// Config schema types (browser, scrape, retry, cache, rate limit, metrics).
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainscopeConfig {
    pub browser: BrowserConfig,
    pub scrape: ScrapeConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub metrics: MetricsConfig,
}

/// Headless browser pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Maximum number of concurrent browser sessions.
    pub pool_size: usize,
    /// System memory usage threshold (0-100) above which new sessions are refused.
    pub memory_limit_percent: u8,
    /// Idle sessions older than this are closed instead of reused.
    pub idle_timeout_secs: u64,
    /// CDP request timeout in milliseconds.
    pub navigation_timeout_ms: u64,
    /// User agent string (a desktop Chrome UA if not set).
    pub user_agent: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            pool_size: 3,
            memory_limit_percent: 90,
            idle_timeout_secs: 300,
            navigation_timeout_ms: 30_000,
            user_agent: None,
            chrome_args: Vec::new(),
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }
}

/// Per-attempt scrape configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Maximum wait for a free browser session.
    pub acquire_timeout_secs: u64,
    /// Overall deadline for one attempt (navigation, capture, body read).
    pub attempt_timeout_secs: u64,
    /// How long to wait for the upstream API call to be observed.
    pub capture_wait_secs: u64,
    /// Extra delay after the capture so the response body is complete.
    pub settle_ms: u64,
    /// Upstream site root.
    pub base_url: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 30,
            attempt_timeout_secs: 60,
            capture_wait_secs: 25,
            settle_ms: 2_000,
            base_url: "https://www.barchart.com".into(),
        }
    }
}

/// Retry policy for transient scrape failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
    /// Random spread applied to each delay, as a fraction (0.0-1.0).
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 1_000,
            factor: 2,
            max_delay_ms: 30_000,
            jitter_pct: 0.0,
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    pub quote_ttl_secs: Option<u64>,
    pub expirations_ttl_secs: Option<u64>,
    pub chain_ttl_secs: Option<u64>,
    /// Background sweep interval; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
    /// How long a stale entry is kept before the sweeper reclaims it.
    pub retain_stale_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            quote_ttl_secs: None,
            expirations_ttl_secs: None,
            chain_ttl_secs: None,
            sweep_interval_secs: 0,
            retain_stale_secs: 3_600,
        }
    }
}

/// Upstream rate-limit handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fail-fast window after an upstream rate-limit signal.
    pub cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { cooldown_secs: 60 }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Global labels attached to every metric.
    pub labels: std::collections::BTreeMap<String, String>,
}
