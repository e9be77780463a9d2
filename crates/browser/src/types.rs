//! Browser configuration and the raw fetch request/response structures.

use std::time::Duration;

use serde::Serialize;

/// Desktop Chrome user agent used when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Maximum concurrent browser sessions.
    pub pool_size: usize,
    /// System memory usage threshold (0-100) above which new sessions are refused.
    /// 100 disables the check.
    pub memory_limit_percent: u8,
    /// Idle sessions older than this are closed instead of reused.
    pub idle_timeout_secs: u64,
    /// CDP request timeout in milliseconds.
    pub navigation_timeout_ms: u64,
    /// User agent string.
    pub user_agent: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self::from(&chainscope_config::BrowserConfig::default())
    }
}

impl From<&chainscope_config::BrowserConfig> for BrowserConfig {
    fn from(cfg: &chainscope_config::BrowserConfig) -> Self {
        Self {
            chrome_path: cfg.chrome_path.clone(),
            headless: cfg.headless,
            pool_size: cfg.pool_size,
            memory_limit_percent: cfg.memory_limit_percent,
            idle_timeout_secs: cfg.idle_timeout_secs,
            navigation_timeout_ms: cfg.navigation_timeout_ms,
            user_agent: cfg.user_agent.clone(),
            chrome_args: cfg.chrome_args.clone(),
            viewport_width: cfg.viewport_width,
            viewport_height: cfg.viewport_height,
        }
    }
}

impl BrowserConfig {
    /// Effective user agent.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// One page load plus the internal API response to capture from it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Page to navigate to.
    pub url: String,
    /// Substring identifying the network response whose body is wanted.
    pub capture: String,
    /// How long to wait for the captured response to show up.
    pub capture_wait: Duration,
    /// Delay after the capture is observed before reading its body.
    pub settle: Duration,
}

/// A network response captured during navigation.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Everything a session brings back from one fetch.
///
/// A missing capture is not an error at this layer: the caller decides
/// whether the page was blocked, changed, or simply had no data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawPage {
    /// URL after redirects.
    pub final_url: String,
    /// HTTP status of the main document, when observed.
    pub document_status: Option<u16>,
    /// Rendered page HTML, when it could be read.
    pub html: Option<String>,
    /// The captured API response, if it arrived in time.
    pub captured: Option<CapturedResponse>,
}
