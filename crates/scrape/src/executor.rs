//! Scrape Executor: one attempt, from session acquisition to a parsed
//! record. Retries live in [`crate::retry`].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    chainscope_browser::{BrowserError, RawPage, SessionPool},
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    key::ScrapeKey,
    outcome::{FailureKind, ScrapeFailure, ScrapeOutcome},
    parser::parse,
    record::Record,
    source::Source,
    symbol::normalize,
};

/// Anything that can turn a key into an outcome.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, key: &ScrapeKey) -> ScrapeOutcome;
}

/// Markers of a challenge or block page, matched case-insensitively. Only
/// consulted once the document itself looks blocked.
const BLOCK_MARKERS: &[&str] = &[
    "px-captcha",
    "cf-challenge",
    "challenge-form",
    "access denied",
    "too many requests",
    "unusual traffic",
    "are you a robot",
    "request blocked",
];

/// Path fragments of the pages a blocked visitor is redirected to.
const CHALLENGE_PATHS: &[&str] = &["/blocked", "/captcha", "/challenge", "/cdn-cgi/challenge"];

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long to wait for a pool session.
    pub acquire_timeout: Duration,
    /// Deadline for navigation, capture and body read together.
    pub attempt_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&chainscope_config::ScrapeConfig::default())
    }
}

impl From<&chainscope_config::ScrapeConfig> for ExecutorConfig {
    fn from(cfg: &chainscope_config::ScrapeConfig) -> Self {
        Self {
            acquire_timeout: Duration::from_secs(cfg.acquire_timeout_secs),
            attempt_timeout: Duration::from_secs(cfg.attempt_timeout_secs),
        }
    }
}

/// Runs exactly one attempt per call against a pooled browser session.
pub struct ScrapeExecutor {
    pool: SessionPool,
    source: Arc<dyn Source>,
    config: ExecutorConfig,
}

impl ScrapeExecutor {
    pub fn new(pool: SessionPool, source: Arc<dyn Source>, config: ExecutorConfig) -> Self {
        Self {
            pool,
            source,
            config,
        }
    }

    async fn attempt(&self, key: &ScrapeKey) -> ScrapeOutcome {
        let request = self.source.request(key);

        let mut handle = self
            .pool
            .acquire(self.config.acquire_timeout)
            .await
            .map_err(|e| ScrapeFailure::session_unavailable(e.to_string()))?;
        let session_id = handle.id().to_string();

        let fetched =
            tokio::time::timeout(self.config.attempt_timeout, handle.fetch(&request))
                .await;

        let page = match fetched {
            Ok(Ok(page)) => {
                self.pool.release(handle, true).await;
                page
            },
            Ok(Err(err)) => {
                let (failure, healthy) = classify_browser_error(&err);
                warn!(
                    session_id,
                    key = %key,
                    error = %err,
                    healthy,
                    "browser fetch failed"
                );
                self.pool.release(handle, healthy).await;
                return Err(failure);
            },
            Err(_) => {
                // The session may still be mid-navigation; never reuse it.
                warn!(
                    session_id,
                    key = %key,
                    timeout_ms = self.config.attempt_timeout.as_millis() as u64,
                    "scrape attempt timed out"
                );
                self.pool.release(handle, false).await;
                return Err(ScrapeFailure::timeout(format!(
                    "attempt exceeded {}s",
                    self.config.attempt_timeout.as_secs()
                )));
            },
        };

        interpret(key, &page)
    }
}

#[async_trait]
impl Scraper for ScrapeExecutor {
    async fn scrape(&self, key: &ScrapeKey) -> ScrapeOutcome {
        let started = Instant::now();
        debug!(key = %key, source = self.source.name(), "scrape attempt started");

        let outcome = self.attempt(key).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(record) => info!(key = %key, rows = record.len(), elapsed_ms, "scrape succeeded"),
            Err(failure) => warn!(
                key = %key,
                kind = %failure.kind,
                detail = failure.detail,
                elapsed_ms,
                "scrape failed"
            ),
        }

        #[cfg(feature = "metrics")]
        {
            use chainscope_metrics::{counter, histogram, labels, scrape};
            let kind = key.kind.as_str();
            counter!(scrape::ATTEMPTS_TOTAL, labels::KIND => kind).increment(1);
            histogram!(scrape::DURATION_SECONDS, labels::KIND => kind)
                .record(started.elapsed().as_secs_f64());
            if let Err(failure) = &outcome {
                counter!(
                    scrape::FAILURES_TOTAL,
                    labels::KIND => kind,
                    labels::FAILURE => failure.kind.as_str()
                )
                .increment(1);
            }
        }

        outcome
    }
}

/// Map a browser error to a failure kind and whether the session survives.
fn classify_browser_error(err: &BrowserError) -> (ScrapeFailure, bool) {
    let detail = err.to_string();
    match err {
        BrowserError::Timeout(_) => (ScrapeFailure::timeout(detail), false),
        BrowserError::ResponseBody(_) | BrowserError::InvalidUrl(_) => {
            (ScrapeFailure::malformed(detail), true)
        },
        BrowserError::BrowserNotAvailable(_)
        | BrowserError::LaunchFailed(_)
        | BrowserError::NavigationFailed(_)
        | BrowserError::SessionUnavailable(_)
        | BrowserError::PoolClosed
        | BrowserError::ConnectionClosed(_)
        | BrowserError::Cdp(_) => (ScrapeFailure::session_unavailable(detail), false),
    }
}

/// Turn a fetched page into an outcome.
fn interpret(key: &ScrapeKey, page: &RawPage) -> ScrapeOutcome {
    if let Some(signal) = rate_limit_signal(page) {
        return Err(ScrapeFailure::rate_limited(signal));
    }

    let Some(captured) = &page.captured else {
        return Err(ScrapeFailure::malformed(format!(
            "expected {} response never arrived from {}",
            key.kind, page.final_url
        )));
    };
    if captured.status >= 400 {
        return Err(ScrapeFailure::malformed(format!(
            "upstream answered HTTP {} for {}",
            captured.status, captured.url
        )));
    }

    if let Some(other) = foreign_symbol(key, &captured.url) {
        return Err(ScrapeFailure::malformed(format!(
            "captured response for {other} instead of {}",
            key.symbol
        )));
    }

    let record = parse(key.kind, &captured.body).map_err(|e| {
        warn!(key = %key, error = %e, "captured body did not parse");
        ScrapeFailure::new(FailureKind::UpstreamMalformed, e.to_string())
    })?;

    if let Record::Quote(quote) = &record
        && !same_symbol(&quote.symbol, key.symbol.as_str())
    {
        return Err(ScrapeFailure::malformed(format!(
            "quote is for {} instead of {}",
            quote.symbol, key.symbol
        )));
    }

    Ok(Arc::new(record))
}

/// The ticker named by the capture URL's `symbol`/`symbols` parameter when
/// it is not the requested one. A late response from the page a reused tab
/// showed before would otherwise be cached under the wrong key.
fn foreign_symbol(key: &ScrapeKey, capture_url: &str) -> Option<String> {
    let url = Url::parse(capture_url).ok()?;
    let named: Vec<String> = url
        .query_pairs()
        .filter(|(name, _)| name == "symbol" || name == "symbols")
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .collect();
    if named.is_empty() || named.iter().any(|s| same_symbol(s, key.symbol.as_str())) {
        return None;
    }
    Some(named.join(","))
}

fn same_symbol(upstream: &str, requested: &str) -> bool {
    normalize(upstream).is_ok_and(|symbol| symbol.as_str() == requested)
}

/// Detect a block or throttle. A 429 anywhere counts. Otherwise the document
/// itself must look blocked (HTTP 403 or a redirect to a challenge path) and
/// the expected response must be missing or failed; ordinary pages embed
/// captcha scripts too.
fn rate_limit_signal(page: &RawPage) -> Option<String> {
    if page.document_status == Some(429) {
        return Some("page answered HTTP 429".into());
    }
    if let Some(captured) = &page.captured {
        if captured.status == 429 {
            return Some(format!("{} answered HTTP 429", captured.url));
        }
        if captured.status < 400 {
            return None;
        }
    }

    let forbidden = page.document_status == Some(403);
    if !forbidden && !is_challenge_url(&page.final_url) {
        return None;
    }

    let marker = page.html.as_deref().and_then(|html| {
        let html = html.to_ascii_lowercase();
        BLOCK_MARKERS.iter().find(|marker| html.contains(**marker))
    });
    Some(match marker {
        Some(marker) => format!("block page detected ({marker})"),
        None if forbidden => "page answered HTTP 403".into(),
        None => format!("redirected to challenge page {}", page.final_url),
    })
}

fn is_challenge_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let path = url.path().to_ascii_lowercase();
    CHALLENGE_PATHS.iter().any(|fragment| path.contains(fragment))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        chainscope_browser::CapturedResponse,
        serde_json::json,
    };

    fn key() -> ScrapeKey {
        ScrapeKey::expirations("AAPL").unwrap()
    }

    fn page_with(status: u16, body: &str) -> RawPage {
        RawPage {
            final_url: "https://www.barchart.com/stocks/quotes/AAPL/options".into(),
            document_status: Some(200),
            html: Some("<html><script src=\"recaptcha.js\"></script></html>".into()),
            captured: Some(CapturedResponse {
                url: "https://www.barchart.com/proxies/core-api/v1/options-expirations/get".into(),
                status,
                body: body.into(),
            }),
        }
    }

    #[test]
    fn captured_body_parses_to_record() {
        let body = json!({"data": [{"date": "2026-01-17", "optionsCount": 50}]}).to_string();
        let record = interpret(&key(), &page_with(200, &body)).unwrap();
        assert!(matches!(&*record, Record::Expirations(e) if e.len() == 1));
    }

    #[test]
    fn captcha_script_on_good_page_is_not_a_block() {
        let body = json!({"data": []}).to_string();
        assert!(interpret(&key(), &page_with(200, &body)).is_ok());
    }

    #[test]
    fn http_429_is_rate_limited() {
        let failure = interpret(&key(), &page_with(429, "")).unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamRateLimited);

        let page = RawPage {
            document_status: Some(429),
            ..RawPage::default()
        };
        assert_eq!(
            interpret(&key(), &page).unwrap_err().kind,
            FailureKind::UpstreamRateLimited
        );
    }

    #[test]
    fn block_page_without_capture_is_rate_limited() {
        let page = RawPage {
            final_url: "https://www.barchart.com/blocked".into(),
            document_status: Some(403),
            html: Some("<h1>Access Denied</h1>".into()),
            captured: None,
        };
        assert_eq!(
            interpret(&key(), &page).unwrap_err().kind,
            FailureKind::UpstreamRateLimited
        );
    }

    #[test]
    fn missing_capture_without_block_is_malformed() {
        let page = RawPage {
            html: Some("<html><body>Symbol not found</body></html>".into()),
            ..RawPage::default()
        };
        assert_eq!(
            interpret(&key(), &page).unwrap_err().kind,
            FailureKind::UpstreamMalformed
        );
    }

    #[test]
    fn captcha_script_without_capture_is_malformed_not_rate_limited() {
        let page = RawPage {
            final_url: "https://www.barchart.com/stocks/quotes/AAPL/options".into(),
            document_status: Some(200),
            html: Some(
                "<html><script src=\"https://www.google.com/recaptcha/api.js\"></script>\
                 <div class=\"g-recaptcha\"></div><p>Symbol not found</p></html>"
                    .into(),
            ),
            captured: None,
        };
        let key = ScrapeKey::chain("AAPL", None).unwrap();
        assert_eq!(
            interpret(&key, &page).unwrap_err().kind,
            FailureKind::UpstreamMalformed
        );
    }

    #[test]
    fn redirect_to_challenge_path_is_rate_limited() {
        let page = RawPage {
            final_url: "https://www.barchart.com/captcha?return=/stocks/quotes/AAPL".into(),
            document_status: Some(200),
            html: Some("<form id=\"challenge-form\"></form>".into()),
            captured: None,
        };
        let failure = interpret(&key(), &page).unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamRateLimited);
        assert!(failure.detail.contains("challenge-form"), "{}", failure.detail);
    }

    #[test]
    fn forbidden_document_without_markers_is_rate_limited() {
        let page = RawPage {
            final_url: "https://www.barchart.com/stocks/quotes/AAPL/options".into(),
            document_status: Some(403),
            html: Some("<html></html>".into()),
            captured: None,
        };
        assert_eq!(
            interpret(&key(), &page).unwrap_err().kind,
            FailureKind::UpstreamRateLimited
        );
    }

    fn quote_page(capture_url: &str, symbol: &str) -> RawPage {
        RawPage {
            final_url: "https://www.barchart.com/stocks/quotes/TSLA/overview".into(),
            document_status: Some(200),
            html: None,
            captured: Some(CapturedResponse {
                url: capture_url.into(),
                status: 200,
                body: json!({"data": [{"symbol": symbol, "lastPrice": "229.87"}]}).to_string(),
            }),
        }
    }

    #[test]
    fn capture_for_another_symbol_is_rejected() {
        let key = ScrapeKey::quote("TSLA").unwrap();
        let page = quote_page(
            "https://www.barchart.com/proxies/core-api/v1/quotes/get?symbols=AAPL&fields=lastPrice",
            "AAPL",
        );
        let failure = interpret(&key, &page).unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamMalformed);
        assert!(failure.detail.contains("AAPL"), "{}", failure.detail);
    }

    #[test]
    fn quote_body_for_another_symbol_is_rejected() {
        let key = ScrapeKey::quote("TSLA").unwrap();
        let page = quote_page("https://www.barchart.com/proxies/core-api/v1/quotes/get", "AAPL");
        assert_eq!(
            interpret(&key, &page).unwrap_err().kind,
            FailureKind::UpstreamMalformed
        );
    }

    #[test]
    fn matching_symbol_is_accepted_across_case_and_encoding() {
        let key = ScrapeKey::quote("$spx").unwrap();
        let page = quote_page(
            "https://www.barchart.com/proxies/core-api/v1/quotes/get?symbols=%24SPX,%24VIX",
            "$spx",
        );
        let record = interpret(&key, &page).unwrap();
        assert!(matches!(&*record, Record::Quote(q) if q.last_price.is_some()));
    }

    #[test]
    fn unparseable_body_is_malformed() {
        let failure = interpret(&key(), &page_with(200, "<html>oops</html>")).unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamMalformed);
    }

    #[test]
    fn upstream_error_status_is_malformed() {
        let failure = interpret(&key(), &page_with(500, "{}")).unwrap_err();
        assert_eq!(failure.kind, FailureKind::UpstreamMalformed);
    }

    #[test]
    fn browser_errors_classified() {
        let (f, healthy) = classify_browser_error(&BrowserError::Timeout("nav".into()));
        assert_eq!(f.kind, FailureKind::Timeout);
        assert!(!healthy);

        let (f, healthy) = classify_browser_error(&BrowserError::ConnectionClosed("gone".into()));
        assert_eq!(f.kind, FailureKind::SessionUnavailable);
        assert!(!healthy);

        let (f, healthy) = classify_browser_error(&BrowserError::ResponseBody("evicted".into()));
        assert_eq!(f.kind, FailureKind::UpstreamMalformed);
        assert!(healthy);
    }
}
