//! Mapping from a [`ScrapeKey`] to the page to load and the internal API
//! response to capture from it.

use std::time::Duration;

use {chainscope_browser::FetchRequest, url::Url};

use crate::key::{ScrapeKey, ScrapeKind};

/// A scraping backend. Swapping the source leaves the rest of the stack
/// untouched as long as its captured bodies match the parser's contract.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn request(&self, key: &ScrapeKey) -> FetchRequest;
}

const QUOTE_CAPTURE: &str = "/proxies/core-api/v1/quotes/get";
const EXPIRATIONS_CAPTURE: &str = "/proxies/core-api/v1/options-expirations/get";
const CHAIN_CAPTURE: &str = "/proxies/core-api/v1/options/get";

/// Barchart quote and options pages.
#[derive(Debug, Clone)]
pub struct BarchartSource {
    base: Url,
    capture_wait: Duration,
    settle: Duration,
}

impl BarchartSource {
    pub fn new(
        base_url: &str,
        capture_wait: Duration,
        settle: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base_url)?,
            capture_wait,
            settle,
        })
    }

    pub fn from_config(cfg: &chainscope_config::ScrapeConfig) -> Result<Self, url::ParseError> {
        Self::new(
            &cfg.base_url,
            Duration::from_secs(cfg.capture_wait_secs),
            Duration::from_millis(cfg.settle_ms),
        )
    }

    fn page(&self, symbol: &str, view: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["stocks", "quotes", symbol, view]);
        }
        url
    }
}

impl Source for BarchartSource {
    fn name(&self) -> &str {
        "barchart"
    }

    fn request(&self, key: &ScrapeKey) -> FetchRequest {
        let symbol = key.symbol.as_str();
        let (url, capture) = match key.kind {
            ScrapeKind::Quote => (self.page(symbol, "overview"), QUOTE_CAPTURE),
            ScrapeKind::Expirations => (self.page(symbol, "options"), EXPIRATIONS_CAPTURE),
            ScrapeKind::Chain => {
                let mut url = self.page(symbol, "options");
                {
                    let mut query = url.query_pairs_mut();
                    if let Some(expiration) = &key.expiration {
                        query.append_pair("expiration", &expiration.to_string());
                    }
                    query.append_pair("view", "sbs");
                }
                (url, CHAIN_CAPTURE)
            },
        };

        FetchRequest {
            url: url.into(),
            capture: capture.to_string(),
            capture_wait: self.capture_wait,
            settle: self.settle,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn source() -> BarchartSource {
        BarchartSource::from_config(&chainscope_config::ScrapeConfig::default()).unwrap()
    }

    #[test]
    fn chain_url_carries_expiration_and_view() {
        let key = ScrapeKey::chain("aapl", Some("2026-01-17".parse().unwrap())).unwrap();
        let req = source().request(&key);
        assert_eq!(
            req.url,
            "https://www.barchart.com/stocks/quotes/AAPL/options?expiration=2026-01-17&view=sbs"
        );
        assert_eq!(req.capture, CHAIN_CAPTURE);
        assert_eq!(req.capture_wait, Duration::from_secs(25));
        assert_eq!(req.settle, Duration::from_millis(2000));
    }

    #[test]
    fn weekly_suffix_and_index_prefix_reach_the_url() {
        let key = ScrapeKey::chain("$spx", Some("2026-01-09-w".parse().unwrap())).unwrap();
        let req = source().request(&key);
        assert_eq!(
            req.url,
            "https://www.barchart.com/stocks/quotes/$SPX/options?expiration=2026-01-09-w&view=sbs"
        );
    }

    #[test]
    fn chain_without_expiration_uses_default_page() {
        let key = ScrapeKey::chain("AAPL", None).unwrap();
        assert_eq!(
            source().request(&key).url,
            "https://www.barchart.com/stocks/quotes/AAPL/options?view=sbs"
        );
    }

    #[test]
    fn quote_and_expirations_pages() {
        let quote = source().request(&ScrapeKey::quote("msft").unwrap());
        assert_eq!(
            quote.url,
            "https://www.barchart.com/stocks/quotes/MSFT/overview"
        );
        assert_eq!(quote.capture, QUOTE_CAPTURE);

        let exp = source().request(&ScrapeKey::expirations("msft").unwrap());
        assert_eq!(exp.url, "https://www.barchart.com/stocks/quotes/MSFT/options");
        assert_eq!(exp.capture, EXPIRATIONS_CAPTURE);
    }

    #[test]
    fn base_url_with_path_prefix() {
        let src = BarchartSource::new(
            "http://127.0.0.1:8080/mirror/",
            Duration::from_secs(1),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(
            src.request(&ScrapeKey::quote("AAPL").unwrap()).url,
            "http://127.0.0.1:8080/mirror/stocks/quotes/AAPL/overview"
        );
    }

    #[test]
    fn invalid_base_url_rejected() {
        assert!(BarchartSource::new("not a url", Duration::ZERO, Duration::ZERO).is_err());
    }
}
