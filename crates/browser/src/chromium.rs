//! Chromium sessions launched and driven through chromiumoxide.

use std::time::{Duration, Instant};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    chromiumoxide::{
        Browser, BrowserConfig as CdpBrowserConfig, Page,
        cdp::browser_protocol::network::{
            EnableParams, EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
        },
        handler::viewport::Viewport,
    },
    futures::StreamExt,
    tokio::{task::JoinHandle, time::timeout},
    tracing::{debug, info, warn},
};

use crate::{
    detect::detect_browser,
    error::BrowserError,
    session::{BrowserSession, SessionFactory},
    types::{BrowserConfig, CapturedResponse, FetchRequest, RawPage},
};

/// Launch flags needed to run headless inside containers and to look like
/// an ordinary desktop browser.
const BASE_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-features=dbus",
    "--disable-blink-features=AutomationControlled",
];

/// Launches one Chromium process per session.
pub struct ChromiumFactory {
    config: BrowserConfig,
}

impl ChromiumFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn cdp_config(&self) -> Result<CdpBrowserConfig, BrowserError> {
        let detection = detect_browser(self.config.chrome_path.as_deref());
        let Some(executable) = detection.path else {
            return Err(BrowserError::BrowserNotAvailable(detection.install_hint));
        };

        let mut builder = CdpBrowserConfig::builder();

        // chromiumoxide runs headless unless asked for a head.
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .chrome_executable(executable)
            .viewport(Viewport {
                width: self.config.viewport_width,
                height: self.config.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(self.config.navigation_timeout_ms))
            .arg(format!("--user-agent={}", self.config.user_agent()))
            .arg(format!(
                "--window-size={},{}",
                self.config.viewport_width, self.config.viewport_height
            ));

        for arg in BASE_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        builder.build().map_err(|e| {
            BrowserError::LaunchFailed(format!("failed to build browser config: {e}"))
        })
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn launch(&self, session_id: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let config = self.cdp_config()?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // The handler must be polled for the CDP connection to make progress.
        let sid = session_id.to_string();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(session_id = sid, error = %e, "browser handler error");
                }
            }
            debug!(session_id = sid, "browser event handler exited");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("failed to open page: {e}")))?;
        page.execute(EnableParams::default()).await?;

        info!(
            session_id,
            headless = self.config.headless,
            "launched browser session"
        );

        Ok(Box::new(ChromiumSession {
            id: session_id.to_string(),
            navigation_timeout: Duration::from_millis(self.config.navigation_timeout_ms),
            browser,
            page,
            handler_task,
        }))
    }
}

/// A single Chromium process with one reusable tab.
pub struct ChromiumSession {
    id: String,
    navigation_timeout: Duration,
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    async fn read_body(&self, request_id: RequestId) -> Result<String, BrowserError> {
        let reply = self
            .page
            .execute(GetResponseBodyParams::new(request_id))
            .await
            .map_err(|e| BrowserError::ResponseBody(e.to_string()))?;
        let body = &reply.result;
        if body.base64_encoded {
            let bytes = BASE64
                .decode(body.body.as_bytes())
                .map_err(|e| BrowserError::ResponseBody(format!("invalid base64 body: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(body.body.clone())
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn fetch(&mut self, request: &FetchRequest) -> Result<RawPage, BrowserError> {
        validate_url(&request.url)?;

        // Subscribe before navigating so no response event is missed.
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;

        let nav_start = Instant::now();
        match timeout(self.navigation_timeout, self.page.goto(request.url.as_str())).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => {
                let err = BrowserError::NavigationFailed(e.to_string());
                if err.is_connection_lost() {
                    return Err(BrowserError::ConnectionClosed(e.to_string()));
                }
                return Err(err);
            },
            Err(_) => {
                // The load event can hang on pages with long-polling; the
                // capture below decides whether the page is usable.
                warn!(
                    session_id = self.id,
                    url = request.url,
                    "load event not observed, continuing"
                );
            },
        }

        #[cfg(feature = "metrics")]
        chainscope_metrics::histogram!(chainscope_metrics::browser::NAVIGATION_DURATION_SECONDS)
            .record(nav_start.elapsed().as_secs_f64());

        let mut document_status = None;
        let mut capture = None;
        let deadline = tokio::time::Instant::now() + request.capture_wait;
        loop {
            let event = match tokio::time::timeout_at(deadline, responses.next()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(BrowserError::ConnectionClosed(
                        "response event stream ended".into(),
                    ));
                },
                Err(_) => break,
            };
            let status = u16::try_from(event.response.status).unwrap_or_default();
            if document_status.is_none() && event.r#type == ResourceType::Document {
                document_status = Some(status);
            }
            if event.response.url.contains(&request.capture) {
                debug!(
                    session_id = self.id,
                    url = event.response.url,
                    status,
                    "captured upstream response"
                );
                capture = Some((event.request_id.clone(), event.response.url.clone(), status));
                break;
            }
        }

        let captured = match capture {
            Some((request_id, url, status)) => {
                tokio::time::sleep(request.settle).await;
                let body = self.read_body(request_id).await?;
                Some(CapturedResponse { url, status, body })
            },
            None => None,
        };

        let html = self.page.content().await.ok();
        let final_url = self.page.url().await.ok().flatten().unwrap_or_default();

        info!(
            session_id = self.id,
            url = final_url,
            captured = captured.is_some(),
            elapsed_ms = nav_start.elapsed().as_millis() as u64,
            "fetched page"
        );

        Ok(RawPage {
            final_url,
            document_status,
            html,
            captured,
        })
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(session_id = self.id, error = %e, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!(session_id = self.id, "closed browser session");
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Reject anything that is not an absolute http(s) URL.
fn validate_url(raw: &str) -> Result<(), BrowserError> {
    let parsed = url::Url::parse(raw).map_err(|e| BrowserError::InvalidUrl(format!("{raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(BrowserError::InvalidUrl(format!(
            "unsupported scheme {other:?} in {raw}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_https() {
        assert!(validate_url("https://www.barchart.com/stocks/quotes/AAPL/options").is_ok());
    }

    #[test]
    fn validate_url_rejects_other_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(BrowserError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(BrowserError::InvalidUrl(_))
        ));
    }

    #[test]
    fn base_args_disable_automation_flag() {
        assert!(BASE_ARGS.contains(&"--disable-blink-features=AutomationControlled"));
        assert!(BASE_ARGS.contains(&"--disable-dev-shm-usage"));
    }
}
