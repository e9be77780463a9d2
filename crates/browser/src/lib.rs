//! Pooled headless Chrome/Chromium sessions driven over CDP.
//!
//! The pool bounds how many browser processes exist at once and lends each
//! session to exactly one scrape at a time. Everything outside this crate
//! sees a session only through [`BrowserSession::fetch`]: navigate to a page,
//! capture the internal API response the page issues, and hand back the raw
//! bytes. Tests substitute a [`SessionFactory`] that never starts a browser.
//!
//! # Example
//!
//! ```ignore
//! use chainscope_browser::{BrowserConfig, ChromiumFactory, FetchRequest, SessionPool};
//!
//! let config = BrowserConfig::default();
//! let pool = SessionPool::new(Arc::new(ChromiumFactory::new(config.clone())), (&config).into()).await?;
//!
//! let mut handle = pool.acquire(Duration::from_secs(30)).await?;
//! let page = handle.fetch(&request).await;
//! pool.release(handle, page.is_ok()).await;
//! ```

pub mod chromium;
pub mod detect;
pub mod error;
pub mod pool;
pub mod session;
pub mod types;

pub use {
    chromium::ChromiumFactory,
    error::BrowserError,
    pool::{PoolConfig, PoolStats, SessionHandle, SessionPool},
    session::{BrowserSession, SessionFactory},
    types::{BrowserConfig, CapturedResponse, FetchRequest, RawPage},
};
