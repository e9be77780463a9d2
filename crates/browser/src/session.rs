//! The narrow seam between the pool and whatever drives a browser.

use async_trait::async_trait;

use crate::{
    error::BrowserError,
    types::{FetchRequest, RawPage},
};

/// One browser execution context, lent to a single caller at a time.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and capture the requested response.
    async fn fetch(&mut self, request: &FetchRequest) -> Result<RawPage, BrowserError>;

    /// Tear down the underlying browser. Called once, when the pool
    /// discards the session.
    async fn close(&mut self);
}

/// Creates sessions for the pool.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self, session_id: &str) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
