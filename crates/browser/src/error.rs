//! Browser error types.

use thiserror::Error;

/// Errors that can occur while launching or driving a browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not available: {0}")]
    BrowserNotAvailable(String),

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("no browser session available: {0}")]
    SessionUnavailable(String),

    #[error("session pool is shut down")]
    PoolClosed,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("failed to read response body: {0}")]
    ResponseBody(String),

    #[error("CDP error: {0}")]
    Cdp(String),
}

impl BrowserError {
    /// Whether the underlying browser connection is gone, so the session
    /// must not be reused.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::ConnectionClosed(_) => true,
            Self::Cdp(msg) | Self::NavigationFailed(msg) => {
                msg.contains("AlreadyClosed") || msg.contains("ConnectionClosed")
            },
            _ => false,
        }
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}
