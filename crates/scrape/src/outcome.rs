//! Failure taxonomy shared by every layer.

use std::{fmt, sync::Arc};

use {serde::Serialize, thiserror::Error};

use crate::{record::Record, symbol::InvalidSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The attempt or the caller's deadline elapsed.
    Timeout,
    /// The upstream served a block, captcha or 429.
    UpstreamRateLimited,
    /// The page loaded but its payload could not be turned into a record.
    UpstreamMalformed,
    /// No healthy browser session could be obtained or kept.
    SessionUnavailable,
    /// The caller passed a symbol that cannot be normalized.
    InvalidSymbol,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::UpstreamRateLimited => "upstream_rate_limited",
            Self::UpstreamMalformed => "upstream_malformed",
            Self::SessionUnavailable => "session_unavailable",
            Self::InvalidSymbol => "invalid_symbol",
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::SessionUnavailable)
    }

    /// Status an HTTP surface should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidSymbol => 400,
            Self::UpstreamRateLimited | Self::SessionUnavailable => 503,
            Self::UpstreamMalformed => 502,
            Self::Timeout => 504,
        }
    }

    /// Process exit code for the command-line surface.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::InvalidSymbol => 2,
            Self::Timeout => 3,
            Self::UpstreamRateLimited => 4,
            Self::UpstreamMalformed => 5,
            Self::SessionUnavailable => 6,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified scrape failure. Cloneable so one outcome can be handed to
/// every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {detail}")]
pub struct ScrapeFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ScrapeFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::UpstreamRateLimited, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::UpstreamMalformed, detail)
    }

    pub fn session_unavailable(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::SessionUnavailable, detail)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<InvalidSymbol> for ScrapeFailure {
    fn from(err: InvalidSymbol) -> Self {
        Self::new(FailureKind::InvalidSymbol, err.to_string())
    }
}

/// Result of resolving a key. Records are shared, never copied per caller.
pub type ScrapeOutcome = Result<Arc<Record>, ScrapeFailure>;
