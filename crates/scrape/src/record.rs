//! Typed records produced by the parser.

use {chrono::NaiveDate, rust_decimal::Decimal, serde::Serialize};

use crate::key::ScrapeKind;

/// Summary quote for an underlying. Every numeric field is nullable because
/// the upstream omits values outside trading hours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    pub last_price: Option<Decimal>,
    pub price_change: Option<Decimal>,
    pub percent_change: Option<Decimal>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub high_52w: Option<Decimal>,
    pub low_52w: Option<Decimal>,
}

/// One listed expiration with aggregate activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpirationEntry {
    pub date: NaiveDate,
    pub weekly: bool,
    pub options_count: u64,
    pub calls_volume: u64,
    pub puts_volume: u64,
    pub calls_open_interest: u64,
    pub puts_open_interest: u64,
}

/// One side (call or put) of a strike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionSide {
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub change: Option<Decimal>,
    pub implied_volatility: Option<Decimal>,
    pub volume: u64,
    pub open_interest: u64,
    pub last_trade: Option<String>,
}

/// A strike with its call and put. A side the upstream did not list is
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRow {
    pub strike: Decimal,
    pub call: Option<OptionSide>,
    pub put: Option<OptionSide>,
}

/// Parsed result of a single scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Quote(Quote),
    Expirations(Vec<ExpirationEntry>),
    /// Sorted by ascending strike, strikes unique.
    Chain(Vec<ChainRow>),
}

impl Record {
    pub fn kind(&self) -> ScrapeKind {
        match self {
            Self::Quote(_) => ScrapeKind::Quote,
            Self::Expirations(_) => ScrapeKind::Expirations,
            Self::Chain(_) => ScrapeKind::Chain,
        }
    }

    /// Number of data points: one for a quote, otherwise the row count.
    pub fn len(&self) -> usize {
        match self {
            Self::Quote(_) => 1,
            Self::Expirations(entries) => entries.len(),
            Self::Chain(rows) => rows.len(),
        }
    }

    /// True when the upstream had no data for the request.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
