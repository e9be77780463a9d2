//! Cache and coalescing identity of a scrape request.

use std::{fmt, str::FromStr};

use {
    chrono::NaiveDate,
    serde::{Serialize, Serializer},
    thiserror::Error,
};

use crate::symbol::{InvalidSymbol, Symbol, normalize};

/// Which upstream view a scrape targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeKind {
    Quote,
    Expirations,
    Chain,
}

impl ScrapeKind {
    pub const ALL: [ScrapeKind; 3] = [Self::Quote, Self::Expirations, Self::Chain];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Expirations => "expirations",
            Self::Chain => "chain",
        }
    }
}

impl fmt::Display for ScrapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quote" => Ok(Self::Quote),
            "expirations" | "expiration" | "expiries" => Ok(Self::Expirations),
            "chain" | "options" => Ok(Self::Chain),
            other => Err(format!(
                "unknown scrape kind {other:?} (expected quote, expirations or chain)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expiration {0:?}: expected YYYY-MM-DD, optionally suffixed with -w")]
pub struct InvalidExpiration(pub String);

/// An option expiration date. Weekly series carry a `-w` suffix upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Expiration {
    pub date: NaiveDate,
    pub weekly: bool,
}

impl Expiration {
    pub fn monthly(date: NaiveDate) -> Self {
        Self {
            date,
            weekly: false,
        }
    }

    pub fn weekly(date: NaiveDate) -> Self {
        Self { date, weekly: true }
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))?;
        if self.weekly {
            f.write_str("-w")?;
        }
        Ok(())
    }
}

impl FromStr for Expiration {
    type Err = InvalidExpiration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (date_part, weekly) = match trimmed
            .strip_suffix("-w")
            .or_else(|| trimmed.strip_suffix("-W"))
        {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|_| InvalidExpiration(s.to_string()))?;
        Ok(Self { date, weekly })
    }
}

impl Serialize for Expiration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity of a logical scrape. Two requests with equal keys are
/// interchangeable: they share cache entries and in-flight work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScrapeKey {
    pub kind: ScrapeKind,
    pub symbol: Symbol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
}

impl ScrapeKey {
    /// Build a key from raw user input. The expiration only participates in
    /// chain keys and is dropped for other kinds.
    pub fn new(
        kind: ScrapeKind,
        symbol: &str,
        expiration: Option<Expiration>,
    ) -> Result<Self, InvalidSymbol> {
        let symbol = normalize(symbol)?;
        Ok(Self::from_symbol(kind, symbol, expiration))
    }

    pub fn from_symbol(kind: ScrapeKind, symbol: Symbol, expiration: Option<Expiration>) -> Self {
        let expiration = match kind {
            ScrapeKind::Chain => expiration,
            ScrapeKind::Quote | ScrapeKind::Expirations => None,
        };
        Self {
            kind,
            symbol,
            expiration,
        }
    }

    pub fn quote(symbol: &str) -> Result<Self, InvalidSymbol> {
        Self::new(ScrapeKind::Quote, symbol, None)
    }

    pub fn expirations(symbol: &str) -> Result<Self, InvalidSymbol> {
        Self::new(ScrapeKind::Expirations, symbol, None)
    }

    pub fn chain(symbol: &str, expiration: Option<Expiration>) -> Result<Self, InvalidSymbol> {
        Self::new(ScrapeKind::Chain, symbol, expiration)
    }
}

impl fmt::Display for ScrapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.symbol)?;
        if let Some(expiration) = &self.expiration {
            write!(f, "@{expiration}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::collections::HashSet};

    #[test]
    fn expiration_round_trips_weekly_suffix() {
        let monthly: Expiration = "2026-01-16".parse().unwrap();
        assert!(!monthly.weekly);
        assert_eq!(monthly.to_string(), "2026-01-16");

        let weekly: Expiration = "2026-01-09-w".parse().unwrap();
        assert!(weekly.weekly);
        assert_eq!(weekly.date, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
        assert_eq!(weekly.to_string(), "2026-01-09-w");
    }

    #[test]
    fn expiration_rejects_garbage() {
        assert!("2026-13-40".parse::<Expiration>().is_err());
        assert!("next friday".parse::<Expiration>().is_err());
        assert!("".parse::<Expiration>().is_err());
    }

    #[test]
    fn keys_normalize_symbol() {
        let a = ScrapeKey::quote(" aapl ").unwrap();
        let b = ScrapeKey::quote("AAPL").unwrap();
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn expiration_only_kept_for_chains() {
        let exp: Expiration = "2026-01-16".parse().unwrap();
        let quote = ScrapeKey::new(ScrapeKind::Quote, "AAPL", Some(exp)).unwrap();
        assert_eq!(quote.expiration, None);
        assert_eq!(quote, ScrapeKey::quote("AAPL").unwrap());

        let chain = ScrapeKey::chain("AAPL", Some(exp)).unwrap();
        assert_eq!(chain.expiration, Some(exp));
        assert_ne!(chain, ScrapeKey::chain("AAPL", None).unwrap());
    }

    #[test]
    fn kinds_are_distinct_identities() {
        let quote = ScrapeKey::quote("AAPL").unwrap();
        let expirations = ScrapeKey::expirations("AAPL").unwrap();
        assert_ne!(quote, expirations);
    }

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("Chain".parse::<ScrapeKind>().unwrap(), ScrapeKind::Chain);
        assert_eq!("options".parse::<ScrapeKind>().unwrap(), ScrapeKind::Chain);
        assert_eq!(
            "expirations".parse::<ScrapeKind>().unwrap(),
            ScrapeKind::Expirations
        );
        assert!("greeks".parse::<ScrapeKind>().is_err());
    }

    #[test]
    fn display_includes_expiration() {
        let key = ScrapeKey::chain("$spx", Some("2026-01-09-w".parse().unwrap())).unwrap();
        assert_eq!(key.to_string(), "chain:$SPX@2026-01-09-w");
    }
}
