//! Record Parser: turns a captured upstream body into a typed [`Record`].
//!
//! Parsing is pure. A body that cannot be interpreted produces a
//! [`ParseError`]; the parser never returns a partially filled record.
//!
//! Field access goes through [`Item`], which looks at the formatted value
//! first and falls back to the item's nested `raw` object when the formatted
//! value is absent or unparseable.

mod chain;
mod expirations;
mod numeric;
mod quote;

use {
    chrono::NaiveDate,
    rust_decimal::Decimal,
    serde_json::{Map, Value},
    thiserror::Error,
};

use crate::{key::ScrapeKind, record::Record};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
    #[error("field `{field}` is not a date: {value}")]
    InvalidDate { field: &'static str, value: String },
    #[error("unknown option type {0:?}")]
    UnknownOptionType(String),
    #[error("duplicate {side} at strike {strike}")]
    DuplicateStrike { strike: Decimal, side: &'static str },
}

/// Parse a captured body for the given kind.
///
/// The body may be wrapped in a `{"data": ...}` envelope or be the bare
/// payload.
pub fn parse(kind: ScrapeKind, body: &str) -> Result<Record, ParseError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let payload = unwrap_envelope(value);
    match kind {
        ScrapeKind::Quote => quote::parse(&payload).map(Record::Quote),
        ScrapeKind::Expirations => expirations::parse(&payload).map(Record::Expirations),
        ScrapeKind::Chain => chain::parse(&payload).map(Record::Chain),
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        },
        other => other,
    }
}

/// A single upstream item with formatted fields and an optional `raw` twin.
pub(crate) struct Item<'a> {
    fields: &'a Map<String, Value>,
    raw: Option<&'a Map<String, Value>>,
}

impl<'a> Item<'a> {
    pub(crate) fn new(value: &'a Value) -> Result<Self, ParseError> {
        let fields = value
            .as_object()
            .ok_or_else(|| ParseError::UnexpectedShape(format!("expected object, got {value}")))?;
        let raw = fields.get("raw").and_then(Value::as_object);
        Ok(Self { fields, raw })
    }

    /// Candidate values for `names`, formatted before raw.
    fn candidates(&self, names: &[&str]) -> Vec<&'a Value> {
        let mut found = Vec::new();
        for source in std::iter::once(self.fields).chain(self.raw) {
            for name in names {
                if let Some(v) = source.get(*name).filter(|v| !v.is_null()) {
                    found.push(v);
                }
            }
        }
        found
    }

    pub(crate) fn text(&self, names: &[&str]) -> Option<String> {
        self.candidates(names).into_iter().find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// A nullable decimal: unparseable values become `None`.
    pub(crate) fn decimal(&self, names: &[&str]) -> Option<Decimal> {
        self.candidates(names)
            .into_iter()
            .find_map(|v| numeric::decimal(v).ok().flatten())
    }

    /// A required decimal.
    pub(crate) fn required_decimal(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<Decimal, ParseError> {
        let candidates = self.candidates(names);
        let first = candidates.first().copied();
        for v in candidates {
            if let Ok(Some(d)) = numeric::decimal(v) {
                return Ok(d);
            }
        }
        match first {
            Some(v) if numeric::decimal(v).is_err() => Err(ParseError::NotNumeric {
                field,
                value: v.to_string(),
            }),
            _ => Err(ParseError::MissingField(field)),
        }
    }

    /// A count that defaults to zero when absent and fails the record when
    /// present but not a non-negative integer.
    pub(crate) fn count(&self, field: &'static str, names: &[&str]) -> Result<u64, ParseError> {
        let candidates = self.candidates(names);
        let mut rejected = None;
        for v in &candidates {
            match numeric::count(v) {
                Ok(Some(n)) => return Ok(n),
                Ok(None) => {},
                Err(e) => {
                    rejected.get_or_insert(e.0);
                },
            }
        }
        match rejected {
            Some(value) => Err(ParseError::NotNumeric { field, value }),
            None => Ok(0),
        }
    }

    pub(crate) fn date(
        &self,
        field: &'static str,
        names: &[&str],
    ) -> Result<(NaiveDate, bool), ParseError> {
        let text = self.text(names).ok_or(ParseError::MissingField(field))?;
        parse_date(&text).ok_or(ParseError::InvalidDate { field, value: text })
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD-w` and `MM/DD/YY[YY]`. The flag reports
/// the weekly suffix.
fn parse_date(text: &str) -> Option<(NaiveDate, bool)> {
    let (body, weekly) = match text.strip_suffix("-w") {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(body, fmt).ok())
        .map(|d| (d, weekly))
}
