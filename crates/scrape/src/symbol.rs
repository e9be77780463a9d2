//! Ticker symbol normalization.

use std::fmt;

use {serde::Serialize, thiserror::Error};

/// Prefix markers the upstream uses for indices and similar instruments.
const PREFIX_MARKERS: &[char] = &['$', '^'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSymbol {
    #[error("symbol is empty")]
    Empty,
    #[error("symbol contains a control character")]
    ControlCharacter,
    #[error("symbol contains whitespace: {0:?}")]
    Whitespace(String),
}

/// A normalized ticker symbol. Only [`normalize`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the symbol carries an index prefix such as `$SPX`.
    pub fn is_index(&self) -> bool {
        self.0.starts_with(PREFIX_MARKERS)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize user input: trim, upper-case, keep a leading prefix marker.
///
/// Input that cannot be a symbol is rejected rather than repaired.
pub fn normalize(raw: &str) -> Result<Symbol, InvalidSymbol> {
    let trimmed = raw.trim();
    if trimmed.chars().any(char::is_control) {
        return Err(InvalidSymbol::ControlCharacter);
    }

    let (prefix, body) = match trimmed.chars().next() {
        Some(c) if PREFIX_MARKERS.contains(&c) => trimmed.split_at(c.len_utf8()),
        _ => ("", trimmed),
    };
    if body.is_empty() {
        return Err(InvalidSymbol::Empty);
    }
    if body.chars().any(char::is_whitespace) {
        return Err(InvalidSymbol::Whitespace(trimmed.to_string()));
    }

    Ok(Symbol(format!("{prefix}{}", body.to_uppercase())))
}
