//! Numeric cleaning for upstream display strings such as `"1,234"`,
//! `"+0.45"`, `"$12.30"` or `"23.41%"`.

use std::str::FromStr;

use {rust_decimal::Decimal, serde_json::Value};

/// Strings the upstream uses for "no value".
const PLACEHOLDERS: &[&str] = &["", "-", "--", "n/a", "na", "none", "null"];

/// Decoration stripped before parsing.
const DECORATION: &[char] = &[',', '$', '%', '+', '\u{a0}'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NotNumeric(pub String);

/// Parse a JSON value as a decimal.
///
/// `Ok(None)` means the upstream reported no value; `Err` means it reported
/// something that is not a number.
pub(crate) fn decimal(value: &Value) -> Result<Option<Decimal>, NotNumeric> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(Some)
                .map_err(|_| NotNumeric(text))
        },
        Value::String(s) => decimal_str(s),
        other => Err(NotNumeric(other.to_string())),
    }
}

pub(crate) fn decimal_str(raw: &str) -> Result<Option<Decimal>, NotNumeric> {
    let trimmed = raw.trim();
    if PLACEHOLDERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    // "unch" is the upstream's rendering of a zero change.
    if trimmed.eq_ignore_ascii_case("unch") {
        return Ok(Some(Decimal::ZERO));
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !DECORATION.contains(c) && !c.is_whitespace())
        .collect();
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(|d| Some(d.normalize()))
        .map_err(|_| NotNumeric(raw.to_string()))
}

/// Parse a JSON value as a non-negative whole count.
pub(crate) fn count(value: &Value) -> Result<Option<u64>, NotNumeric> {
    let Some(d) = decimal(value)? else {
        return Ok(None);
    };
    if (d.is_sign_negative() && !d.is_zero()) || !d.fract().is_zero() {
        return Err(NotNumeric(value.to_string()));
    }
    u64::try_from(d.trunc())
        .map(Some)
        .map_err(|_| NotNumeric(value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[rstest]
    #[case(json!("1,234"), d("1234"))]
    #[case(json!("+0.45"), d("0.45"))]
    #[case(json!("-1.20"), d("-1.2"))]
    #[case(json!("$12.30"), d("12.3"))]
    #[case(json!("23.41%"), d("23.41"))]
    #[case(json!(" 7 "), d("7"))]
    #[case(json!(180.5), d("180.5"))]
    #[case(json!(42), d("42"))]
    #[case(json!("unch"), d("0"))]
    fn parses_display_numbers(#[case] value: Value, #[case] expected: Decimal) {
        assert_eq!(decimal(&value).unwrap(), Some(expected));
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!(""))]
    #[case(json!("N/A"))]
    #[case(json!("-"))]
    #[case(json!("--"))]
    fn placeholders_are_absent(#[case] value: Value) {
        assert_eq!(decimal(&value).unwrap(), None);
    }

    #[rstest]
    #[case(json!("abc"))]
    #[case(json!("1.2.3"))]
    #[case(json!(true))]
    #[case(json!([1]))]
    fn garbage_is_not_numeric(#[case] value: Value) {
        assert!(decimal(&value).is_err());
    }

    #[test]
    fn counts_accept_grouped_integers() {
        assert_eq!(count(&json!("1,234")).unwrap(), Some(1234));
        assert_eq!(count(&json!("1,234.00")).unwrap(), Some(1234));
        assert_eq!(count(&json!(987)).unwrap(), Some(987));
        assert_eq!(count(&json!("N/A")).unwrap(), None);
    }

    #[test]
    fn counts_reject_negative_and_fractional() {
        assert!(count(&json!("-5")).is_err());
        assert!(count(&json!("12.5")).is_err());
        assert!(count(&json!("lots")).is_err());
    }
}
