//! Option chain payloads.
//!
//! The upstream emits one of three layouts:
//!
//! - grouped by side: `{"Call": [..], "Put": [..]}`
//! - side-by-side, keyed by strike: `{"180.00": [call, put], ...}`
//! - a flat list of items
//!
//! Every item names its side through `optionType`, except in the grouped
//! layout where the group decides.

use std::collections::BTreeMap;

use {rust_decimal::Decimal, serde_json::Value};

use {
    super::{Item, ParseError, numeric},
    crate::record::{ChainRow, OptionSide},
};

const STRIKE_FIELDS: &[&str] = &["strikePrice", "strike"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Call,
    Put,
}

impl Side {
    fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(Self::Call),
            "put" | "p" => Ok(Self::Put),
            _ => Err(ParseError::UnknownOptionType(raw.to_string())),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

#[derive(Default)]
struct Strike {
    call: Option<OptionSide>,
    put: Option<OptionSide>,
}

#[derive(Default)]
struct Rows(BTreeMap<Decimal, Strike>);

impl Rows {
    fn insert(&mut self, strike: Decimal, side: Side, data: OptionSide) -> Result<(), ParseError> {
        let entry = self.0.entry(strike.normalize()).or_default();
        let slot = match side {
            Side::Call => &mut entry.call,
            Side::Put => &mut entry.put,
        };
        if slot.is_some() {
            return Err(ParseError::DuplicateStrike {
                strike: strike.normalize(),
                side: side.label(),
            });
        }
        *slot = Some(data);
        Ok(())
    }

    fn into_rows(self) -> Vec<ChainRow> {
        self.0
            .into_iter()
            .map(|(strike, s)| ChainRow {
                strike,
                call: s.call,
                put: s.put,
            })
            .collect()
    }
}

pub(super) fn parse(payload: &Value) -> Result<Vec<ChainRow>, ParseError> {
    let mut rows = Rows::default();
    match payload {
        Value::Null => {},
        Value::Array(items) => {
            for value in items {
                let item = Item::new(value)?;
                let strike = item.required_decimal("strike", STRIKE_FIELDS)?;
                rows.insert(strike, side_of(&item)?, option_side(&item)?)?;
            }
        },
        Value::Object(map) if map.contains_key("Call") || map.contains_key("Put") => {
            for (group, side) in [("Call", Side::Call), ("Put", Side::Put)] {
                for value in list(map.get(group))? {
                    let item = Item::new(value)?;
                    let strike = item.required_decimal("strike", STRIKE_FIELDS)?;
                    rows.insert(strike, side, option_side(&item)?)?;
                }
            }
        },
        Value::Object(by_strike) => {
            let mut seen = BTreeMap::new();
            for (key, group) in by_strike {
                let strike = numeric::decimal_str(key)
                    .ok()
                    .flatten()
                    .ok_or_else(|| ParseError::NotNumeric {
                        field: "strike",
                        value: key.clone(),
                    })?;
                // "180" and "180.00" name the same strike.
                if let Some(previous) = seen.insert(strike.normalize(), key) {
                    return Err(ParseError::UnexpectedShape(format!(
                        "strike keys {previous:?} and {key:?} collide"
                    )));
                }
                for value in list(Some(group))? {
                    let item = Item::new(value)?;
                    rows.insert(strike, side_of(&item)?, option_side(&item)?)?;
                }
            }
        },
        other => {
            return Err(ParseError::UnexpectedShape(format!(
                "expected chain object or list, got {other}"
            )));
        },
    }
    Ok(rows.into_rows())
}

/// A group may be a list of items or a single item.
fn list(value: Option<&Value>) -> Result<Vec<&Value>, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(item @ Value::Object(_)) => Ok(vec![item]),
        Some(other) => Err(ParseError::UnexpectedShape(format!(
            "expected option item, got {other}"
        ))),
    }
}

fn side_of(item: &Item<'_>) -> Result<Side, ParseError> {
    let raw = item
        .text(&["optionType"])
        .ok_or(ParseError::MissingField("optionType"))?;
    Side::parse(&raw)
}

fn option_side(item: &Item<'_>) -> Result<OptionSide, ParseError> {
    Ok(OptionSide {
        last: item.decimal(&["lastPrice"]),
        bid: item.decimal(&["bidPrice"]),
        ask: item.decimal(&["askPrice"]),
        change: item.decimal(&["priceChange"]),
        implied_volatility: item.decimal(&["volatility"]),
        volume: item.count("volume", &["volume"])?,
        open_interest: item.count("openInterest", &["openInterest"])?,
        last_trade: item.text(&["tradeTime"]),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    fn strikes(rows: &[ChainRow]) -> Vec<String> {
        rows.iter().map(|r| r.strike.to_string()).collect()
    }

    #[test]
    fn grouped_layout_pairs_sides_by_strike() {
        let rows = parse(&json!({
            "Call": [
                {"strikePrice": "185.00", "lastPrice": "3.10", "volume": "1,020", "openInterest": "5,400"},
                {"strikePrice": "180.00", "lastPrice": "6.25", "bidPrice": "6.20", "askPrice": "6.30"}
            ],
            "Put": [
                {"strikePrice": "180.00", "lastPrice": "1.05", "volatility": "24.31%"}
            ]
        }))
        .unwrap();

        assert_eq!(strikes(&rows), vec!["180", "185"]);
        let first = &rows[0];
        assert_eq!(first.call.as_ref().unwrap().bid, Some(Decimal::new(620, 2)));
        assert_eq!(
            first.put.as_ref().unwrap().implied_volatility,
            Some(Decimal::new(2431, 2))
        );
        let second = &rows[1];
        assert!(second.put.is_none());
        assert_eq!(second.call.as_ref().unwrap().volume, 1020);
        assert_eq!(second.call.as_ref().unwrap().open_interest, 5400);
    }

    #[test]
    fn side_by_side_layout_uses_keys_as_strikes() {
        let rows = parse(&json!({
            "190.00": [
                {"optionType": "Call", "lastPrice": "1.00"},
                {"optionType": "Put", "lastPrice": "9.00"}
            ],
            "1,000.00": {"optionType": "Put", "lastPrice": "800.00"}
        }))
        .unwrap();

        assert_eq!(strikes(&rows), vec!["190", "1000"]);
        assert!(rows[1].call.is_none());
        assert_eq!(rows[1].put.as_ref().unwrap().last, Some(Decimal::from(800)));
    }

    #[test]
    fn flat_list_layout() {
        let rows = parse(&json!([
            {"strikePrice": 200, "optionType": "Put", "lastPrice": 4.5},
            {"strikePrice": 195, "optionType": "Call", "lastPrice": 8.0,
             "raw": {"volume": 12, "tradeTime": 1767225600}, "tradeTime": "01/01/26"}
        ]))
        .unwrap();

        assert_eq!(strikes(&rows), vec!["195", "200"]);
        let call = rows[0].call.as_ref().unwrap();
        assert_eq!(call.volume, 12);
        assert_eq!(call.last_trade.as_deref(), Some("01/01/26"));
    }

    #[test]
    fn duplicate_side_at_one_strike_is_rejected() {
        let err = parse(&json!({
            "Call": [
                {"strikePrice": "180.00", "lastPrice": "6.25"},
                {"strikePrice": "180", "lastPrice": "6.30"}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::DuplicateStrike { side: "call", .. }));
    }

    #[test]
    fn colliding_strike_keys_are_rejected() {
        let err = parse(&json!({
            "180": {"optionType": "Call"},
            "180.00": {"optionType": "Put"}
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedShape(_)));
    }

    #[test]
    fn missing_strike_fails_the_record() {
        let err = parse(&json!([{"optionType": "Call", "lastPrice": "1.00"}])).unwrap_err();
        assert_eq!(err, ParseError::MissingField("strike"));
    }

    #[test]
    fn unknown_option_type_fails_the_record() {
        let err = parse(&json!([{"strikePrice": 1, "optionType": "Straddle"}])).unwrap_err();
        assert!(matches!(err, ParseError::UnknownOptionType(_)));
    }

    #[test]
    fn empty_chain_is_a_valid_result() {
        assert!(parse(&json!({"Call": [], "Put": []})).unwrap().is_empty());
        assert!(parse(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn side_by_side_rows_are_sorted_numerically() {
        let rows = parse(&json!({
            "95": {"optionType": "Call"},
            "100": {"optionType": "Call"},
            "97.5": {"optionType": "Call"}
        }))
        .unwrap();
        assert_eq!(strikes(&rows), vec!["95", "97.5", "100"]);
    }
}
