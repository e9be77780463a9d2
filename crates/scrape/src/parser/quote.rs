use serde_json::Value;

use {
    super::{Item, ParseError},
    crate::record::Quote,
};

pub(super) fn parse(payload: &Value) -> Result<Quote, ParseError> {
    let value = match payload {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| ParseError::UnexpectedShape("quote list is empty".into()))?,
        other => other,
    };
    let item = Item::new(value)?;

    let symbol = item
        .text(&["symbol"])
        .ok_or(ParseError::MissingField("symbol"))?;

    Ok(Quote {
        symbol,
        name: item.text(&["symbolName", "name"]),
        last_price: item.decimal(&["lastPrice"]),
        price_change: item.decimal(&["priceChange"]),
        percent_change: item.decimal(&["percentChange"]),
        open: item.decimal(&["openPrice", "open"]),
        high: item.decimal(&["highPrice", "high"]),
        low: item.decimal(&["lowPrice", "low"]),
        volume: item.decimal(&["volume"]),
        high_52w: item.decimal(&["highPrice1y", "fiftyTwoWeekHigh"]),
        low_52w: item.decimal(&["lowPrice1y", "fiftyTwoWeekLow"]),
    })
}
