use serde_json::Value;

use {
    super::{Item, ParseError},
    crate::record::ExpirationEntry,
};

pub(super) fn parse(payload: &Value) -> Result<Vec<ExpirationEntry>, ParseError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ParseError::UnexpectedShape(format!(
                "expected expiration list, got {}",
                kind_of(other)
            )));
        },
    };

    let mut entries = items.iter().map(entry).collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.weekly.cmp(&b.weekly)));
    Ok(entries)
}

fn entry(value: &Value) -> Result<ExpirationEntry, ParseError> {
    let item = Item::new(value)?;
    let (date, suffixed) = item.date("date", &["date", "expirationDate"])?;
    let weekly = suffixed
        || item
            .text(&["expirationType"])
            .is_some_and(|t| t.eq_ignore_ascii_case("weekly"));

    // optionsCount is required: an entry without it is not an expiration row.
    let options_count = match item.count("optionsCount", &["optionsCount"])? {
        0 if item.text(&["optionsCount"]).is_none() => {
            return Err(ParseError::MissingField("optionsCount"));
        },
        n => n,
    };

    Ok(ExpirationEntry {
        date,
        weekly,
        options_count,
        calls_volume: item.count("callsVolume", &["callsVolume", "callVolume"])?,
        puts_volume: item.count("putsVolume", &["putsVolume", "putVolume"])?,
        calls_open_interest: item.count("callsOpenInterest", &[
            "callsOpenInterest",
            "callOpenInterest",
        ])?,
        puts_open_interest: item.count("putsOpenInterest", &[
            "putsOpenInterest",
            "putOpenInterest",
        ])?,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
