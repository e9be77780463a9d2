//! JSON and CSV rendering of resolved records.

use std::io::Write;

use {
    chainscope_scrape::{
        CacheEntry, ChainRow, ExpirationEntry, OptionSide, Quote, Record, ScrapeFailure,
        ScrapeKey,
    },
    clap::ValueEnum,
    rust_decimal::Decimal,
    serde_json::{Value, json},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Csv,
}

/// `{success, symbol, kind, expiration, count, fetched_at, data}`
pub fn success_envelope(entry: &CacheEntry) -> Value {
    json!({
        "success": true,
        "symbol": entry.key.symbol,
        "kind": entry.key.kind,
        "expiration": entry.key.expiration,
        "count": entry.value.len(),
        "fetched_at": entry.fetched_at_utc.to_rfc3339(),
        "data": &*entry.value,
    })
}

pub fn failure_envelope(key: &ScrapeKey, failure: &ScrapeFailure) -> Value {
    json!({
        "success": false,
        "symbol": key.symbol,
        "kind": key.kind,
        "expiration": key.expiration,
        "error": {
            "kind": failure.kind,
            "status": failure.kind.http_status(),
            "detail": failure.detail,
        },
    })
}

const CHAIN_HEADER: [&str; 15] = [
    "Call Latest",
    "Call Bid",
    "Call Ask",
    "Call Change",
    "Call Volume",
    "Call OI",
    "Call IV",
    "Strike",
    "Put Latest",
    "Put Bid",
    "Put Ask",
    "Put Change",
    "Put Volume",
    "Put OI",
    "Put IV",
];

const EXPIRATIONS_HEADER: [&str; 7] = [
    "Expiration",
    "Type",
    "Options",
    "Calls Volume",
    "Puts Volume",
    "Calls OI",
    "Puts OI",
];

const QUOTE_HEADER: [&str; 11] = [
    "Symbol",
    "Name",
    "Last",
    "Change",
    "Percent Change",
    "Open",
    "High",
    "Low",
    "Volume",
    "52W High",
    "52W Low",
];

/// Write `record` as CSV with a header row. Missing values are empty cells.
pub fn write_csv<W: Write>(record: &Record, out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    match record {
        Record::Quote(quote) => {
            writer.write_record(QUOTE_HEADER)?;
            writer.write_record(quote_row(quote))?;
        },
        Record::Expirations(entries) => {
            writer.write_record(EXPIRATIONS_HEADER)?;
            for entry in entries {
                writer.write_record(expiration_row(entry))?;
            }
        },
        Record::Chain(rows) => {
            writer.write_record(CHAIN_HEADER)?;
            for row in rows {
                writer.write_record(chain_row(row))?;
            }
        },
    }
    writer.flush()?;
    Ok(())
}

fn cell(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn quote_row(quote: &Quote) -> Vec<String> {
    vec![
        quote.symbol.clone(),
        quote.name.clone().unwrap_or_default(),
        cell(quote.last_price),
        cell(quote.price_change),
        cell(quote.percent_change),
        cell(quote.open),
        cell(quote.high),
        cell(quote.low),
        cell(quote.volume),
        cell(quote.high_52w),
        cell(quote.low_52w),
    ]
}

fn expiration_row(entry: &ExpirationEntry) -> Vec<String> {
    vec![
        entry.date.to_string(),
        if entry.weekly { "weekly" } else { "monthly" }.to_string(),
        entry.options_count.to_string(),
        entry.calls_volume.to_string(),
        entry.puts_volume.to_string(),
        entry.calls_open_interest.to_string(),
        entry.puts_open_interest.to_string(),
    ]
}

fn side_cells(side: Option<&OptionSide>) -> [String; 7] {
    match side {
        Some(s) => [
            cell(s.last),
            cell(s.bid),
            cell(s.ask),
            cell(s.change),
            s.volume.to_string(),
            s.open_interest.to_string(),
            cell(s.implied_volatility),
        ],
        None => Default::default(),
    }
}

fn chain_row(row: &ChainRow) -> Vec<String> {
    let mut cells = Vec::with_capacity(CHAIN_HEADER.len());
    cells.extend(side_cells(row.call.as_ref()));
    cells.push(format_strike(row.strike));
    cells.extend(side_cells(row.put.as_ref()));
    cells
}

/// Two decimals with thousands separators, e.g. `5,950.00`.
fn format_strike(strike: Decimal) -> String {
    let fixed = format!("{:.2}", strike.round_dp(2));
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{frac}")
}
