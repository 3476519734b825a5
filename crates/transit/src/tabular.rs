//! Delimited text parsing for scheduling feeds and ridership logs.

use std::collections::HashMap;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::models::types::Result;
use crate::ridership::RidershipAccumulator;

/// One row keyed by column header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Column value, or "" when the column is absent
    pub fn field(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Non-empty column value
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty())
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.non_empty(column)?.parse().ok()
    }

    pub fn get_u32(&self, column: &str) -> Option<u32> {
        self.non_empty(column)?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Parse a delimited table whose first line holds the column headers.
///
/// Rows shorter than the header are padded with empty strings; extra
/// trailing fields are ignored.
pub fn parse_delimited(text: &str, delimiter: u8) -> Result<Vec<Record>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(strip_bom(text).as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut records = Vec::new();
    let mut row = StringRecord::new();

    while reader.read_record(&mut row)? {
        let record = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_string()))
            .collect();
        records.push(record);
    }

    Ok(records)
}

/// Comma-delimited scheduling feed table
pub fn parse_feed_table(text: &str) -> Result<Vec<Record>> {
    parse_delimited(text, b',')
}

/// Header-less `date;hour;station;count` ridership log.
///
/// Rows are folded straight into the aggregates instead of being
/// materialized; malformed rows are dropped by the accumulator.
pub fn parse_ridership_log(text: &str) -> Result<RidershipAccumulator> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(strip_bom(text).as_bytes());

    let mut accumulator = RidershipAccumulator::default();
    let mut row = StringRecord::new();

    while reader.read_record(&mut row)? {
        if row.len() < 4 {
            continue;
        }
        accumulator.push(&row[0], &row[1], &row[2], &row[3]);
    }

    tracing::debug!(
        "ridership log: {} stations over {} dates",
        accumulator.station_count(),
        accumulator.date_count()
    );

    Ok(accumulator)
}
