//! Ridership aggregation.
//!
//! Reduces a dated, hourly, per-station log to daily averages. Every total
//! is divided by the number of distinct dates seen, so a log covering a
//! week and a log covering a day produce comparable figures.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::identifiers::LineKey;
use crate::models::types::{DateRange, RidershipSummary, StationRidership};

/// Number of stations reported in `busiest_stations`
pub const BUSIEST_STATION_LIMIT: usize = 15;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y%m%d", "%d-%m-%Y"];

/// One raw log row. Fields are kept as text; validation happens on ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RidershipRecord {
    pub date: String,
    pub hour: String,
    pub station: String,
    pub count: String,
}

impl RidershipRecord {
    pub fn new(
        date: impl Into<String>,
        hour: impl Into<String>,
        station: impl Into<String>,
        count: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            hour: hour.into(),
            station: station.into(),
            count: count.into(),
        }
    }
}

/// Running aggregates built in a single pass over the log.
///
/// Stations are keyed by their case-folded name and reported under the
/// first spelling seen. Totals saturate at `u64::MAX`.
#[derive(Clone, Debug, Default)]
pub struct RidershipAccumulator {
    station_totals: HashMap<String, StationTotal>,
    hour_totals: [u64; 24],
    dates: BTreeSet<String>,
}

impl RidershipAccumulator {
    /// Fold one row in. Rows with an unusable count or hour are ignored.
    pub fn push(&mut self, date: &str, hour: &str, station: &str, count: &str) {
        let (Some(hour), Some(count)) = (parse_hour(hour), parse_count(count)) else {
            return;
        };
        let (date, station) = (date.trim(), station.trim());
        if date.is_empty() || station.is_empty() {
            return;
        }

        let total = self
            .station_totals
            .entry(station_key(station))
            .or_insert_with(|| StationTotal {
                name: station.to_string(),
                total: 0,
            });
        total.total = total.total.saturating_add(count);
        self.hour_totals[hour] = self.hour_totals[hour].saturating_add(count);
        if !self.dates.contains(date) {
            self.dates.insert(date.to_string());
        }
    }

    pub fn push_record(&mut self, record: &RidershipRecord) {
        self.push(&record.date, &record.hour, &record.station, &record.count);
    }

    pub fn station_count(&self) -> usize {
        self.station_totals.len()
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    /// Daily averages, with per-line totals for stations found in `station_lines`.
    ///
    /// `station_lines` is keyed by station name; lookups ignore case.
    pub fn summarize(&self, station_lines: &HashMap<String, LineKey>) -> RidershipSummary {
        let days = self.dates.len();
        if days == 0 {
            return RidershipSummary {
                total_daily_average: 0,
                busiest_stations: Vec::new(),
                ridership_by_line: BTreeMap::new(),
                peak_hours: [0; 24],
                date_range: None,
            };
        }

        let average = |total: u64| (total as f64 / days as f64).round() as u64;

        let mut busiest: Vec<StationRidership> = self
            .station_totals
            .values()
            .map(|station| StationRidership {
                name: station.name.clone(),
                ridership: average(station.total),
            })
            .collect();
        busiest.sort_by(|a, b| b.ridership.cmp(&a.ridership).then_with(|| a.name.cmp(&b.name)));
        busiest.truncate(BUSIEST_STATION_LIMIT);

        let folded_lines: HashMap<String, &LineKey> = station_lines
            .iter()
            .map(|(name, key)| (station_key(name), key))
            .collect();
        let mut line_totals: BTreeMap<String, u64> = BTreeMap::new();
        for (station, totals) in &self.station_totals {
            if let Some(key) = folded_lines.get(station) {
                let line_total = line_totals.entry(key.to_string()).or_default();
                *line_total = line_total.saturating_add(totals.total);
            }
        }

        let grand_total = self
            .station_totals
            .values()
            .fold(0u64, |sum, station| sum.saturating_add(station.total));

        RidershipSummary {
            total_daily_average: average(grand_total),
            busiest_stations: busiest,
            ridership_by_line: line_totals
                .into_iter()
                .map(|(line, total)| (line, average(total)))
                .collect(),
            peak_hours: self.hour_totals.map(average),
            date_range: self.date_range(),
        }
    }

    /// Earliest and latest date. Calendar order when every date parses,
    /// lexical order otherwise.
    fn date_range(&self) -> Option<DateRange> {
        let parsed: Option<Vec<(NaiveDate, &String)>> = self
            .dates
            .iter()
            .map(|raw| parse_date(raw).map(|d| (d, raw)))
            .collect();

        let (start, end) = match parsed {
            Some(mut dated) if !dated.is_empty() => {
                dated.sort();
                (dated.first()?.1, dated.last()?.1)
            }
            _ => (self.dates.first()?, self.dates.last()?),
        };

        Some(DateRange {
            start: start.clone(),
            end: end.clone(),
        })
    }
}

#[derive(Clone, Debug)]
struct StationTotal {
    name: String,
    total: u64,
}

fn station_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Aggregate already-parsed records without a station to line mapping.
pub fn aggregate_ridership<'a>(
    records: impl IntoIterator<Item = &'a RidershipRecord>,
) -> RidershipSummary {
    let mut accumulator = RidershipAccumulator::default();
    for record in records {
        accumulator.push_record(record);
    }
    accumulator.summarize(&HashMap::new())
}

fn parse_hour(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    let raw = raw.split_once(':').map(|(h, _)| h).unwrap_or(raw);
    let hour: usize = raw.parse().ok()?;
    (hour < 24).then_some(hour)
}

fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(count) = raw.parse::<u64>() {
        return Some(count);
    }
    let value: f64 = raw.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
