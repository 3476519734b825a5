//! Core data types for reconstructed transit networks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveError;
use crate::identifiers::*;

/// Line key given to a station when the network has no line to match against.
pub const FALLBACK_LINE_KEY: &str = "default";

/// Color token given to lines whose source carries no color at all.
pub const FALLBACK_COLOR_TOKEN: &str = "gray";

// ============================================================================
// Geometry
// ============================================================================

/// WGS84 coordinate
///
/// Equality is exact; line chaining relies on upstream data sharing literal
/// vertices at way endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great-circle distance in meters
    pub fn haversine_to(&self, other: &Point) -> f64 {
        crate::spatial::queries::haversine_distance((*self).into(), (*other).into())
    }
}

impl From<Point> for geo::Point {
    fn from(p: Point) -> Self {
        geo::Point::new(p.lon, p.lat)
    }
}

impl From<geo::Point> for Point {
    fn from(p: geo::Point) -> Self {
        Point::new(p.y(), p.x())
    }
}

// ============================================================================
// Network entities
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStop {
    pub id: StopIdentifier,
    pub name: String,
    pub location: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default)]
    pub route_count: u32,
}

/// A metro or rail station, already assigned to a line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub name: String,
    pub location: Point,
    pub line_key: LineKey,
}

/// A labeled point that has not been assigned to a line yet.
#[derive(Clone, Debug, PartialEq)]
pub struct StationCandidate {
    pub name: String,
    pub location: Point,
    /// Line named by the source itself, if any
    pub line_hint: Option<String>,
}

impl StationCandidate {
    pub fn new(name: impl Into<String>, location: Point) -> Self {
        Self {
            name: name.into(),
            location,
            line_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.line_hint = Some(hint.into());
        self
    }
}

/// A render-ready line.
///
/// `coordinates` is never empty. `segments` is only present when the
/// geometry is disjoint and has to be drawn as several strokes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub name: LineKey,
    pub color_token: String,
    pub coordinates: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Vec<Point>>>,
}

impl Line {
    /// Build a line from chained segments, dropping empty ones.
    ///
    /// Returns `None` when nothing drawable is left.
    pub fn from_segments(
        name: LineKey,
        color_token: impl Into<String>,
        segments: Vec<Vec<Point>>,
    ) -> Option<Self> {
        let segments: Vec<Vec<Point>> = segments.into_iter().filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return None;
        }

        let coordinates: Vec<Point> = segments.iter().flatten().copied().collect();
        let segments = if segments.len() > 1 { Some(segments) } else { None };

        Some(Self {
            name,
            color_token: color_token.into(),
            coordinates,
            segments,
        })
    }

    /// Each drawable stroke, whether or not the line is disjoint
    pub fn strokes(&self) -> Vec<&[Point]> {
        match &self.segments {
            Some(segments) => segments.iter().map(|s| s.as_slice()).collect(),
            None => vec![self.coordinates.as_slice()],
        }
    }
}

/// The unit of caching and the unit handed to callers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitNetwork {
    pub bus_stops: Vec<BusStop>,
    pub metro_stations: Vec<Station>,
    pub metro_lines: Vec<Line>,
    pub rail_stations: Vec<Station>,
    pub rail_lines: Vec<Line>,
}

impl TransitNetwork {
    pub fn is_empty(&self) -> bool {
        self.bus_stops.is_empty()
            && self.metro_stations.is_empty()
            && self.metro_lines.is_empty()
            && self.rail_stations.is_empty()
            && self.rail_lines.is_empty()
    }

    pub fn all_stations(&self) -> impl Iterator<Item = &Station> {
        self.metro_stations.iter().chain(self.rail_stations.iter())
    }

    pub fn all_lines(&self) -> impl Iterator<Item = &Line> {
        self.metro_lines.iter().chain(self.rail_lines.iter())
    }
}

/// Stations and lines of one network kind (metro or rail).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineNetwork {
    pub stations: Vec<Station>,
    pub lines: Vec<Line>,
}

// ============================================================================
// Ridership
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRidership {
    pub name: String,
    /// Daily average
    pub ridership: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidershipSummary {
    pub total_daily_average: u64,
    pub busiest_stations: Vec<StationRidership>,
    pub ridership_by_line: BTreeMap<String, u64>,
    /// Daily average per hour of day, index 0 is midnight
    pub peak_hours: [u64; 24],
    pub date_range: Option<DateRange>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON decode error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    #[error("Delimited text error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TransitError>;
