//! Direct structural JSON sources.
//!
//! City-specific dumps that already hold stops, stations or lines and only
//! need mapping onto the network model.

use std::collections::HashMap;

use geojson::{Feature, GeoJson, Value};
use serde_json::Value as JsonValue;

use crate::identifiers::{LineKey, RouteIdentifier, StopIdentifier};
use crate::matching::{LineVocabulary, ServiceTopology};
use crate::models::types::{
    BusStop, Line, Point, Result, StationCandidate, TransitError, FALLBACK_COLOR_TOKEN,
};

/// Bus stops from `{"<stop id>": [lon, lat, name, direction, reserved]}`.
///
/// Coordinates may be numbers or numeric strings. Entries that are not
/// arrays, or whose coordinates do not parse, are skipped.
pub fn parse_point_topology(bytes: &[u8]) -> Result<Vec<BusStop>> {
    let raw: serde_json::Map<String, JsonValue> = serde_json::from_slice(bytes)?;
    let total = raw.len();

    let stops: Vec<BusStop> = raw
        .into_iter()
        .filter_map(|(id, tuple)| {
            let fields = tuple.as_array()?;
            let lon = number(fields.first()?)?;
            let lat = number(fields.get(1)?)?;
            let location = Point::new(lat, lon);
            if !location.is_finite() {
                return None;
            }
            Some(BusStop {
                id: StopIdentifier::new(id),
                name: fields.get(2).and_then(text).unwrap_or_default(),
                location,
                direction: fields.get(3).and_then(text).filter(|d| !d.is_empty()),
                route_count: 0,
            })
        })
        .collect();

    if stops.len() < total {
        tracing::debug!("point topology: skipped {} malformed stops", total - stops.len());
    }

    Ok(stops)
}

/// Service topology from `{"<route>": [[stop ids], ...]}`.
///
/// A route holding a flat list of ids is read as a single sequence. Stop
/// ids may be strings or numbers.
pub fn parse_service_topology(bytes: &[u8]) -> Result<ServiceTopology> {
    let raw: serde_json::Map<String, JsonValue> = serde_json::from_slice(bytes)?;
    let mut topology = ServiceTopology::new();

    for (route, value) in raw {
        let Some(items) = value.as_array() else {
            continue;
        };
        let nested = items.iter().any(JsonValue::is_array);
        let sequences: Vec<&Vec<JsonValue>> = if nested {
            items.iter().filter_map(JsonValue::as_array).collect()
        } else {
            vec![items]
        };

        for sequence in sequences {
            let stops: Vec<StopIdentifier> = sequence
                .iter()
                .filter_map(text)
                .map(StopIdentifier::new)
                .collect();
            topology.add_sequence(RouteIdentifier::new(&route), stops);
        }
    }

    Ok(topology)
}

/// Station candidates and lines from a GeoJSON document.
///
/// Point features become candidates (the `line` property, if present, is
/// their hint). LineString and MultiLineString features become lines;
/// features sharing a name are merged into one multi-segment line. With a
/// vocabulary, matched line names take the entry's key and color.
pub fn parse_geojson_network(
    bytes: &[u8],
    vocabulary: Option<&LineVocabulary>,
) -> Result<(Vec<StationCandidate>, Vec<Line>)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| TransitError::InvalidData(format!("GeoJSON is not UTF-8: {e}")))?;
    let features = match text.parse::<GeoJson>().map_err(Box::new)? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(TransitError::InvalidData(
                "expected a Feature or FeatureCollection".to_string(),
            ))
        }
    };

    let mut candidates = Vec::new();
    let mut order: Vec<LineKey> = Vec::new();
    let mut lines: HashMap<LineKey, (String, Vec<Vec<Point>>)> = HashMap::new();

    for feature in &features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        match &geometry.value {
            Value::Point(position) => {
                let (Some(name), Some(location)) = (property(feature, &["name"]), position_point(position))
                else {
                    continue;
                };
                let candidate = StationCandidate::new(name, location);
                candidates.push(match property(feature, &["line", "line_name", "route"]) {
                    Some(hint) => candidate.with_hint(hint),
                    None => candidate,
                });
            }
            Value::LineString(positions) => {
                add_line_feature(feature, vec![path(positions)], vocabulary, &mut order, &mut lines);
            }
            Value::MultiLineString(parts) => {
                let segments = parts.iter().map(|p| path(p)).collect();
                add_line_feature(feature, segments, vocabulary, &mut order, &mut lines);
            }
            _ => {}
        }
    }

    let lines = order
        .into_iter()
        .filter_map(|key| {
            let (color, segments) = lines.remove(&key)?;
            Line::from_segments(key, color, segments)
        })
        .collect();

    Ok((candidates, lines))
}

fn add_line_feature(
    feature: &Feature,
    segments: Vec<Vec<Point>>,
    vocabulary: Option<&LineVocabulary>,
    order: &mut Vec<LineKey>,
    lines: &mut HashMap<LineKey, (String, Vec<Vec<Point>>)>,
) {
    let Some(name) = property(feature, &["name", "line", "ref"]) else {
        return;
    };
    let (key, color) = match vocabulary.and_then(|v| v.resolve(&name)) {
        Some(entry) => (entry.key(), entry.color.clone()),
        None => (
            LineKey::new(&name),
            property(feature, &["color", "colour"])
                .unwrap_or_else(|| FALLBACK_COLOR_TOKEN.to_string()),
        ),
    };

    let entry = lines.entry(key.clone()).or_insert_with(|| {
        order.push(key);
        (color, Vec::new())
    });
    entry.1.extend(segments.into_iter().filter(|s| !s.is_empty()));
}

/// First non-empty property among `keys`, as text
fn property(feature: &Feature, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| feature.property(k))
        .filter_map(text)
        .find(|v| !v.trim().is_empty())
}

fn position_point(position: &[f64]) -> Option<Point> {
    match position {
        [lon, lat, ..] => {
            let point = Point::new(*lat, *lon);
            point.is_finite().then_some(point)
        }
        _ => None,
    }
}

fn path(positions: &[Vec<f64>]) -> Vec<Point> {
    positions.iter().filter_map(|p| position_point(p)).collect()
}

fn number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
