//! GeoJSON rendering of a reconstructed network.

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::json;

use crate::models::types::{BusStop, Line, Point, Station, TransitNetwork};

fn position(p: &Point) -> Vec<f64> {
    vec![p.lon, p.lat]
}

fn feature(value: Value, properties: serde_json::Map<String, serde_json::Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn bus_stop_feature(stop: &BusStop) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert("kind".to_string(), json!("bus_stop"));
    properties.insert("id".to_string(), json!(stop.id.as_str()));
    properties.insert("name".to_string(), json!(stop.name));
    properties.insert("routeCount".to_string(), json!(stop.route_count));
    if let Some(direction) = &stop.direction {
        properties.insert("direction".to_string(), json!(direction));
    }
    feature(Value::Point(position(&stop.location)), properties)
}

fn station_feature(station: &Station, kind: &str) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert("kind".to_string(), json!(kind));
    properties.insert("name".to_string(), json!(station.name));
    properties.insert("line".to_string(), json!(station.line_key.as_str()));
    feature(Value::Point(position(&station.location)), properties)
}

/// Disjoint lines become MultiLineStrings, one part per segment.
fn line_feature(line: &Line, kind: &str) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert("kind".to_string(), json!(kind));
    properties.insert("name".to_string(), json!(line.name.as_str()));
    properties.insert("color".to_string(), json!(line.color_token));

    let value = match &line.segments {
        Some(segments) => Value::MultiLineString(
            segments
                .iter()
                .map(|s| s.iter().map(position).collect())
                .collect(),
        ),
        None => Value::LineString(line.coordinates.iter().map(position).collect()),
    };
    feature(value, properties)
}

/// Every stop, station and line as one feature collection.
pub fn network_to_geojson(network: &TransitNetwork) -> FeatureCollection {
    let mut features: Vec<Feature> = Vec::new();

    features.extend(network.metro_lines.iter().map(|l| line_feature(l, "metro_line")));
    features.extend(network.rail_lines.iter().map(|l| line_feature(l, "rail_line")));
    features.extend(
        network
            .metro_stations
            .iter()
            .map(|s| station_feature(s, "metro_station")),
    );
    features.extend(
        network
            .rail_stations
            .iter()
            .map(|s| station_feature(s, "rail_station")),
    );
    features.extend(network.bus_stops.iter().map(bus_stop_feature));

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
