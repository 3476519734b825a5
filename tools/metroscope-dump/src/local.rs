//! Reconstruction from files on disk, without the service or its cache.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use metroscope_core::config::{BUS_ROUTE_KINDS, BUS_ROUTE_TYPES};
use metroscope_core::NetworkKind;
use metroscope_transit::direct::{parse_geojson_network, parse_point_topology, parse_service_topology};
use metroscope_transit::matching::apply_route_counts;
use metroscope_transit::{
    assign_stations_to_lines, build_bus_stops, build_line_network, GraphElements, LineNetwork,
    LineVocabulary, ScheduleFeed, TransitNetwork,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// Graph-query JSON with nodes, ways and route relations
    Graph,
    /// Zipped scheduling feed
    Feed,
    /// GeoJSON with station points and line geometries
    Geojson,
    /// Point-topology stop dump
    Stops,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Layer {
    Bus,
    Metro,
    Rail,
}

impl Layer {
    fn network_kind(self) -> Option<NetworkKind> {
        match self {
            Layer::Bus => None,
            Layer::Metro => Some(NetworkKind::Metro),
            Layer::Rail => Some(NetworkKind::Rail),
        }
    }
}

#[derive(Debug, Default)]
pub struct AssembleOptions {
    pub route_kinds: Vec<String>,
    pub route_types: Vec<u32>,
    pub vocabulary: LineVocabulary,
    pub merge_corridors: bool,
    pub stride: usize,
    /// Service topology bytes, only read for point-topology stops
    pub topology: Option<Vec<u8>>,
}

/// Build the single `layer` of a network from one local input.
pub fn assemble(
    bytes: &[u8],
    format: InputFormat,
    layer: Layer,
    options: &AssembleOptions,
) -> Result<TransitNetwork> {
    let vocabulary = (!options.vocabulary.is_empty()).then_some(&options.vocabulary);
    let mut network = TransitNetwork::default();

    let Some(kind) = layer.network_kind() else {
        network.bus_stops = match format {
            InputFormat::Graph => {
                let graph = GraphElements::from_json(bytes).context("Failed to parse graph")?;
                build_bus_stops(&graph, &or_default_kinds(&options.route_kinds, bus_kinds()))
            }
            InputFormat::Feed => {
                let feed = ScheduleFeed::from_archive(bytes).context("Failed to read feed")?;
                feed.bus_stops(or_default_types(&options.route_types, BUS_ROUTE_TYPES))
            }
            InputFormat::Stops => {
                let mut stops = parse_point_topology(bytes).context("Failed to parse stops")?;
                if let Some(topology) = &options.topology {
                    let topology =
                        parse_service_topology(topology).context("Failed to parse topology")?;
                    apply_route_counts(&mut stops, &topology);
                }
                stops
            }
            InputFormat::Geojson => bail!("GeoJSON input carries no bus stops"),
        };
        return Ok(network);
    };

    let stride = options.stride.max(1);
    let line_network = match format {
        InputFormat::Graph => {
            let graph = GraphElements::from_json(bytes).context("Failed to parse graph")?;
            let kinds = or_default_kinds(&options.route_kinds, kind.default_route_kinds());
            build_line_network(&graph, &kinds, vocabulary, options.merge_corridors, stride)
        }
        InputFormat::Feed => {
            let feed = ScheduleFeed::from_archive(bytes).context("Failed to read feed")?;
            let default_types = kind.default_route_types();
            let types = or_default_types(&options.route_types, &default_types);
            feed.build_line_network(types, vocabulary, stride)
        }
        InputFormat::Geojson => {
            let (candidates, lines) =
                parse_geojson_network(bytes, vocabulary).context("Failed to parse GeoJSON")?;
            let stations = assign_stations_to_lines(candidates, &lines, stride);
            LineNetwork { stations, lines }
        }
        InputFormat::Stops => bail!("stop dumps carry no {} lines", kind.as_str()),
    };

    match kind {
        NetworkKind::Metro => {
            network.metro_stations = line_network.stations;
            network.metro_lines = line_network.lines;
        }
        NetworkKind::Rail => {
            network.rail_stations = line_network.stations;
            network.rail_lines = line_network.lines;
        }
    }
    Ok(network)
}

fn bus_kinds() -> Vec<String> {
    BUS_ROUTE_KINDS.iter().map(|k| k.to_string()).collect()
}

fn or_default_kinds(kinds: &[String], default: Vec<String>) -> Vec<String> {
    if kinds.is_empty() {
        default
    } else {
        kinds.to_vec()
    }
}

fn or_default_types<'a>(types: &'a [u32], default: &'a [u32]) -> &'a [u32] {
    if types.is_empty() {
        default
    } else {
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &[u8] = br##"{"elements": [
        {"type": "node", "id": 1, "lat": 19.00, "lon": 72.80},
        {"type": "node", "id": 2, "lat": 19.01, "lon": 72.81},
        {"type": "node", "id": 3, "lat": 19.02, "lon": 72.82},
        {"type": "node", "id": 4, "lat": 19.011, "lon": 72.811,
         "tags": {"railway": "station", "name": "Dadar"}},
        {"type": "way", "id": 10, "nodes": [1, 2]},
        {"type": "way", "id": 11, "nodes": [2, 3]},
        {"type": "relation", "id": 100,
         "tags": {"type": "route", "route": "train", "name": "Western Line", "colour": "#f00"},
         "members": [{"type": "way", "ref": 10, "role": ""}, {"type": "way", "ref": 11, "role": ""}]}
    ]}"##;

    #[test]
    fn test_graph_rail_layer() {
        let options = AssembleOptions {
            merge_corridors: true,
            stride: 1,
            ..Default::default()
        };
        let network = assemble(GRAPH, InputFormat::Graph, Layer::Rail, &options).unwrap();

        assert!(network.metro_lines.is_empty());
        assert_eq!(network.rail_lines.len(), 1);
        assert_eq!(network.rail_lines[0].coordinates.len(), 3);
        assert_eq!(network.rail_stations.len(), 1);
        assert_eq!(network.rail_stations[0].line_key, network.rail_lines[0].name);
    }

    #[test]
    fn test_metro_defaults_ignore_rail_routes() {
        let network =
            assemble(GRAPH, InputFormat::Graph, Layer::Metro, &AssembleOptions::default()).unwrap();
        assert!(network.metro_lines.is_empty());
        // Stations still come through, keyed to the fallback line
        assert_eq!(network.metro_stations.len(), 1);
    }

    #[test]
    fn test_point_topology_with_route_counts() {
        let stops = br#"{"s1": [72.8, 19.0, "Colaba", "N"], "s2": ["72.9", "19.1", "Fort"]}"#;
        let topology = br#"{"r1": [["s1", "s2"]], "r2": ["s1"]}"#;
        let options = AssembleOptions {
            topology: Some(topology.to_vec()),
            ..Default::default()
        };

        let network = assemble(stops, InputFormat::Stops, Layer::Bus, &options).unwrap();
        let colaba = network.bus_stops.iter().find(|s| s.name == "Colaba").unwrap();
        let fort = network.bus_stops.iter().find(|s| s.name == "Fort").unwrap();
        assert_eq!(colaba.route_count, 2);
        assert_eq!(fort.route_count, 1);
    }

    #[test]
    fn test_mismatched_layer_is_rejected() {
        let options = AssembleOptions::default();
        assert!(assemble(b"{}", InputFormat::Stops, Layer::Metro, &options).is_err());
        assert!(assemble(b"{}", InputFormat::Geojson, Layer::Bus, &options).is_err());
    }
}
