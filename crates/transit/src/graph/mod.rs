//! Graph-relation sources: decoding, corridor merging and line assembly.

pub mod assembly;
pub mod corridor;
pub mod elements;

pub use assembly::{assemble_corridor_lines, assemble_lines, chain_segments};
pub use corridor::{merge_corridors, normalize_corridor_key, strip_variant_suffixes};
pub use elements::{GraphElements, MemberType, Node, Relation, RelationMember, Tags, Way};

use crate::matching::{apply_route_counts, assign_stations_to_lines, LineVocabulary};
use crate::models::types::{BusStop, Line, LineNetwork};

/// Lines of the route relations of `route_kinds`.
///
/// Relations are optionally merged by corridor, then assembled against
/// `vocabulary`; without a vocabulary every corridor becomes its own line.
pub fn build_lines(
    graph: &GraphElements,
    route_kinds: &[String],
    vocabulary: Option<&LineVocabulary>,
    merge: bool,
) -> Vec<Line> {
    let mut relations = graph.route_relations(route_kinds);
    if merge {
        let before = relations.len();
        relations = merge_corridors(relations);
        tracing::debug!("merged {} route relations into {} corridors", before, relations.len());
    }

    match vocabulary {
        Some(vocabulary) if !vocabulary.is_empty() => assemble_lines(graph, &relations, vocabulary),
        _ => assemble_corridor_lines(graph, &relations),
    }
}

/// Lines and stations of one network kind from a decoded query result,
/// with every station candidate matched against the assembled lines.
pub fn build_line_network(
    graph: &GraphElements,
    route_kinds: &[String],
    vocabulary: Option<&LineVocabulary>,
    merge: bool,
    stride: usize,
) -> LineNetwork {
    let lines = build_lines(graph, route_kinds, vocabulary, merge);
    let stations = assign_stations_to_lines(graph.station_candidates(), &lines, stride);

    LineNetwork { stations, lines }
}

/// Bus stops from a decoded query result, with route counts taken from the
/// node members of route relations of `route_kinds`.
pub fn build_bus_stops(graph: &GraphElements, route_kinds: &[String]) -> Vec<BusStop> {
    let mut stops = graph.bus_stops();
    let topology = graph.service_topology(route_kinds);
    apply_route_counts(&mut stops, &topology);
    stops
}
