//! Raw graph elements decoded from a query result.
//!
//! Nodes, ways and relations are intermediate: they only live long enough
//! to be assembled into lines, stations and stops.

use std::collections::HashMap;

use serde::Deserialize;

use crate::identifiers::{RouteIdentifier, StopIdentifier};
use crate::matching::routes::ServiceTopology;
use crate::models::types::{BusStop, Point, Result, StationCandidate};
use crate::spatial::centroid;

/// Tag storage type
pub type Tags = HashMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: i64,
    pub location: Point,
    pub tags: Tags,
}

/// A way with node references (before coordinate resolution)
#[derive(Clone, Debug, PartialEq)]
pub struct Way {
    pub id: i64,
    pub node_refs: Vec<i64>,
    pub tags: Tags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelationMember {
    pub member_type: MemberType,
    pub reference: i64,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub tags: Tags,
    pub members: Vec<RelationMember>,
}

impl Relation {
    /// Display name: `name`, then `name:en`, then `ref`
    pub fn display_name(&self) -> Option<&str> {
        ["name", "name:en", "ref"]
            .iter()
            .find_map(|k| self.tags.get(*k))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn way_refs(&self) -> impl Iterator<Item = i64> + '_ {
        self.members
            .iter()
            .filter(|m| m.member_type == MemberType::Way)
            .map(|m| m.reference)
    }

    pub fn node_refs(&self) -> impl Iterator<Item = i64> + '_ {
        self.members
            .iter()
            .filter(|m| m.member_type == MemberType::Node)
            .map(|m| m.reference)
    }

    pub fn colour(&self) -> Option<&str> {
        self.tags
            .get("colour")
            .or_else(|| self.tags.get("color"))
            .map(String::as_str)
    }
}

/// Check if tags describe a route relation of one of `kinds`
pub fn is_route_of_kind(tags: &Tags, kinds: &[String]) -> bool {
    tags.get("type").map(|v| v == "route").unwrap_or(true)
        && tags
            .get("route")
            .map(|v| kinds.iter().any(|k| k.eq_ignore_ascii_case(v)))
            .unwrap_or(false)
}

/// Check if tags indicate a station (node or footprint)
pub fn is_station(tags: &Tags) -> bool {
    if let Some(railway) = tags.get("railway") {
        if railway == "station" || railway == "halt" {
            return true;
        }
    }
    tags.get("public_transport")
        .map(|v| v == "station")
        .unwrap_or(false)
}

/// Check if tags indicate a bus stop
pub fn is_bus_stop(tags: &Tags) -> bool {
    if tags.get("highway").map(|v| v == "bus_stop").unwrap_or(false) {
        return true;
    }
    tags.get("public_transport").map(|v| v == "platform").unwrap_or(false)
        && tags.get("bus").map(|v| v == "yes").unwrap_or(false)
}

/// All elements of one query result, in source order.
#[derive(Clone, Debug, Default)]
pub struct GraphElements {
    nodes: Vec<Node>,
    node_index: HashMap<i64, usize>,
    ways: Vec<Way>,
    way_index: HashMap<i64, usize>,
    pub relations: Vec<Relation>,
}

impl GraphElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, node: Node) {
        match self.node_index.get(&node.id) {
            Some(&idx) => {
                // Later copies may carry tags the skeleton copy lacked
                let existing = &mut self.nodes[idx];
                existing.location = node.location;
                existing.tags.extend(node.tags);
            }
            None => {
                self.node_index.insert(node.id, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    pub fn insert_way(&mut self, way: Way) {
        match self.way_index.get(&way.id) {
            Some(&idx) => self.ways[idx] = way,
            None => {
                self.way_index.insert(way.id, self.ways.len());
                self.ways.push(way);
            }
        }
    }

    pub fn node(&self, id: i64) -> Option<&Node> {
        self.node_index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn way(&self, id: i64) -> Option<&Way> {
        self.way_index.get(&id).map(|&i| &self.ways[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn ways(&self) -> &[Way] {
        &self.ways
    }

    /// Resolve way node references to coordinates.
    ///
    /// A way referencing a node that is not in the result is unusable.
    pub fn resolve_way(&self, way_id: i64) -> Option<Vec<Point>> {
        self.way(way_id)?
            .node_refs
            .iter()
            .map(|&id| self.node(id).map(|n| n.location))
            .collect()
    }

    /// Relations routed as one of `kinds`, in source order
    pub fn route_relations(&self, kinds: &[String]) -> Vec<Relation> {
        self.relations
            .iter()
            .filter(|r| is_route_of_kind(&r.tags, kinds))
            .cloned()
            .collect()
    }

    /// Named station nodes, then named station footprints (as centroids).
    pub fn station_candidates(&self) -> Vec<StationCandidate> {
        let from_nodes = self
            .nodes
            .iter()
            .filter(|n| is_station(&n.tags))
            .filter_map(|n| station_candidate(&n.tags, n.location));

        let from_ways = self
            .ways
            .iter()
            .filter(|w| is_station(&w.tags))
            .filter_map(|w| {
                let footprint = self.resolve_way(w.id)?;
                station_candidate(&w.tags, centroid(&footprint)?)
            });

        from_nodes.chain(from_ways).collect()
    }

    pub fn bus_stops(&self) -> Vec<BusStop> {
        self.nodes
            .iter()
            .filter(|n| is_bus_stop(&n.tags))
            .map(|n| BusStop {
                id: StopIdentifier::new(n.id.to_string()),
                name: n.tags.get("name").cloned().unwrap_or_default(),
                location: n.location,
                direction: n.tags.get("direction").cloned(),
                route_count: 0,
            })
            .collect()
    }

    /// Stops served by each route relation of `kinds`, in member order.
    pub fn service_topology(&self, kinds: &[String]) -> ServiceTopology {
        self.relations
            .iter()
            .filter(|r| is_route_of_kind(&r.tags, kinds))
            .map(|r| {
                let route = r
                    .tags
                    .get("ref")
                    .cloned()
                    .unwrap_or_else(|| r.id.to_string());
                let stops = r
                    .node_refs()
                    .map(|id| StopIdentifier::new(id.to_string()))
                    .collect();
                (RouteIdentifier::new(route), stops)
            })
            .collect()
    }

    /// Decode an Overpass-style JSON result (`{"elements": [...]}`).
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let response: QueryResponseDto = serde_json::from_slice(bytes)?;
        let mut graph = Self::new();

        for element in response.elements {
            match element {
                ElementDto::Node { id, lat, lon, tags } => {
                    if let (Some(lat), Some(lon)) = (lat, lon) {
                        graph.insert_node(Node {
                            id,
                            location: Point::new(lat, lon),
                            tags,
                        });
                    }
                }
                ElementDto::Way {
                    id,
                    nodes,
                    geometry,
                    tags,
                } => {
                    // `out geom` results carry coordinates inline
                    if let Some(geometry) = geometry {
                        for (&node_id, p) in nodes.iter().zip(geometry.iter()) {
                            if graph.node(node_id).is_none() {
                                graph.insert_node(Node {
                                    id: node_id,
                                    location: Point::new(p.lat, p.lon),
                                    tags: Tags::new(),
                                });
                            }
                        }
                    }
                    graph.insert_way(Way {
                        id,
                        node_refs: nodes,
                        tags,
                    });
                }
                ElementDto::Relation { id, members, tags } => {
                    graph.relations.push(Relation {
                        id,
                        tags,
                        members: members
                            .into_iter()
                            .filter_map(MemberDto::into_member)
                            .collect(),
                    });
                }
                ElementDto::Other => {}
            }
        }

        tracing::debug!(
            "graph result: {} nodes, {} ways, {} relations",
            graph.nodes.len(),
            graph.ways.len(),
            graph.relations.len()
        );

        Ok(graph)
    }
}

fn station_candidate(tags: &Tags, location: Point) -> Option<StationCandidate> {
    let name = tags.get("name").map(|s| s.trim()).filter(|s| !s.is_empty())?;
    let candidate = StationCandidate::new(name, location);
    Some(match tags.get("line").or_else(|| tags.get("route_ref")) {
        Some(hint) => candidate.with_hint(hint.clone()),
        None => candidate,
    })
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponseDto {
    #[serde(default)]
    elements: Vec<ElementDto>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ElementDto {
    Node {
        id: i64,
        lat: Option<f64>,
        lon: Option<f64>,
        #[serde(default)]
        tags: Tags,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        geometry: Option<Vec<LatLonDto>>,
        #[serde(default)]
        tags: Tags,
    },
    Relation {
        id: i64,
        #[serde(default)]
        members: Vec<MemberDto>,
        #[serde(default)]
        tags: Tags,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct LatLonDto {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct MemberDto {
    #[serde(rename = "type")]
    member_type: String,
    #[serde(rename = "ref")]
    reference: i64,
    #[serde(default)]
    role: String,
}

impl MemberDto {
    fn into_member(self) -> Option<RelationMember> {
        let member_type = match self.member_type.as_str() {
            "node" => MemberType::Node,
            "way" => MemberType::Way,
            "relation" => MemberType::Relation,
            _ => return None,
        };
        Some(RelationMember {
            member_type,
            reference: self.reference,
            role: self.role,
        })
    }
}
