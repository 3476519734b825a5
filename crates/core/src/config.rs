//! Per-city source configuration.
//!
//! Each network kind of a city selects exactly one source strategy. The
//! strategies are tagged variants so dispatch over them is exhaustive.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use metroscope_transit::{CityIdentifier, LineVocabulary};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

// ============================================================================
// Sources
// ============================================================================

/// A graph-relation query (Overpass-style endpoint, query sent as the body).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub endpoint: String,
    pub query: String,
    /// Accepted `route=*` values; empty means the network kind's default
    #[serde(default)]
    pub route_kinds: Vec<String>,
    /// Merge direction/service variants of one corridor before assembly
    #[serde(default)]
    pub merge_corridors: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NetworkSource {
    /// GeoJSON with station points and line geometries
    DirectJson { url: String },
    GraphRelation(GraphQuery),
    /// Scheduling archive; `route_types` empty means the kind's default
    ArchiveFeed {
        url: String,
        #[serde(default)]
        route_types: Vec<u32>,
    },
    /// Stations from one source, lines from another
    Hybrid {
        stations: Box<NetworkSource>,
        lines: Box<NetworkSource>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BusSource {
    /// Stop tuples, plus an optional route -> stop sequences document
    PointTopology {
        stops_url: String,
        #[serde(default)]
        topology_url: Option<String>,
    },
    ArchiveFeed {
        url: String,
        #[serde(default)]
        route_types: Vec<u32>,
    },
    GraphRelation(GraphQuery),
}

/// Semicolon-delimited ridership log, optionally shipped inside an archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RidershipSource {
    pub url: String,
    /// Archive entry holding the log; archives without one use their first entry
    #[serde(default)]
    pub entry: Option<String>,
}

/// Which half of a city's rail system a source feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    Metro,
    Rail,
}

impl NetworkKind {
    pub fn default_route_kinds(self) -> Vec<String> {
        let kinds: &[&str] = match self {
            NetworkKind::Metro => &["subway", "light_rail", "monorail"],
            NetworkKind::Rail => &["train", "railway"],
        };
        kinds.iter().map(|k| k.to_string()).collect()
    }

    /// Scheduling-feed route types
    pub fn default_route_types(self) -> Vec<u32> {
        match self {
            NetworkKind::Metro => vec![1],
            NetworkKind::Rail => vec![2],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkKind::Metro => "metro",
            NetworkKind::Rail => "rail",
        }
    }
}

pub const BUS_ROUTE_KINDS: &[&str] = &["bus", "trolleybus"];
pub const BUS_ROUTE_TYPES: &[u32] = &[3];

// ============================================================================
// Cities
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    #[serde(default)]
    pub bus: Option<BusSource>,
    #[serde(default)]
    pub metro: Option<NetworkSource>,
    #[serde(default)]
    pub rail: Option<NetworkSource>,
    #[serde(default)]
    pub ridership: Option<RidershipSource>,
    #[serde(default)]
    pub metro_vocabulary: LineVocabulary,
    #[serde(default)]
    pub rail_vocabulary: LineVocabulary,
}

impl CityConfig {
    pub fn network(&self, kind: NetworkKind) -> Option<&NetworkSource> {
        match kind {
            NetworkKind::Metro => self.metro.as_ref(),
            NetworkKind::Rail => self.rail.as_ref(),
        }
    }

    pub fn vocabulary(&self, kind: NetworkKind) -> &LineVocabulary {
        match kind {
            NetworkKind::Metro => &self.metro_vocabulary,
            NetworkKind::Rail => &self.rail_vocabulary,
        }
    }

    pub fn has_sources(&self) -> bool {
        self.bus.is_some() || self.metro.is_some() || self.rail.is_some()
    }
}

/// Cities keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityRegistry {
    cities: BTreeMap<CityIdentifier, CityConfig>,
}

impl CityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: CityIdentifier, config: CityConfig) {
        self.cities.insert(id, config);
    }

    pub fn get(&self, id: &CityIdentifier) -> Option<&CityConfig> {
        self.cities.get(id)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub cache_ttl_secs: u64,
    /// Keep every n-th line vertex when matching stations
    pub match_stride: usize,
    /// Length of the busiest-stops list in derived metrics
    pub top_busiest_stops: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 24 * 60 * 60,
            match_stride: metroscope_transit::matching::DEFAULT_MATCH_STRIDE,
            top_busiest_stops: 10,
            user_agent: concat!("metroscope/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 120,
        }
    }
}

impl ServiceSettings {
    pub fn cache_ttl(&self) -> TimeDelta {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// Everything the orchestrator needs: service settings plus the cities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: ServiceSettings,
    #[serde(default)]
    pub cities: CityRegistry,
}

impl ServiceConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, FetchError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "settings": {"cache_ttl_secs": 60},
        "cities": {
            "mumbai": {
                "name": "Mumbai",
                "bus": {"strategy": "point_topology",
                        "stops_url": "https://example.org/stops.json",
                        "topology_url": "https://example.org/routes.json"},
                "rail": {"strategy": "graph_relation",
                         "endpoint": "https://overpass.example.org/api/interpreter",
                         "query": "[out:json];relation[route=train](18.8,72.7,19.3,73.1);out geom;",
                         "merge_corridors": true},
                "metro": {"strategy": "hybrid",
                          "stations": {"strategy": "direct_json", "url": "https://example.org/metro.geojson"},
                          "lines": {"strategy": "archive_feed", "url": "https://example.org/gtfs.zip"}},
                "metro_vocabulary": [{"name": "Line 1", "color": "blue"}]
            },
            "delhi": {"name": "Delhi"}
        }
    }"#;

    #[test]
    fn test_parse_registry() {
        let config = ServiceConfig::from_json(CONFIG.as_bytes()).unwrap();
        assert_eq!(config.settings.cache_ttl(), TimeDelta::seconds(60));
        assert_eq!(config.settings.top_busiest_stops, 10);
        assert_eq!(config.cities.len(), 2);

        let mumbai = config.cities.get(&CityIdentifier::new("mumbai")).unwrap();
        assert!(matches!(
            mumbai.bus,
            Some(BusSource::PointTopology { topology_url: Some(_), .. })
        ));
        match mumbai.network(NetworkKind::Rail) {
            Some(NetworkSource::GraphRelation(query)) => {
                assert!(query.merge_corridors);
                assert!(query.route_kinds.is_empty());
            }
            other => panic!("unexpected rail source {other:?}"),
        }
        assert!(matches!(
            mumbai.network(NetworkKind::Metro),
            Some(NetworkSource::Hybrid { .. })
        ));
        assert_eq!(mumbai.vocabulary(NetworkKind::Metro).entries().len(), 1);

        let delhi = config.cities.get(&CityIdentifier::new("delhi")).unwrap();
        assert!(!delhi.has_sources());
        assert!(delhi.rail_vocabulary.is_empty());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let json = r#"{"cities": {"x": {"name": "X", "bus": {"strategy": "carrier_pigeon"}}}}"#;
        assert!(matches!(
            ServiceConfig::from_json(json.as_bytes()),
            Err(FetchError::Config(_))
        ));
    }
}
