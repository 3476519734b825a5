//! Summary figures derived from a network snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use metroscope_transit::{StopIdentifier, TransitNetwork};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyStop {
    pub id: StopIdentifier,
    pub name: String,
    pub route_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitMetrics {
    pub total_bus_stops: usize,
    pub total_stations: usize,
    pub total_lines: usize,
    pub average_routes_per_stop: f64,
    pub busiest_stops: Vec<BusyStop>,
    /// Station names per line key, metro and rail together
    pub stations_by_line: BTreeMap<String, Vec<String>>,
}

impl TransitMetrics {
    /// Derive metrics, keeping the `top_n` stops served by the most routes.
    pub fn derive(network: &TransitNetwork, top_n: usize) -> Self {
        let total_routes: u64 = network.bus_stops.iter().map(|s| u64::from(s.route_count)).sum();
        let average_routes_per_stop = if network.bus_stops.is_empty() {
            0.0
        } else {
            total_routes as f64 / network.bus_stops.len() as f64
        };

        let mut ranked: Vec<_> = network.bus_stops.iter().collect();
        ranked.sort_by(|a, b| b.route_count.cmp(&a.route_count).then_with(|| a.name.cmp(&b.name)));
        let busiest_stops = ranked
            .into_iter()
            .take(top_n)
            .map(|s| BusyStop {
                id: s.id.clone(),
                name: s.name.clone(),
                route_count: s.route_count,
            })
            .collect();

        let mut stations_by_line: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for station in network.all_stations() {
            stations_by_line
                .entry(station.line_key.to_string())
                .or_default()
                .push(station.name.clone());
        }

        Self {
            total_bus_stops: network.bus_stops.len(),
            total_stations: network.all_stations().count(),
            total_lines: network.all_lines().count(),
            average_routes_per_stop,
            busiest_stops,
            stations_by_line,
        }
    }
}

/// A network together with its derived metrics.
#[derive(Clone, Debug, Serialize)]
pub struct NetworkReport {
    pub network: Arc<TransitNetwork>,
    pub metrics: TransitMetrics,
}
