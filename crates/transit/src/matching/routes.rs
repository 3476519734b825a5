//! Route density per bus stop.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::identifiers::{RouteIdentifier, StopIdentifier};
use crate::models::types::BusStop;

/// Which stops each route serves, as one or more ordered stop sequences
/// (typically one per direction or trip pattern).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceTopology {
    routes: BTreeMap<RouteIdentifier, Vec<Vec<StopIdentifier>>>,
}

impl ServiceTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sequence(&mut self, route: RouteIdentifier, sequence: Vec<StopIdentifier>) {
        self.routes.entry(route).or_default().push(sequence);
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn sequences(&self, route: &RouteIdentifier) -> Option<&[Vec<StopIdentifier>]> {
        self.routes.get(route).map(Vec::as_slice)
    }
}

impl FromIterator<(RouteIdentifier, Vec<StopIdentifier>)> for ServiceTopology {
    fn from_iter<I: IntoIterator<Item = (RouteIdentifier, Vec<StopIdentifier>)>>(iter: I) -> Self {
        let mut topology = Self::new();
        for (route, sequence) in iter {
            topology.add_sequence(route, sequence);
        }
        topology
    }
}

/// Number of distinct routes serving each stop.
///
/// A route that visits a stop several times (loops, or both directions)
/// counts once. Every stop in `stops` appears in the result, unserved stops
/// with zero.
pub fn compute_route_counts(
    stops: &[BusStop],
    topology: &ServiceTopology,
) -> HashMap<StopIdentifier, u32> {
    let mut counts: HashMap<StopIdentifier, u32> =
        stops.iter().map(|s| (s.id.clone(), 0)).collect();

    for sequences in topology.routes.values() {
        let served: HashSet<&StopIdentifier> = sequences.iter().flatten().collect();
        for stop in served {
            if let Some(count) = counts.get_mut(stop) {
                *count += 1;
            }
        }
    }

    counts
}

/// Write route counts into the stops themselves.
pub fn apply_route_counts(stops: &mut [BusStop], topology: &ServiceTopology) {
    let counts = compute_route_counts(stops, topology);
    for stop in stops.iter_mut() {
        stop.route_count = counts.get(&stop.id).copied().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::Point;

    fn stop(id: &str) -> BusStop {
        BusStop {
            id: StopIdentifier::new(id),
            name: id.to_string(),
            location: Point::new(0.0, 0.0),
            direction: None,
            route_count: 0,
        }
    }

    fn seq(ids: &[&str]) -> Vec<StopIdentifier> {
        ids.iter().map(StopIdentifier::new).collect()
    }

    #[test]
    fn test_loop_route_counts_once() {
        let stops = vec![stop("A"), stop("B"), stop("C"), stop("D")];
        let topology: ServiceTopology =
            [(RouteIdentifier::new("1"), seq(&["A", "B", "A", "C"]))]
                .into_iter()
                .collect();

        let counts = compute_route_counts(&stops, &topology);
        assert_eq!(counts[&StopIdentifier::new("A")], 1);
        assert_eq!(counts[&StopIdentifier::new("C")], 1);
        assert_eq!(counts[&StopIdentifier::new("D")], 0);
    }

    #[test]
    fn test_distinct_routes_across_directions() {
        let mut stops = vec![stop("A"), stop("B")];
        let mut topology = ServiceTopology::new();
        topology.add_sequence(RouteIdentifier::new("1"), seq(&["A", "B"]));
        topology.add_sequence(RouteIdentifier::new("1"), seq(&["B", "A"]));
        topology.add_sequence(RouteIdentifier::new("2"), seq(&["A", "Z"]));

        apply_route_counts(&mut stops, &topology);
        assert_eq!(stops[0].route_count, 2);
        assert_eq!(stops[1].route_count, 1);
    }
}
