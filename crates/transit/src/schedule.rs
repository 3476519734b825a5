//! Scheduling feed mapping.
//!
//! A feed is a compressed archive of comma-delimited tables. Only `stops`
//! and `shapes` are required; `routes`, `trips` and `stop_times` enrich the
//! result when present (route colors and names, route counts, filtering by
//! route type).

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::archive::{self, bytes_to_text, ArchiveError};
use crate::identifiers::{LineKey, RouteIdentifier, StopIdentifier};
use crate::matching::{apply_route_counts, assign_stations_to_lines, LineVocabulary, ServiceTopology};
use crate::models::types::{
    BusStop, Line, LineNetwork, Point, Result, StationCandidate, FALLBACK_COLOR_TOKEN,
};
use crate::tabular::{parse_feed_table, Record};

pub const STOPS: &str = "stops.txt";
pub const SHAPES: &str = "shapes.txt";
pub const ROUTES: &str = "routes.txt";
pub const TRIPS: &str = "trips.txt";
pub const STOP_TIMES: &str = "stop_times.txt";

const REQUIRED_TABLES: [&str; 2] = [STOPS, SHAPES];
const ALL_TABLES: [&str; 5] = [STOPS, SHAPES, ROUTES, TRIPS, STOP_TIMES];

/// Location type of a parent station in the stops table
const LOCATION_TYPE_STATION: &str = "1";

/// Parsed tables of one scheduling feed.
#[derive(Clone, Debug, Default)]
pub struct ScheduleFeed {
    pub stops: Vec<Record>,
    pub shapes: Vec<Record>,
    pub routes: Vec<Record>,
    pub trips: Vec<Record>,
    pub stop_times: Vec<Record>,
}

impl ScheduleFeed {
    /// Read every known table from the archive in one scan.
    ///
    /// A missing required table is a hard error; optional tables default to
    /// empty.
    pub fn from_archive(archive_bytes: &[u8]) -> Result<Self> {
        let mut tables = archive::extract_many(archive_bytes, &ALL_TABLES)?;

        if let Some(missing) = REQUIRED_TABLES.iter().find(|t| !tables.contains_key(**t)) {
            return Err(ArchiveError::EntryNotFound {
                name: missing.to_string(),
            }
            .into());
        }

        let mut table = |name: &str| -> Result<Vec<Record>> {
            match tables.remove(name) {
                Some(bytes) => parse_feed_table(&bytes_to_text(bytes)),
                None => Ok(Vec::new()),
            }
        };

        let feed = Self {
            stops: table(STOPS)?,
            shapes: table(SHAPES)?,
            routes: table(ROUTES)?,
            trips: table(TRIPS)?,
            stop_times: table(STOP_TIMES)?,
        };

        tracing::debug!(
            "schedule feed: {} stops, {} shape points, {} routes, {} trips, {} stop times",
            feed.stops.len(),
            feed.shapes.len(),
            feed.routes.len(),
            feed.trips.len(),
            feed.stop_times.len()
        );

        Ok(feed)
    }

    /// Boarding stops (not parent stations) with their route counts.
    pub fn bus_stops(&self, route_types: &[u32]) -> Vec<BusStop> {
        let served = self.served_stops(route_types);
        let mut stops: Vec<BusStop> = self
            .stops
            .iter()
            .filter(|r| r.field("location_type") != LOCATION_TYPE_STATION)
            .filter(|r| served.as_ref().map_or(true, |s| s.contains(r.field("stop_id"))))
            .filter_map(|r| {
                Some(BusStop {
                    id: StopIdentifier::new(r.non_empty("stop_id")?),
                    name: r.field("stop_name").to_string(),
                    location: stop_location(r)?,
                    direction: r.non_empty("stop_desc").map(str::to_string),
                    route_count: 0,
                })
            })
            .collect();

        apply_route_counts(&mut stops, &self.service_topology(route_types));
        stops
    }

    /// Distinct stop sequences of every route, from `stop_times` ordered by
    /// `stop_sequence` and attributed to routes through `trips`.
    pub fn service_topology(&self, route_types: &[u32]) -> ServiceTopology {
        let trip_routes = self.trip_routes(route_types);

        let mut by_trip: BTreeMap<&str, Vec<(u32, &str)>> = BTreeMap::new();
        for st in &self.stop_times {
            let (Some(trip), Some(stop)) = (st.non_empty("trip_id"), st.non_empty("stop_id")) else {
                continue;
            };
            by_trip
                .entry(trip)
                .or_default()
                .push((st.get_u32("stop_sequence").unwrap_or(0), stop));
        }

        let mut topology = ServiceTopology::new();
        let mut seen: HashSet<(&str, Vec<&str>)> = HashSet::new();

        for (trip, mut visits) in by_trip {
            let Some(&route) = trip_routes.get(trip) else {
                continue;
            };
            visits.sort_by_key(|&(seq, _)| seq);
            let sequence: Vec<&str> = visits.into_iter().map(|(_, stop)| stop).collect();
            if seen.insert((route, sequence.clone())) {
                topology.add_sequence(
                    RouteIdentifier::new(route),
                    sequence.into_iter().map(StopIdentifier::new).collect(),
                );
            }
        }

        topology
    }

    /// Parent stations when the feed declares any, otherwise every stop.
    pub fn station_candidates(&self, route_types: &[u32]) -> Vec<StationCandidate> {
        let has_stations = self
            .stops
            .iter()
            .any(|r| r.field("location_type") == LOCATION_TYPE_STATION);
        let served = self.served_stops(route_types);

        self.stops
            .iter()
            .filter(|r| !has_stations || r.field("location_type") == LOCATION_TYPE_STATION)
            .filter(|r| served.as_ref().map_or(true, |s| s.contains(r.field("stop_id"))))
            .filter_map(|r| {
                let name = r.non_empty("stop_name")?;
                Some(StationCandidate::new(name, stop_location(r)?))
            })
            .collect()
    }

    /// One line per route, drawn with the longest shape its trips use.
    ///
    /// Feeds without routes or trips yield one line per shape. With a
    /// vocabulary, routes matching no entry are dropped and the entry
    /// supplies the line's name and color.
    pub fn lines(&self, route_types: &[u32], vocabulary: Option<&LineVocabulary>) -> Vec<Line> {
        let shapes = self.shape_paths();
        let vocabulary = vocabulary.filter(|v| !v.is_empty());

        let mut lines = Vec::new();
        let mut assembled: HashSet<String> = HashSet::new();
        let mut push = |key: LineKey, color: String, path: Vec<Point>| {
            if assembled.insert(key.as_str().to_lowercase()) {
                if let Some(line) = Line::from_segments(key, color, vec![path]) {
                    lines.push(line);
                }
            }
        };

        if self.routes.is_empty() || self.trips.is_empty() {
            for (shape_id, path) in shapes {
                if let Some((key, color)) = identify(shape_id, None, vocabulary) {
                    push(key, color, path);
                }
            }
            return lines;
        }

        let mut route_shapes: HashMap<&str, HashSet<&str>> = HashMap::new();
        for trip in &self.trips {
            if let (Some(route), Some(shape)) = (trip.non_empty("route_id"), trip.non_empty("shape_id")) {
                route_shapes.entry(route).or_default().insert(shape);
            }
        }

        for route in self.routes.iter().filter(|r| route_type_matches(r, route_types)) {
            let Some(route_id) = route.non_empty("route_id") else {
                continue;
            };
            let longest = route_shapes
                .get(route_id)
                .into_iter()
                .flatten()
                .filter_map(|shape| shapes.get(shape))
                .max_by_key(|path| path.len());
            let Some(path) = longest else {
                tracing::debug!("route {} has no usable shape", route_id);
                continue;
            };

            let name = route
                .non_empty("route_long_name")
                .or_else(|| route.non_empty("route_short_name"))
                .unwrap_or(route_id);
            let color = route.non_empty("route_color").map(hex_color);
            if let Some((key, color)) = identify(name, color, vocabulary) {
                push(key, color, path.clone());
            }
        }

        lines
    }

    /// Lines of `route_types` and the stations matched against them.
    pub fn build_line_network(
        &self,
        route_types: &[u32],
        vocabulary: Option<&LineVocabulary>,
        stride: usize,
    ) -> LineNetwork {
        let lines = self.lines(route_types, vocabulary);
        let stations = assign_stations_to_lines(self.station_candidates(route_types), &lines, stride);
        LineNetwork { stations, lines }
    }

    /// Ordered point path of every shape, keyed by shape id.
    fn shape_paths(&self) -> BTreeMap<&str, Vec<Point>> {
        let mut points: BTreeMap<&str, Vec<(u32, Point)>> = BTreeMap::new();
        for r in &self.shapes {
            let Some(shape_id) = r.non_empty("shape_id") else {
                continue;
            };
            let (Some(lat), Some(lon)) = (r.get_f64("shape_pt_lat"), r.get_f64("shape_pt_lon")) else {
                continue;
            };
            let point = Point::new(lat, lon);
            if point.is_finite() {
                points
                    .entry(shape_id)
                    .or_default()
                    .push((r.get_u32("shape_pt_sequence").unwrap_or(0), point));
            }
        }

        points
            .into_iter()
            .map(|(id, mut pts)| {
                pts.sort_by_key(|&(seq, _)| seq);
                (id, pts.into_iter().map(|(_, p)| p).collect())
            })
            .collect()
    }

    /// trip_id -> route_id, limited to routes of `route_types`
    fn trip_routes(&self, route_types: &[u32]) -> HashMap<&str, &str> {
        let allowed: Option<HashSet<&str>> = (!route_types.is_empty()).then(|| {
            self.routes
                .iter()
                .filter(|r| route_type_matches(r, route_types))
                .map(|r| r.field("route_id"))
                .collect()
        });

        self.trips
            .iter()
            .filter_map(|t| Some((t.non_empty("trip_id")?, t.non_empty("route_id")?)))
            .filter(|(_, route)| allowed.as_ref().map_or(true, |a| a.contains(route)))
            .collect()
    }

    /// Stops (and their parent stations) visited by routes of
    /// `route_types`. `None` when no filtering applies.
    fn served_stops(&self, route_types: &[u32]) -> Option<HashSet<&str>> {
        if route_types.is_empty() || self.stop_times.is_empty() {
            return None;
        }

        let trip_routes = self.trip_routes(route_types);
        let mut served: HashSet<&str> = self
            .stop_times
            .iter()
            .filter(|st| trip_routes.contains_key(st.field("trip_id")))
            .map(|st| st.field("stop_id"))
            .collect();

        let parents: Vec<&str> = self
            .stops
            .iter()
            .filter(|r| served.contains(r.field("stop_id")))
            .filter_map(|r| r.non_empty("parent_station"))
            .collect();
        served.extend(parents);

        Some(served)
    }
}

fn stop_location(record: &Record) -> Option<Point> {
    let point = Point::new(record.get_f64("stop_lat")?, record.get_f64("stop_lon")?);
    point.is_finite().then_some(point)
}

fn route_type_matches(route: &Record, route_types: &[u32]) -> bool {
    route_types.is_empty()
        || route
            .get_u32("route_type")
            .map_or(false, |t| route_types.contains(&t))
}

fn hex_color(raw: &str) -> String {
    if raw.starts_with('#') {
        raw.to_string()
    } else {
        format!("#{raw}")
    }
}

/// Key and color for a route name; `None` when a vocabulary rejects it.
fn identify(
    name: &str,
    color: Option<String>,
    vocabulary: Option<&LineVocabulary>,
) -> Option<(LineKey, String)> {
    match vocabulary {
        Some(vocabulary) => {
            let entry = vocabulary.resolve(name)?;
            Some((entry.key(), entry.color.clone()))
        }
        None => Some((
            LineKey::new(name),
            color.unwrap_or_else(|| FALLBACK_COLOR_TOKEN.to_string()),
        )),
    }
}
