//! Source-specific pipelines.
//!
//! Each pipeline turns one configured source into its part of the network:
//! fetch, parse, assemble, match. Parsing runs inline on the calling task.

use std::collections::HashMap;

use futures_util::future;
use metroscope_transit::archive::{self, bytes_to_text};
use metroscope_transit::direct::{parse_geojson_network, parse_point_topology, parse_service_topology};
use metroscope_transit::matching::{apply_route_counts, assign_stations_to_lines};
use metroscope_transit::tabular::parse_ridership_log;
use metroscope_transit::{
    BusStop, DataFetcher, GraphElements, Line, LineKey, LineNetwork, LineVocabulary,
    RidershipSummary, ScheduleFeed, StationCandidate, TransitError, UpstreamRequest,
    build_bus_stops, build_lines,
};

use crate::config::{
    BUS_ROUTE_KINDS, BUS_ROUTE_TYPES, BusSource, GraphQuery, NetworkKind, NetworkSource,
    RidershipSource, ServiceSettings,
};
use crate::error::FetchError;

/// Local file header magic of a zip container
const ARCHIVE_MAGIC: &[u8] = b"PK\x03\x04";

pub struct Pipeline<'a> {
    fetcher: &'a dyn DataFetcher,
    settings: &'a ServiceSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(fetcher: &'a dyn DataFetcher, settings: &'a ServiceSettings) -> Self {
        Self { fetcher, settings }
    }

    async fn fetch(&self, request: UpstreamRequest) -> Result<Vec<u8>, FetchError> {
        Ok(self.fetcher.fetch(&request).await?)
    }

    async fn fetch_graph(&self, query: &GraphQuery) -> Result<GraphElements, FetchError> {
        let bytes = self
            .fetch(UpstreamRequest::post(&query.endpoint, &query.query))
            .await?;
        Ok(GraphElements::from_json(&bytes)?)
    }

    async fn fetch_feed(&self, url: &str) -> Result<ScheduleFeed, FetchError> {
        let bytes = self.fetch(UpstreamRequest::get(url)).await?;
        Ok(ScheduleFeed::from_archive(&bytes)?)
    }

    // ------------------------------------------------------------------------
    // Bus
    // ------------------------------------------------------------------------

    pub async fn bus_stops(&self, source: &BusSource) -> Result<Vec<BusStop>, FetchError> {
        match source {
            BusSource::PointTopology {
                stops_url,
                topology_url,
            } => {
                let stops = self.fetch(UpstreamRequest::get(stops_url));
                let topology = async {
                    match topology_url {
                        Some(url) => Some(self.fetch(UpstreamRequest::get(url)).await),
                        None => None,
                    }
                };
                let (stops, topology) = future::join(stops, topology).await;

                let mut stops = parse_point_topology(&stops?)?;
                let topology = topology.map(|fetched| {
                    fetched.and_then(|bytes| Ok(parse_service_topology(&bytes)?))
                });
                match topology {
                    Some(Ok(topology)) => apply_route_counts(&mut stops, &topology),
                    Some(Err(e)) => {
                        tracing::warn!("service topology unavailable, route counts stay at zero: {}", e);
                    }
                    None => {}
                }
                Ok(stops)
            }
            BusSource::ArchiveFeed { url, route_types } => {
                let feed = self.fetch_feed(url).await?;
                let route_types = if route_types.is_empty() {
                    BUS_ROUTE_TYPES
                } else {
                    route_types.as_slice()
                };
                Ok(feed.bus_stops(route_types))
            }
            BusSource::GraphRelation(query) => {
                let graph = self.fetch_graph(query).await?;
                let kinds = if query.route_kinds.is_empty() {
                    BUS_ROUTE_KINDS.iter().map(|k| k.to_string()).collect()
                } else {
                    query.route_kinds.clone()
                };
                Ok(build_bus_stops(&graph, &kinds))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Metro / rail
    // ------------------------------------------------------------------------

    /// Stations and lines of one network kind.
    ///
    /// Hybrid sources fetch both halves concurrently; the stations of one
    /// are matched against the lines of the other.
    pub async fn line_network(
        &self,
        source: &NetworkSource,
        kind: NetworkKind,
        vocabulary: &LineVocabulary,
    ) -> Result<LineNetwork, FetchError> {
        let (candidates, lines) = match source {
            NetworkSource::Hybrid { stations, lines } => {
                let (stations, lines) = future::join(
                    self.network_parts(stations, kind, vocabulary),
                    self.network_parts(lines, kind, vocabulary),
                )
                .await;
                (stations?.0, lines?.1)
            }
            other => self.network_parts(other, kind, vocabulary).await?,
        };

        let stations = assign_stations_to_lines(candidates, &lines, self.settings.match_stride);
        tracing::debug!(
            "{} network: {} lines, {} stations",
            kind.as_str(),
            lines.len(),
            stations.len()
        );
        Ok(LineNetwork { stations, lines })
    }

    /// Unmatched station candidates and lines of a single, non-hybrid source
    async fn network_parts(
        &self,
        source: &NetworkSource,
        kind: NetworkKind,
        vocabulary: &LineVocabulary,
    ) -> Result<(Vec<StationCandidate>, Vec<Line>), FetchError> {
        let vocabulary = (!vocabulary.is_empty()).then_some(vocabulary);

        match source {
            NetworkSource::DirectJson { url } => {
                let bytes = self.fetch(UpstreamRequest::get(url)).await?;
                Ok(parse_geojson_network(&bytes, vocabulary)?)
            }
            NetworkSource::GraphRelation(query) => {
                let graph = self.fetch_graph(query).await?;
                let kinds = if query.route_kinds.is_empty() {
                    kind.default_route_kinds()
                } else {
                    query.route_kinds.clone()
                };
                let lines = build_lines(&graph, &kinds, vocabulary, query.merge_corridors);
                Ok((graph.station_candidates(), lines))
            }
            NetworkSource::ArchiveFeed { url, route_types } => {
                let feed = self.fetch_feed(url).await?;
                let route_types = if route_types.is_empty() {
                    kind.default_route_types()
                } else {
                    route_types.clone()
                };
                Ok((
                    feed.station_candidates(&route_types),
                    feed.lines(&route_types, vocabulary),
                ))
            }
            NetworkSource::Hybrid { .. } => Err(TransitError::InvalidData(
                "hybrid sources cannot be nested".to_string(),
            )
            .into()),
        }
    }

    // ------------------------------------------------------------------------
    // Ridership
    // ------------------------------------------------------------------------

    pub async fn ridership(
        &self,
        source: &RidershipSource,
        station_lines: &HashMap<String, LineKey>,
    ) -> Result<RidershipSummary, FetchError> {
        let bytes = self.fetch(UpstreamRequest::get(&source.url)).await?;

        let text = match &source.entry {
            Some(entry) => archive::extract_text(&bytes, entry).map_err(TransitError::from)?,
            None if bytes.starts_with(ARCHIVE_MAGIC) => {
                let (name, data) = archive::first_entry(&bytes).map_err(TransitError::from)?;
                tracing::debug!("ridership log read from archive entry {}", name);
                bytes_to_text(data)
            }
            None => bytes_to_text(bytes),
        };

        Ok(parse_ridership_log(&text)?.summarize(station_lines))
    }
}
