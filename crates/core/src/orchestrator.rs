//! Per-city fetch orchestration.
//!
//! Looks up a city's sources, runs them concurrently, and caches the
//! combined network. A failing source leaves its part of the network empty;
//! only a city whose every source fails is treated as a failed refresh.

use std::collections::HashMap;
use std::sync::Arc;

use metroscope_transit::{
    CityIdentifier, DataFetcher, LineKey, LineNetwork, RidershipSummary, TransitNetwork,
};

use crate::cache::{CacheKey, Clock, Subsystem, SystemClock, TtlCache};
use crate::config::{CityConfig, NetworkKind, ServiceConfig};
use crate::error::FetchError;
use crate::metrics::{NetworkReport, TransitMetrics};
use crate::pipeline::Pipeline;

pub struct TransitService {
    config: ServiceConfig,
    fetcher: Arc<dyn DataFetcher>,
    networks: TtlCache<TransitNetwork>,
    ridership: TtlCache<RidershipSummary>,
}

impl TransitService {
    pub fn new(config: ServiceConfig, fetcher: Arc<dyn DataFetcher>) -> Self {
        Self::with_clock(config, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ServiceConfig,
        fetcher: Arc<dyn DataFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = config.settings.cache_ttl();
        Self {
            networks: TtlCache::new(ttl, Arc::clone(&clock)),
            ridership: TtlCache::new(ttl, clock),
            config,
            fetcher,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn city(&self, city: &CityIdentifier) -> Result<&CityConfig, FetchError> {
        self.config
            .cities
            .get(city)
            .ok_or_else(|| FetchError::UnknownCity(city.clone()))
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(self.fetcher.as_ref(), &self.config.settings)
    }

    // ------------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------------

    /// The city's network; never fails.
    ///
    /// Unknown cities and cities whose every source failed (with nothing
    /// cached) yield an empty network.
    pub async fn fetch_transit_network(&self, city: &CityIdentifier) -> Arc<TransitNetwork> {
        match self.try_fetch_transit_network(city).await {
            Ok(network) => network,
            Err(e) => {
                tracing::warn!("{}: serving empty network: {}", city, e);
                Arc::new(TransitNetwork::default())
            }
        }
    }

    /// Like [`fetch_transit_network`](Self::fetch_transit_network), but
    /// reports unknown cities and total failures.
    pub async fn try_fetch_transit_network(
        &self,
        city: &CityIdentifier,
    ) -> Result<Arc<TransitNetwork>, FetchError> {
        let config = self.city(city)?;
        let key = CacheKey::new(Subsystem::Network, city.clone());
        self.networks
            .get_or_refresh(key, || self.assemble_network(city, config))
            .await
    }

    async fn assemble_network(
        &self,
        city: &CityIdentifier,
        config: &CityConfig,
    ) -> Result<TransitNetwork, FetchError> {
        let pipeline = self.pipeline();

        let bus = async {
            match &config.bus {
                Some(source) => Some(pipeline.bus_stops(source).await),
                None => None,
            }
        };
        let metro = self.line_network(&pipeline, config, NetworkKind::Metro);
        let rail = self.line_network(&pipeline, config, NetworkKind::Rail);
        let (bus, metro, rail) = tokio::join!(bus, metro, rail);

        let attempted = [bus.is_some(), metro.is_some(), rail.is_some()]
            .iter()
            .filter(|&&a| a)
            .count();
        let failed = [
            matches!(bus, Some(Err(_))),
            matches!(metro, Some(Err(_))),
            matches!(rail, Some(Err(_))),
        ]
        .iter()
        .filter(|&&f| f)
        .count();

        if attempted > 0 && failed == attempted {
            for error in [bus.and_then(Result::err), metro.and_then(Result::err), rail.and_then(Result::err)]
                .into_iter()
                .flatten()
            {
                tracing::warn!("{}: {}", city, error);
            }
            return Err(FetchError::AllSourcesFailed { city: city.clone() });
        }

        let bus_stops = degrade(city, "bus", bus).unwrap_or_default();
        let metro = degrade(city, "metro", metro).unwrap_or_default();
        let rail = degrade(city, "rail", rail).unwrap_or_default();

        let network = TransitNetwork {
            bus_stops,
            metro_stations: metro.stations,
            metro_lines: metro.lines,
            rail_stations: rail.stations,
            rail_lines: rail.lines,
        };

        tracing::info!(
            "{}: {} bus stops, {} metro lines / {} stations, {} rail lines / {} stations",
            city,
            network.bus_stops.len(),
            network.metro_lines.len(),
            network.metro_stations.len(),
            network.rail_lines.len(),
            network.rail_stations.len()
        );

        Ok(network)
    }

    async fn line_network(
        &self,
        pipeline: &Pipeline<'_>,
        config: &CityConfig,
        kind: NetworkKind,
    ) -> Option<Result<LineNetwork, FetchError>> {
        let source = config.network(kind)?;
        Some(pipeline.line_network(source, kind, config.vocabulary(kind)).await)
    }

    // ------------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------------

    pub async fn fetch_transit_metrics(&self, city: &CityIdentifier) -> NetworkReport {
        let network = self.fetch_transit_network(city).await;
        let metrics = TransitMetrics::derive(&network, self.config.settings.top_busiest_stops);
        NetworkReport { network, metrics }
    }

    // ------------------------------------------------------------------------
    // Ridership
    // ------------------------------------------------------------------------

    /// Ridership summary, or `None` when the city has no ridership source
    /// or it could not be read.
    pub async fn fetch_ridership(&self, city: &CityIdentifier) -> Option<Arc<RidershipSummary>> {
        match self.try_fetch_ridership(city).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("{}: ridership unavailable: {}", city, e);
                None
            }
        }
    }

    pub async fn try_fetch_ridership(
        &self,
        city: &CityIdentifier,
    ) -> Result<Option<Arc<RidershipSummary>>, FetchError> {
        let config = self.city(city)?;
        let Some(source) = &config.ridership else {
            return Ok(None);
        };

        let key = CacheKey::new(Subsystem::Ridership, city.clone());
        self.ridership
            .get_or_refresh(key, || async {
                // Stations attribute ridership to lines
                let network = self.fetch_transit_network(city).await;
                let station_lines: HashMap<String, LineKey> = network
                    .all_stations()
                    .map(|s| (s.name.clone(), s.line_key.clone()))
                    .collect();
                self.pipeline().ridership(source, &station_lines).await
            })
            .await
            .map(Some)
    }
}

fn degrade<T>(
    city: &CityIdentifier,
    source: &str,
    result: Option<Result<T, FetchError>>,
) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{}: {} source failed, leaving it empty: {}", city, source, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeDelta;
    use metroscope_transit::{FetchFuture, UpstreamError, UpstreamRequest};

    use crate::cache::ManualClock;
    use crate::config::{BusSource, CityRegistry, GraphQuery, NetworkSource, RidershipSource};

    /// Serves canned bodies by URL and counts every call
    #[derive(Default)]
    struct CountingFetcher {
        bodies: Mutex<HashMap<String, Result<Vec<u8>, u16>>>,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn serve(&self, url: &str, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), Ok(body.as_bytes().to_vec()));
        }

        fn fail(&self, url: &str, status: u16) {
            self.bodies.lock().unwrap().insert(url.to_string(), Err(status));
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataFetcher for CountingFetcher {
        fn fetch<'a>(&'a self, request: &'a UpstreamRequest) -> FetchFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let url = request.url().to_string();
                match self.bodies.lock().unwrap().get(&url).cloned() {
                    Some(Ok(body)) => Ok(body),
                    Some(Err(status)) => Err(UpstreamError::Status { url, status }),
                    None => Err(UpstreamError::Transport {
                        url,
                        message: "connection refused".to_string(),
                    }),
                }
            })
        }
    }

    const STOPS_URL: &str = "https://example.org/stops.json";
    const TOPOLOGY_URL: &str = "https://example.org/routes.json";
    const OVERPASS_URL: &str = "https://overpass.example.org/api/interpreter";
    const RIDERSHIP_URL: &str = "https://example.org/ridership.csv";

    const STOPS: &str = r#"{"1": [72.80, 19.00, "Gate"], "2": [72.81, 19.01, "Market"]}"#;
    const TOPOLOGY: &str = r#"{"A": [["1", "2"]], "B": [["2"]]}"#;
    const GRAPH: &str = r#"{"elements": [
        {"type": "node", "id": 1, "lat": 19.00, "lon": 72.80},
        {"type": "node", "id": 2, "lat": 19.05, "lon": 72.82},
        {"type": "node", "id": 3, "lat": 19.05, "lon": 72.821,
         "tags": {"railway": "station", "name": "Dadar"}},
        {"type": "way", "id": 10, "nodes": [1, 2]},
        {"type": "relation", "id": 100,
         "tags": {"type": "route", "route": "subway", "name": "Line 1 Up"},
         "members": [{"type": "way", "ref": 10, "role": ""}]}
    ]}"#;
    const RIDERSHIP: &str = "2024-01-01;8;Dadar;100\n2024-01-02;8;dadar;200\n";

    fn city() -> CityIdentifier {
        CityIdentifier::new("mumbai")
    }

    fn config() -> ServiceConfig {
        let mut cities = CityRegistry::new();
        cities.insert(
            city(),
            CityConfig {
                name: "Mumbai".to_string(),
                bus: Some(BusSource::PointTopology {
                    stops_url: STOPS_URL.to_string(),
                    topology_url: Some(TOPOLOGY_URL.to_string()),
                }),
                metro: Some(NetworkSource::GraphRelation(GraphQuery {
                    endpoint: OVERPASS_URL.to_string(),
                    query: "[out:json];relation[route=subway];out geom;".to_string(),
                    route_kinds: Vec::new(),
                    merge_corridors: true,
                })),
                ridership: Some(RidershipSource {
                    url: RIDERSHIP_URL.to_string(),
                    entry: None,
                }),
                metro_vocabulary: metroscope_transit::LineVocabulary::from_pairs([("Line 1", "blue")]),
                ..Default::default()
            },
        );
        ServiceConfig {
            cities,
            ..Default::default()
        }
    }

    fn service(fetcher: &Arc<CountingFetcher>, clock: &Arc<ManualClock>) -> TransitService {
        TransitService::with_clock(config(), fetcher.clone(), clock.clone())
    }

    fn healthy_fetcher() -> Arc<CountingFetcher> {
        let fetcher = Arc::new(CountingFetcher::default());
        fetcher.serve(STOPS_URL, STOPS);
        fetcher.serve(TOPOLOGY_URL, TOPOLOGY);
        fetcher.serve(OVERPASS_URL, GRAPH);
        fetcher.serve(RIDERSHIP_URL, RIDERSHIP);
        fetcher
    }

    #[tokio::test]
    async fn test_network_from_all_sources() {
        let fetcher = healthy_fetcher();
        let service = service(&fetcher, &Arc::new(ManualClock::default()));

        let network = service.try_fetch_transit_network(&city()).await.unwrap();

        assert_eq!(network.bus_stops.len(), 2);
        let market = network.bus_stops.iter().find(|s| s.name == "Market").unwrap();
        assert_eq!(market.route_count, 2);
        assert_eq!(network.metro_lines.len(), 1);
        assert_eq!(network.metro_lines[0].name, LineKey::new("Line 1"));
        assert_eq!(network.metro_stations[0].line_key, LineKey::new("Line 1"));
        assert!(network.rail_lines.is_empty());
    }

    #[tokio::test]
    async fn test_cache_freshness() {
        let fetcher = healthy_fetcher();
        let clock = Arc::new(ManualClock::default());
        let service = service(&fetcher, &clock);

        let first = service.fetch_transit_network(&city()).await;
        let per_refresh = fetcher.calls();
        assert_eq!(per_refresh, 3);

        let second = service.fetch_transit_network(&city()).await;
        assert_eq!(fetcher.calls(), per_refresh);
        assert!(Arc::ptr_eq(&first, &second));

        clock.advance(TimeDelta::hours(24) + TimeDelta::seconds(1));
        let third = service.fetch_transit_network(&city()).await;
        assert_eq!(fetcher.calls(), 2 * per_refresh);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }

    #[tokio::test]
    async fn test_failing_metro_degrades_to_empty() {
        let fetcher = healthy_fetcher();
        fetcher.fail(OVERPASS_URL, 504);
        let service = service(&fetcher, &Arc::new(ManualClock::default()));

        let network = service.try_fetch_transit_network(&city()).await.unwrap();

        assert!(!network.bus_stops.is_empty());
        assert!(network.metro_stations.is_empty());
        assert!(network.metro_lines.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_topology_leaves_counts_at_zero() {
        let fetcher = healthy_fetcher();
        fetcher.serve(TOPOLOGY_URL, "<html>maintenance</html>");
        let service = service(&fetcher, &Arc::new(ManualClock::default()));

        let network = service.try_fetch_transit_network(&city()).await.unwrap();

        assert_eq!(network.bus_stops.len(), 2);
        assert!(network.bus_stops.iter().all(|s| s.route_count == 0));
        assert_eq!(network.metro_lines.len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_serves_stale_network() {
        let fetcher = healthy_fetcher();
        let clock = Arc::new(ManualClock::default());
        let service = service(&fetcher, &clock);
        let first = service.fetch_transit_network(&city()).await;

        fetcher.fail(STOPS_URL, 500);
        fetcher.fail(OVERPASS_URL, 500);
        clock.advance(TimeDelta::days(2));

        let served = service.fetch_transit_network(&city()).await;
        assert!(Arc::ptr_eq(&first, &served));
    }

    #[tokio::test]
    async fn test_total_failure_without_cache() {
        let fetcher = Arc::new(CountingFetcher::default());
        let service = service(&fetcher, &Arc::new(ManualClock::default()));

        assert!(matches!(
            service.try_fetch_transit_network(&city()).await,
            Err(FetchError::AllSourcesFailed { .. })
        ));
        assert!(service.fetch_transit_network(&city()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_city() {
        let fetcher = healthy_fetcher();
        let service = service(&fetcher, &Arc::new(ManualClock::default()));
        let nowhere = CityIdentifier::new("atlantis");

        assert!(matches!(
            service.try_fetch_transit_network(&nowhere).await,
            Err(FetchError::UnknownCity(_))
        ));
        assert!(service.fetch_transit_network(&nowhere).await.is_empty());
        assert!(service.fetch_ridership(&nowhere).await.is_none());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_metrics_wrap_cached_network() {
        let fetcher = healthy_fetcher();
        let service = service(&fetcher, &Arc::new(ManualClock::default()));

        let network = service.fetch_transit_network(&city()).await;
        let report = service.fetch_transit_metrics(&city()).await;

        assert!(Arc::ptr_eq(&network, &report.network));
        assert_eq!(report.metrics.total_bus_stops, 2);
        assert_eq!(report.metrics.busiest_stops[0].name, "Market");
        assert!((report.metrics.average_routes_per_stop - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ridership_by_line() {
        let fetcher = healthy_fetcher();
        let service = service(&fetcher, &Arc::new(ManualClock::default()));

        let summary = service.fetch_ridership(&city()).await.unwrap();

        assert_eq!(summary.total_daily_average, 150);
        assert_eq!(summary.busiest_stations.len(), 1);
        assert_eq!(summary.busiest_stations[0].name, "Dadar");
        assert_eq!(summary.ridership_by_line.get("Line 1"), Some(&150));
        assert_eq!(summary.peak_hours[8], 150);
    }

    #[tokio::test]
    async fn test_no_ridership_source() {
        let fetcher = healthy_fetcher();
        let mut config = config();
        let mut cities = CityRegistry::new();
        let mut mumbai = config.cities.get(&city()).unwrap().clone();
        mumbai.ridership = None;
        cities.insert(city(), mumbai);
        config.cities = cities;
        let service = TransitService::with_clock(config, fetcher.clone(), Arc::new(ManualClock::default()));

        assert!(service.try_fetch_ridership(&city()).await.unwrap().is_none());
        assert_eq!(fetcher.calls(), 0);
    }
}
