//! Per-city transit network service.
//!
//! Dispatches each city to its configured sources, runs them concurrently,
//! and keeps the reconstructed networks in a TTL cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;

pub use cache::{CacheEntry, CacheKey, Clock, ManualClock, Subsystem, SystemClock, TtlCache};
pub use config::{
    BusSource, CityConfig, CityRegistry, GraphQuery, NetworkKind, NetworkSource,
    RidershipSource, ServiceConfig, ServiceSettings,
};
pub use error::FetchError;
pub use http::HttpFetcher;
pub use metrics::{BusyStop, NetworkReport, TransitMetrics};
pub use orchestrator::TransitService;

// Re-export transit from the transit crate
pub use metroscope_transit as transit;
