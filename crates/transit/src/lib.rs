//! # metroscope-transit
//!
//! Reconstructs render-ready transit networks from loosely structured open
//! data.
//!
//! ## Features
//!
//! - **Archive reader**: extract entries from an in-memory zip container
//! - **Graph assembly**: chain relation member ways into continuous lines
//! - **Corridor merging**: collapse direction/service variants of one route
//! - **Station matching**: vocabulary and nearest-line assignment
//! - **Feeds and dumps**: scheduling archives, point-topology JSON, GeoJSON
//! - **Ridership**: daily averages from semicolon-delimited logs
//! - **Pluggable networking**: no I/O here; implement [`DataFetcher`]
//!
//! ## Example
//!
//! ```
//! use metroscope_transit::prelude::*;
//!
//! let json = br#"{"elements": [
//!     {"type": "node", "id": 1, "lat": 28.60, "lon": 77.20},
//!     {"type": "node", "id": 2, "lat": 28.61, "lon": 77.21},
//!     {"type": "node", "id": 3, "lat": 28.61, "lon": 77.211,
//!      "tags": {"railway": "station", "name": "Mandi House"}},
//!     {"type": "way", "id": 10, "nodes": [1, 2]},
//!     {"type": "relation", "id": 100,
//!      "tags": {"type": "route", "route": "subway", "name": "Blue Line Up"},
//!      "members": [{"type": "way", "ref": 10, "role": ""}]}
//! ]}"#;
//!
//! let graph = GraphElements::from_json(json).unwrap();
//! let vocabulary = LineVocabulary::from_pairs([("Blue", "blue")]);
//! let network = build_line_network(&graph, &["subway".to_string()], Some(&vocabulary), true, 1);
//!
//! assert_eq!(network.lines[0].name, LineKey::new("Blue"));
//! assert_eq!(network.stations[0].line_key, LineKey::new("Blue"));
//! ```

pub mod archive;
pub mod direct;
pub mod export;
pub mod graph;
pub mod identifiers;
pub mod matching;
pub mod models;
pub mod network;
pub mod ridership;
pub mod schedule;
pub mod spatial;
pub mod tabular;

// Re-exports for convenience
pub mod prelude {
    pub use crate::archive::{extract_entry, extract_text, first_entry, ArchiveError};
    pub use crate::graph::{build_bus_stops, build_line_network, build_lines, GraphElements};
    pub use crate::identifiers::*;
    pub use crate::matching::{
        assign_stations_to_lines, compute_route_counts, LineVocabulary, MatchStrategy,
        ServiceTopology,
    };
    pub use crate::models::types::*;
    pub use crate::network::traits::*;
    pub use crate::ridership::{aggregate_ridership, RidershipAccumulator, RidershipRecord};
    pub use crate::schedule::ScheduleFeed;
}

pub use prelude::*;
