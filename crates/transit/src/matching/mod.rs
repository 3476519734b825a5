//! Line identity and station assignment.

pub mod routes;
pub mod stations;
pub mod vocabulary;

pub use routes::{apply_route_counts, compute_route_counts, ServiceTopology};
pub use stations::{assign_stations_to_lines, dedupe_by_name, name_hint};
pub use vocabulary::{LineVocabulary, MatchStrategy, VocabularyEntry};

/// Default stride when indexing line vertices for station matching
pub const DEFAULT_MATCH_STRIDE: usize = 1;
