//! Network data model and error types.

pub mod types;

// Re-exports for convenience
pub use types::{
    BusStop, DateRange, Line, LineNetwork, Point, RidershipSummary, Station, StationCandidate,
    StationRidership, TransitError, TransitNetwork, Result, FALLBACK_COLOR_TOKEN,
    FALLBACK_LINE_KEY,
};
