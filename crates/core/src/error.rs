use metroscope_transit::{CityIdentifier, TransitError, UpstreamError};

/// Failures of one per-city fetch.
///
/// Only the orchestrator's fallible entry points return these; the
/// infallible ones log them and degrade to empty results.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Failed to parse upstream data: {0}")]
    Parse(#[from] TransitError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unknown city: {0}")]
    UnknownCity(CityIdentifier),

    #[error("Every configured source failed for {city}")]
    AllSourcesFailed { city: CityIdentifier },
}
