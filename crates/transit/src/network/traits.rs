//! Pluggable networking traits.
//!
//! The reconstruction library never performs I/O itself. Callers supply a
//! [`DataFetcher`]; the orchestrator ships an HTTP one and tests use
//! in-memory fakes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// One upstream call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UpstreamRequest {
    Get { url: String },
    /// Query endpoints that take the query text as the request body
    Post { url: String, body: String },
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::Get { url: url.into() }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Post {
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Get { url } | Self::Post { url, .. } => url,
        }
    }
}

impl fmt::Display for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get { url } => write!(f, "GET {url}"),
            Self::Post { url, .. } => write!(f, "POST {url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<u8>, UpstreamError>> + Send + 'a>>;

/// Fetch raw bytes from an upstream source
pub trait DataFetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a UpstreamRequest) -> FetchFuture<'a>;
}
