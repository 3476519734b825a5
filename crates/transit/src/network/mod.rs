//! Network and IO abstractions.

pub mod traits;

pub use traits::{DataFetcher, FetchFuture, UpstreamError, UpstreamRequest};
