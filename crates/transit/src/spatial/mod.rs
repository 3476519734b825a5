//! Spatial indexing and distance calculations.

pub mod index;
pub mod queries;

pub use index::LineVertexIndex;
pub use queries::{centroid, haversine_distance};
