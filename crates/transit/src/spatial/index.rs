//! R-tree over line vertices for nearest-line lookups.
//!
//! ## Two-Stage Filtering
//!
//! 1. **R-tree filter**: vertices are projected onto an equirectangular plane
//!    centred on the network's mean latitude, so Euclidean nearest neighbours
//!    approximate geodesic ones at city scale.
//! 2. **Haversine filter**: the closest few candidates are re-ranked by
//!    great-circle distance.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::models::types::{Line, Point};

/// Candidates re-ranked by haversine distance after the R-tree pass
const HAVERSINE_CANDIDATES: usize = 8;

#[derive(Clone, Debug)]
pub struct LineVertexNode {
    pub line: usize,
    pub location: Point,
    projected: [f64; 2],
}

impl RTreeObject for LineVertexNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.projected)
    }
}

impl PointDistance for LineVertexNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.projected[0] - point[0];
        let dy = self.projected[1] - point[1];
        dx * dx + dy * dy
    }
}

pub struct LineVertexIndex {
    tree: RTree<LineVertexNode>,
    lon_scale: f64,
}

impl LineVertexIndex {
    /// Index every `stride`-th vertex of each stroke. Stroke endpoints are
    /// always kept so short lines never vanish from the index.
    pub fn build(lines: &[Line], stride: usize) -> Self {
        let stride = stride.max(1);

        let (sum, count) = lines
            .iter()
            .flat_map(|l| l.coordinates.iter())
            .fold((0.0, 0usize), |(sum, count), p| (sum + p.lat, count + 1));
        let mean_lat = if count == 0 { 0.0 } else { sum / count as f64 };
        let lon_scale = mean_lat.to_radians().cos();

        let mut nodes = Vec::new();
        for (line_idx, line) in lines.iter().enumerate() {
            for stroke in line.strokes() {
                let last = stroke.len().saturating_sub(1);
                for (i, p) in stroke.iter().enumerate() {
                    if i % stride == 0 || i == last {
                        nodes.push(LineVertexNode {
                            line: line_idx,
                            location: *p,
                            projected: [p.lon * lon_scale, p.lat],
                        });
                    }
                }
            }
        }

        Self {
            tree: RTree::bulk_load(nodes),
            lon_scale,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Index of the nearest line and the distance to it in meters.
    pub fn nearest_line(&self, point: Point) -> Option<(usize, f64)> {
        let query = [point.lon * self.lon_scale, point.lat];
        self.tree
            .nearest_neighbor_iter(&query)
            .take(HAVERSINE_CANDIDATES)
            .map(|node| (node.line, point.haversine_to(&node.location)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::LineKey;

    fn line(name: &str, coords: &[(f64, f64)]) -> Line {
        Line::from_segments(
            LineKey::new(name),
            name.to_lowercase(),
            vec![coords.iter().map(|&(lat, lon)| Point::new(lat, lon)).collect()],
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_line() {
        let lines = vec![
            line("West", &[(19.0, 72.80), (19.1, 72.80), (19.2, 72.80)]),
            line("East", &[(19.0, 72.90), (19.1, 72.90), (19.2, 72.90)]),
        ];
        let index = LineVertexIndex::build(&lines, 1);

        let (idx, dist) = index.nearest_line(Point::new(19.1, 72.89)).unwrap();
        assert_eq!(idx, 1);
        assert!(dist < 2_000.0);

        let (idx, _) = index.nearest_line(Point::new(19.05, 72.81)).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_stride_keeps_endpoints() {
        let coords: Vec<(f64, f64)> = (0..10).map(|i| (i as f64 * 0.01, 0.0)).collect();
        let index = LineVertexIndex::build(&[line("A", &coords)], 4);
        // 0, 4, 8 and the final vertex 9
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_empty_index() {
        let index = LineVertexIndex::build(&[], 1);
        assert!(index.is_empty());
        assert!(index.nearest_line(Point::new(0.0, 0.0)).is_none());
    }
}
