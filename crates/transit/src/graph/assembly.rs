//! Relation to line geometry assembly.
//!
//! Ways are chained in member order. Joins require exact coordinate
//! equality; a way that does not touch the end of the current chain starts
//! a new segment instead of being snapped onto it.

use std::collections::HashSet;

use super::corridor::strip_variant_suffixes;
use super::elements::{GraphElements, Relation};
use crate::identifiers::LineKey;
use crate::matching::vocabulary::LineVocabulary;
use crate::models::types::{Line, Point, FALLBACK_COLOR_TOKEN};

/// Chain way coordinate lists into continuous segments.
///
/// A way whose first point equals the end of the current segment is
/// appended as-is; one whose last point matches is reversed first. In both
/// cases the shared join point is not repeated. Anything else closes the
/// current segment and seeds a new one.
pub fn chain_segments(ways: impl IntoIterator<Item = Vec<Point>>) -> Vec<Vec<Point>> {
    let mut segments = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    for way in ways {
        if way.is_empty() {
            continue;
        }
        let Some(&tail) = current.last() else {
            current = way;
            continue;
        };

        if way.first() == Some(&tail) {
            current.extend(way.into_iter().skip(1));
        } else if way.last() == Some(&tail) {
            current.extend(way.into_iter().rev().skip(1));
        } else {
            segments.push(std::mem::replace(&mut current, way));
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Chained segments of one relation's member ways.
///
/// Ways that cannot be resolved (unknown way, missing nodes) are left out.
pub fn relation_segments(graph: &GraphElements, relation: &Relation) -> Vec<Vec<Point>> {
    let mut missing = 0usize;
    let ways: Vec<Vec<Point>> = relation
        .way_refs()
        .filter_map(|id| {
            let resolved = graph.resolve_way(id);
            if resolved.is_none() {
                missing += 1;
            }
            resolved
        })
        .collect();

    if missing > 0 {
        tracing::debug!("relation {}: {} member ways could not be resolved", relation.id, missing);
    }

    chain_segments(ways)
}

/// Assemble one line per vocabulary entry.
///
/// Relations whose name matches nothing are skipped, as are relations
/// resolving to a line that an earlier relation already produced.
pub fn assemble_lines(
    graph: &GraphElements,
    relations: &[Relation],
    vocabulary: &LineVocabulary,
) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut assembled: HashSet<LineKey> = HashSet::new();

    for relation in relations {
        let Some(name) = relation.display_name() else {
            continue;
        };
        let Some(entry) = vocabulary.resolve(name) else {
            tracing::debug!("relation {} ('{}') matches no line", relation.id, name);
            continue;
        };

        let key = entry.key();
        if assembled.contains(&key) {
            continue;
        }

        let segments = relation_segments(graph, relation);
        if let Some(line) = Line::from_segments(key.clone(), entry.color.clone(), segments) {
            tracing::debug!(
                "line {} from relation {} ({} points)",
                key,
                relation.id,
                line.coordinates.len()
            );
            assembled.insert(key);
            lines.push(line);
        }
    }

    lines
}

/// Assemble one line per named relation, for sources without a vocabulary.
///
/// Lines are named after the relation with direction/service suffixes
/// removed and colored by the relation's own colour tag.
pub fn assemble_corridor_lines(graph: &GraphElements, relations: &[Relation]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut assembled: HashSet<String> = HashSet::new();

    for relation in relations {
        let Some(name) = relation.display_name().map(strip_variant_suffixes) else {
            continue;
        };
        if assembled.contains(&name.to_lowercase()) {
            continue;
        }

        let color = relation.colour().unwrap_or(FALLBACK_COLOR_TOKEN);
        let segments = relation_segments(graph, relation);
        if let Some(line) = Line::from_segments(LineKey::new(name), color, segments) {
            assembled.insert(name.to_lowercase());
            lines.push(line);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::elements::{MemberType, Node, RelationMember, Tags, Way};

    fn p(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    fn way_coords(raw: &[(f64, f64)]) -> Vec<Point> {
        raw.iter().map(|&(lat, lon)| p(lat, lon)).collect()
    }

    /// Graph where each way is given by its coordinates; node ids are
    /// shared between ways for identical coordinates.
    fn graph_with_ways(ways: &[(i64, &[(f64, f64)])]) -> GraphElements {
        let mut graph = GraphElements::new();
        let mut coords: Vec<(f64, f64)> = Vec::new();
        for (way_id, points) in ways {
            let mut refs = Vec::new();
            for &c in points.iter() {
                let node_id = match coords.iter().position(|&k| k == c) {
                    Some(i) => i as i64 + 1,
                    None => {
                        coords.push(c);
                        let id = coords.len() as i64;
                        graph.insert_node(Node {
                            id,
                            location: p(c.0, c.1),
                            tags: Tags::new(),
                        });
                        id
                    }
                };
                refs.push(node_id);
            }
            graph.insert_way(Way {
                id: *way_id,
                node_refs: refs,
                tags: Tags::new(),
            });
        }
        graph
    }

    fn relation(id: i64, tags: &[(&str, &str)], ways: &[i64]) -> Relation {
        Relation {
            id,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            members: ways
                .iter()
                .map(|&w| RelationMember {
                    member_type: MemberType::Way,
                    reference: w,
                    role: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_chaining_with_disjoint_way() {
        let segments = chain_segments(vec![
            way_coords(&[(0.0, 0.0), (1.0, 1.0)]),
            way_coords(&[(1.0, 1.0), (2.0, 2.0)]),
            way_coords(&[(5.0, 5.0), (6.0, 6.0)]),
        ]);

        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0],
            way_coords(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)])
        );
        assert_eq!(segments[1], way_coords(&[(5.0, 5.0), (6.0, 6.0)]));
    }

    #[test]
    fn test_chaining_reverses_backwards_way() {
        let segments = chain_segments(vec![
            way_coords(&[(0.0, 0.0), (1.0, 1.0)]),
            way_coords(&[(2.0, 2.0), (1.0, 1.0)]),
        ]);

        assert_eq!(
            segments,
            vec![way_coords(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)])]
        );
    }

    #[test]
    fn test_chaining_requires_exact_equality() {
        let segments = chain_segments(vec![
            way_coords(&[(0.0, 0.0), (1.0, 1.0)]),
            way_coords(&[(1.000_000_1, 1.0), (2.0, 2.0)]),
        ]);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_chaining_skips_empty_ways() {
        assert!(chain_segments(vec![vec![], vec![]]).is_empty());
        assert_eq!(
            chain_segments(vec![vec![], way_coords(&[(0.0, 0.0)])]).len(),
            1
        );
    }

    #[test]
    fn test_assembled_line_keeps_segments() {
        let graph = graph_with_ways(&[
            (1, &[(0.0, 0.0), (1.0, 1.0)]),
            (2, &[(1.0, 1.0), (2.0, 2.0)]),
            (3, &[(5.0, 5.0), (6.0, 6.0)]),
        ]);
        let vocabulary = LineVocabulary::from_pairs([("Blue", "blue")]);
        let relations = vec![relation(10, &[("name", "Blue Line")], &[1, 2, 3])];

        let lines = assemble_lines(&graph, &relations, &vocabulary);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].color_token, "blue");
        assert_eq!(lines[0].coordinates.len(), 5);
        let segments = lines[0].segments.as_ref().unwrap();
        assert_eq!(segments[0].len(), 3);
        assert_eq!(segments[1].len(), 2);
    }

    #[test]
    fn test_variant_relations_yield_one_line() {
        let graph = graph_with_ways(&[(1, &[(0.0, 0.0), (1.0, 1.0)]), (2, &[(1.0, 1.0), (0.0, 0.0)])]);
        let vocabulary = LineVocabulary::from_pairs([("Blue", "blue"), ("Red", "red")]);
        let relations = vec![
            relation(10, &[("name", "Blue Line Up")], &[1]),
            relation(11, &[("name", "Blue Line Down")], &[2]),
            relation(12, &[("name", "Shuttle 4")], &[1]),
        ];

        let lines = assemble_lines(&graph, &relations, &vocabulary);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, LineKey::new("Blue"));
    }

    #[test]
    fn test_relation_without_geometry_yields_no_line() {
        let graph = graph_with_ways(&[(1, &[(0.0, 0.0), (1.0, 1.0)])]);
        let vocabulary = LineVocabulary::from_pairs([("Blue", "blue")]);
        let relations = vec![
            relation(10, &[("name", "Blue")], &[404]),
            relation(11, &[("name", "Blue Line")], &[1]),
        ];

        // The empty first relation does not block the second
        let lines = assemble_lines(&graph, &relations, &vocabulary);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].coordinates.len(), 2);
    }

    #[test]
    fn test_corridor_lines_without_vocabulary() {
        let graph = graph_with_ways(&[(1, &[(0.0, 0.0), (1.0, 1.0)])]);
        let relations = vec![
            relation(10, &[("name", "Western Line (Slow)"), ("colour", "#ff0000")], &[1]),
            relation(11, &[("name", "western line")], &[1]),
            relation(12, &[("name", "Harbour Line")], &[1]),
        ];

        let lines = assemble_corridor_lines(&graph, &relations);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, LineKey::new("Western Line"));
        assert_eq!(lines[0].color_token, "#ff0000");
        assert_eq!(lines[1].color_token, FALLBACK_COLOR_TOKEN);
    }
}
