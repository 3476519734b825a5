//! Station to line assignment.

use std::collections::HashSet;

use crate::identifiers::LineKey;
use crate::matching::vocabulary::match_against;
use crate::models::types::{Line, Station, StationCandidate};
use crate::spatial::LineVertexIndex;

/// Collapse candidates sharing a name (case-insensitive) to the first one seen.
pub fn dedupe_by_name(candidates: Vec<StationCandidate>) -> Vec<StationCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.name.trim().to_lowercase()))
        .collect()
}

/// Line hint embedded in a station name, e.g. "Rajiv Chowk (Blue Line)".
pub fn name_hint(name: &str) -> Option<&str> {
    let open = name.rfind('(')?;
    let close = open + name[open..].find(')')?;
    let hint = name[open + 1..close].trim();
    (!hint.is_empty()).then_some(hint)
}

/// Assign every candidate to a line.
///
/// A hint from the source (explicit or embedded in the name) wins when it
/// names one of `lines`; otherwise the geographically nearest line is used.
/// With no lines at all every station gets the fallback key. Candidates
/// with invalid coordinates are skipped, then deduplicated by name.
pub fn assign_stations_to_lines(
    candidates: Vec<StationCandidate>,
    lines: &[Line],
    stride: usize,
) -> Vec<Station> {
    let candidates = dedupe_by_name(
        candidates
            .into_iter()
            .filter(|c| c.location.is_finite())
            .collect(),
    );

    let index = LineVertexIndex::build(lines, stride);
    let line_names = lines.iter().map(|l| l.name.as_str());

    candidates
        .into_iter()
        .map(|candidate| {
            let hinted = candidate
                .line_hint
                .as_deref()
                .or_else(|| name_hint(&candidate.name))
                .and_then(|hint| match_against(hint, line_names.clone()));

            let line_key = hinted
                .or_else(|| index.nearest_line(candidate.location).map(|(idx, _)| idx))
                .map(|idx| lines[idx].name.clone())
                .unwrap_or_else(LineKey::fallback);

            Station {
                name: candidate.name,
                location: candidate.location,
                line_key,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::Point;

    fn line(name: &str, lon: f64) -> Line {
        Line::from_segments(
            LineKey::new(name),
            name.to_lowercase(),
            vec![(0..5)
                .map(|i| Point::new(28.5 + i as f64 * 0.02, lon))
                .collect()],
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_line_assignment() {
        let lines = vec![line("Blue", 77.0), line("Yellow", 77.2)];
        let stations = assign_stations_to_lines(
            vec![
                StationCandidate::new("A", Point::new(28.52, 77.01)),
                StationCandidate::new("B", Point::new(28.55, 77.19)),
            ],
            &lines,
            1,
        );

        assert_eq!(stations[0].line_key, LineKey::new("Blue"));
        assert_eq!(stations[1].line_key, LineKey::new("Yellow"));
    }

    #[test]
    fn test_name_hint_beats_distance() {
        let lines = vec![line("Blue", 77.0), line("Yellow", 77.2)];
        let stations = assign_stations_to_lines(
            vec![StationCandidate::new(
                "Rajiv Chowk (Yellow Line)",
                Point::new(28.52, 77.01),
            )],
            &lines,
            1,
        );

        assert_eq!(stations[0].line_key, LineKey::new("Yellow"));
    }

    #[test]
    fn test_unusable_hint_falls_back_to_distance() {
        let lines = vec![line("Blue", 77.0)];
        let stations = assign_stations_to_lines(
            vec![StationCandidate::new("Depot", Point::new(28.52, 77.01)).with_hint("Purple")],
            &lines,
            1,
        );
        assert_eq!(stations[0].line_key, LineKey::new("Blue"));
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let stations = assign_stations_to_lines(
            vec![
                StationCandidate::new("Central", Point::new(1.0, 1.0)),
                StationCandidate::new("central ", Point::new(2.0, 2.0)),
                StationCandidate::new("Broken", Point::new(f64::NAN, 1.0)),
            ],
            &[],
            1,
        );

        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].location, Point::new(1.0, 1.0));
        assert!(stations[0].line_key.is_fallback());
    }

    #[test]
    fn test_name_hint_parsing() {
        assert_eq!(name_hint("Rajiv Chowk (Blue Line)"), Some("Blue Line"));
        assert_eq!(name_hint("Plain"), None);
        assert_eq!(name_hint("Odd ()"), None);
    }
}
