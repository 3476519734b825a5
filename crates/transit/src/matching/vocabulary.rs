//! Fuzzy matching of upstream line names against a configured vocabulary.
//!
//! Each heuristic is a [`MatchStrategy`]. Strategies are tried in order and
//! each one is run against the whole vocabulary before the next, weaker one
//! is consulted, so a containment hit on any entry beats a keyword hit on an
//! earlier entry.

use serde::{Deserialize, Serialize};

use crate::identifiers::LineKey;

/// Keywords must be at least this many characters to count
const MIN_KEYWORD_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Case-insensitive substring either way round
    Contains,
    /// Same as `Contains` after dropping a trailing "Line" token
    SuffixStripped,
    /// Any hyphen/space separated keyword of the canonical name appears
    KeywordPartial,
}

impl MatchStrategy {
    pub const DEFAULT_ORDER: [MatchStrategy; 3] = [
        MatchStrategy::Contains,
        MatchStrategy::SuffixStripped,
        MatchStrategy::KeywordPartial,
    ];

    pub fn matches(self, name: &str, canonical: &str) -> bool {
        let name = name.trim().to_lowercase();
        let canonical = canonical.trim().to_lowercase();
        if name.is_empty() || canonical.is_empty() {
            return false;
        }

        match self {
            MatchStrategy::Contains => contains_either(&name, &canonical),
            MatchStrategy::SuffixStripped => {
                let name = strip_line_suffix(&name);
                let canonical = strip_line_suffix(&canonical);
                !name.is_empty() && !canonical.is_empty() && contains_either(name, canonical)
            }
            MatchStrategy::KeywordPartial => canonical
                .split(|c: char| c == '-' || c.is_whitespace())
                .filter(|k| k.chars().count() >= MIN_KEYWORD_LEN && *k != "line")
                .any(|k| name.contains(k)),
        }
    }
}

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Drop a trailing "line" word. "skyline" keeps its suffix.
fn strip_line_suffix(name: &str) -> &str {
    match name.strip_suffix("line") {
        Some(head) if head.is_empty() || head.ends_with(|c: char| c == '-' || c.is_whitespace()) => {
            head.trim_end_matches(|c: char| c == '-' || c.is_whitespace())
        }
        _ => name,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub name: String,
    pub color: String,
}

impl VocabularyEntry {
    pub fn key(&self) -> LineKey {
        LineKey::new(&self.name)
    }
}

/// Ordered canonical line names with their color tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineVocabulary {
    entries: Vec<VocabularyEntry>,
}

impl LineVocabulary {
    pub fn new(entries: Vec<VocabularyEntry>) -> Self {
        Self { entries }
    }

    pub fn from_pairs<N: Into<String>, C: Into<String>>(
        pairs: impl IntoIterator<Item = (N, C)>,
    ) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, color)| VocabularyEntry {
                    name: name.into(),
                    color: color.into(),
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<&VocabularyEntry> {
        self.resolve_with(name, &MatchStrategy::DEFAULT_ORDER)
            .map(|(entry, _)| entry)
    }

    /// First entry matched, and the strategy that matched it.
    pub fn resolve_with(
        &self,
        name: &str,
        strategies: &[MatchStrategy],
    ) -> Option<(&VocabularyEntry, MatchStrategy)> {
        strategies.iter().find_map(|&strategy| {
            self.entries
                .iter()
                .find(|entry| strategy.matches(name, &entry.name))
                .map(|entry| (entry, strategy))
        })
    }
}

/// Index of the first candidate name matched by `name`, using the default
/// strategy order.
pub fn match_against<'a>(name: &str, candidates: impl Iterator<Item = &'a str> + Clone) -> Option<usize> {
    MatchStrategy::DEFAULT_ORDER.iter().find_map(|strategy| {
        candidates
            .clone()
            .position(|candidate| strategy.matches(name, candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> LineVocabulary {
        LineVocabulary::from_pairs([
            ("Blue", "blue"),
            ("Yellow Line", "yellow"),
            ("Airport Express", "orange"),
            ("Pink", "pink"),
        ])
    }

    #[test]
    fn test_contains_either_direction() {
        assert!(MatchStrategy::Contains.matches("Blue Line Up", "Blue"));
        assert!(MatchStrategy::Contains.matches("pink", "Pink Line"));
        assert!(!MatchStrategy::Contains.matches("Red Line", "Blue"));
    }

    #[test]
    fn test_suffix_stripped() {
        assert!(!MatchStrategy::Contains.matches("Metro Yellow", "Yellow Line"));
        assert!(MatchStrategy::SuffixStripped.matches("Metro Yellow", "Yellow Line"));
    }

    #[test]
    fn test_line_suffix_needs_word_boundary() {
        assert_eq!(strip_line_suffix("yellow line"), "yellow");
        assert_eq!(strip_line_suffix("yellow-line"), "yellow");
        assert_eq!(strip_line_suffix("skyline"), "skyline");
        assert!(!MatchStrategy::SuffixStripped.matches("Sky Bridge", "Skyline"));
    }

    #[test]
    fn test_keyword_partial() {
        assert!(MatchStrategy::KeywordPartial.matches("New Delhi - Airport Metro", "Airport Express"));
        // "Line" alone is never a keyword
        assert!(!MatchStrategy::KeywordPartial.matches("Green Line", "Yellow Line"));
        // Short keywords are ignored
        assert!(!MatchStrategy::KeywordPartial.matches("Go to X", "X-Go"));
    }

    #[test]
    fn test_resolve_order() {
        let v = vocab();
        assert_eq!(v.resolve("Blue Line Down").unwrap().name, "Blue");
        assert_eq!(v.resolve("Metro Yellow").unwrap().color, "yellow");

        let (entry, strategy) = v
            .resolve_with("Delhi Airport Metro", &MatchStrategy::DEFAULT_ORDER)
            .unwrap();
        assert_eq!(entry.name, "Airport Express");
        assert_eq!(strategy, MatchStrategy::KeywordPartial);

        assert!(v.resolve("Grey Line Shuttle").is_none());
        assert!(v.resolve("").is_none());
    }

    #[test]
    fn test_stronger_strategy_wins_over_earlier_entry() {
        let v = LineVocabulary::from_pairs([("Red-Violet", "magenta"), ("Violet", "violet")]);
        // Keyword "violet" would hit the first entry, but containment hits the second
        assert_eq!(v.resolve("Violet Line").unwrap().name, "Violet");
    }

    #[test]
    fn test_vocabulary_deserializes_in_order() {
        let v: LineVocabulary = serde_json::from_str(
            r#"[{"name": "Red", "color": "red"}, {"name": "Blue", "color": "blue"}]"#,
        )
        .unwrap();
        assert_eq!(v.entries()[0].name, "Red");
        assert_eq!(v.entries()[1].key(), LineKey::new("Blue"));
    }

    #[test]
    fn test_match_against_names() {
        let names = ["Red", "Blue"];
        assert_eq!(match_against("Blue Line", names.iter().copied()), Some(1));
        assert_eq!(match_against("Green", names.iter().copied()), None);
    }
}
