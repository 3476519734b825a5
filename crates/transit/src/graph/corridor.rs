//! Corridor normalization.
//!
//! Upstream sources often publish one relation per direction or service
//! pattern ("Churchgate Fast", "Churchgate (Slow)", "Churchgate Down").
//! These are grouped by a normalized key and merged into a single logical
//! relation before assembly.

use std::collections::{HashMap, HashSet};

use super::elements::{Relation, RelationMember};

/// Direction / service-pattern words removed from the end of a name
const VARIANT_TOKENS: &[&str] = &[
    "fast", "slow", "up", "down", "local", "express", "stopping", "semi", "semifast",
];

const TRAILING_SEPARATORS: &[char] = &['-', '–', ':', ',', '/', '(', ')', '[', ']'];

fn is_variant_word(word: &str) -> bool {
    let word = word.trim_matches(|c: char| TRAILING_SEPARATORS.contains(&c));
    !word.is_empty()
        && word
            .split('-')
            .filter(|part| !part.is_empty())
            .all(|part| VARIANT_TOKENS.iter().any(|t| part.eq_ignore_ascii_case(t)))
}

/// Words are split on whitespace and hyphens, so "Churchgate-Fast" splits too.
fn is_word_break(c: char) -> bool {
    c.is_whitespace() || c == '-' || c == '–'
}

/// `raw` with trailing variant words (and the separators around them)
/// removed, original casing preserved. A name made only of variant words
/// is returned trimmed but otherwise untouched.
pub fn strip_variant_suffixes(raw: &str) -> &str {
    let mut rest = raw.trim();

    loop {
        let trimmed = rest
            .trim_end()
            .trim_end_matches(|c: char| TRAILING_SEPARATORS.contains(&c) && c != ')' && c != ']')
            .trim_end();
        let (head, last) = match trimmed.rsplit_once(is_word_break) {
            Some((head, last)) => (head, last),
            None => break,
        };
        if !is_variant_word(last) {
            break;
        }
        rest = head.trim_end();
    }

    let rest = rest.trim_end_matches(|c: char| {
        c.is_whitespace() || (TRAILING_SEPARATORS.contains(&c) && c != ')' && c != ']')
    });
    if rest.is_empty() || is_variant_word(rest) {
        raw.trim()
    } else {
        rest
    }
}

/// Grouping key shared by every variant of one physical corridor.
pub fn normalize_corridor_key(raw: &str) -> String {
    strip_variant_suffixes(raw).to_lowercase()
}

/// Merge relations whose names normalize to the same key.
///
/// The merged relation keeps the first relation's id and tags; member lists
/// are concatenated in order with repeats removed. Relations without a name
/// pass through untouched. Output order follows first occurrence.
pub fn merge_corridors(relations: Vec<Relation>) -> Vec<Relation> {
    let mut merged: Vec<Relation> = Vec::new();
    let mut seen_members: Vec<HashSet<RelationMember>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for relation in relations {
        let Some(key) = relation.display_name().map(normalize_corridor_key) else {
            seen_members.push(relation.members.iter().cloned().collect());
            merged.push(relation);
            continue;
        };

        match by_key.get(&key) {
            Some(&idx) => {
                tracing::debug!(
                    "merging relation {} into corridor '{}' ({})",
                    relation.id,
                    key,
                    merged[idx].id
                );
                for member in relation.members {
                    if seen_members[idx].insert(member.clone()) {
                        merged[idx].members.push(member);
                    }
                }
            }
            None => {
                let mut unique = HashSet::new();
                let mut relation = relation;
                relation.members.retain(|m| unique.insert(m.clone()));
                by_key.insert(key, merged.len());
                seen_members.push(unique);
                merged.push(relation);
            }
        }
    }

    merged
}
