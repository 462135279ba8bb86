//! Cross-source player identity by name.
//!
//! Sources key players by unrelated numeric IDs, so the only bridge between
//! them is the player's name. Matching is a heuristic: it misses name
//! variants it does not normalize away and cannot tell apart two players who
//! share a name. Callers get `None` rather than an error when nothing
//! matches, and the first candidate in source order when several do.

use crate::types::Named;

/// Generational suffixes ignored by the loose matcher.
const SUFFIXES: [&str; 5] = ["jr", "sr", "ii", "iii", "iv"];

/// Lowercase, drop periods/commas/apostrophes, collapse whitespace.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '.' | ',' | '\'' | '’'))
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_suffixes(normalized: &str) -> String {
    normalized
        .split(' ')
        .filter(|tok| !SUFFIXES.contains(tok))
        .collect::<Vec<_>>()
        .join(" ")
}

pub trait NameMatcher: Send + Sync {
    fn matches(&self, candidate: &str, first: &str, last: &str) -> bool;
}

/// Whole-name equality after normalization.
pub struct ExactMatcher;

impl NameMatcher for ExactMatcher {
    fn matches(&self, candidate: &str, first: &str, last: &str) -> bool {
        let wanted = normalize(&format!("{first} {last}"));
        !wanted.is_empty() && normalize(candidate) == wanted
    }
}

/// Both the first and the last name appear somewhere in the candidate,
/// ignoring generational suffixes on either side.
pub struct TokenMatcher;

impl NameMatcher for TokenMatcher {
    fn matches(&self, candidate: &str, first: &str, last: &str) -> bool {
        let first = strip_suffixes(&normalize(first));
        let last = strip_suffixes(&normalize(last));
        if first.is_empty() || last.is_empty() {
            return false;
        }
        let candidate = strip_suffixes(&normalize(candidate));
        candidate.contains(&first) && candidate.contains(&last)
    }
}

pub static DEFAULT_MATCHERS: [&dyn NameMatcher; 2] = [&ExactMatcher, &TokenMatcher];

/// First candidate accepted by the earliest matcher in `matchers`.
pub fn resolve_with<'a, T: Named>(
    candidates: &'a [T],
    first: &str,
    last: &str,
    matchers: &[&dyn NameMatcher],
) -> Option<&'a T> {
    matchers.iter().find_map(|m| {
        candidates
            .iter()
            .find(|c| m.matches(&c.display_name(), first, last))
    })
}

/// Exact match preferred, else the loose token match.
pub fn resolve_identity<'a, T: Named>(candidates: &'a [T], first: &str, last: &str) -> Option<&'a T> {
    resolve_with(candidates, first, last, &DEFAULT_MATCHERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    struct Cand(&'static str, i64);

    impl Named for Cand {
        fn display_name(&self) -> Cow<'_, str> {
            Cow::Borrowed(self.0)
        }
    }

    fn pick(c: &[Cand], first: &str, last: &str) -> Option<i64> {
        resolve_identity(c, first, last).map(|c| c.1)
    }

    #[test]
    fn exact_match_beats_earlier_partial_match() {
        let c = [Cand("Anthony Davis Jr.", 1), Cand("Anthony Davis", 2)];
        assert_eq!(pick(&c, "Anthony", "Davis"), Some(2));
    }

    #[test]
    fn hyphenated_last_names() {
        let c = [Cand("Shai Gilgeous-Alexander", 1628983)];
        assert_eq!(pick(&c, "shai", "gilgeous-alexander"), Some(1628983));
        assert_eq!(pick(&c, "Shai", "Alexander"), Some(1628983));
        assert_eq!(pick(&c, "Shai", "Gilgeous Alexander"), None);
    }

    #[test]
    fn suffixes_on_either_side() {
        let c = [Cand("Jaren Jackson Jr.", 1628991)];
        assert_eq!(pick(&c, "Jaren", "Jackson"), Some(1628991));
        assert_eq!(pick(&c, "Jaren", "Jackson Jr"), Some(1628991));

        let c = [Cand("Gary Trent", 1629018)];
        assert_eq!(pick(&c, "Gary", "Trent Jr."), Some(1629018));
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        let c = [Cand("PJ Washington", 1)];
        assert_eq!(pick(&c, "P.J.", "WASHINGTON"), Some(1));
        let c = [Cand("De'Aaron Fox", 2)];
        assert_eq!(pick(&c, "DeAaron", "Fox"), Some(2));
    }

    #[test]
    fn duplicate_names_resolve_to_first_in_source_order() {
        let c = [Cand("Marcus Williams", 10), Cand("Marcus Williams", 20)];
        assert_eq!(pick(&c, "Marcus", "Williams"), Some(10));
    }

    #[test]
    fn both_name_parts_are_required() {
        let c = [Cand("Jalen Williams", 1), Cand("Jaylin Williams", 2)];
        assert_eq!(pick(&c, "", "Williams"), None);
        assert_eq!(pick(&c, "Jalen", ""), None);
        assert_eq!(pick(&c, "Kenrich", "Williams"), None);
    }

    #[test]
    fn custom_matcher_list_is_honored() {
        let c = [Cand("Jaren Jackson Jr.", 1)];
        assert_eq!(resolve_with(&c, "Jaren", "Jackson", &[&ExactMatcher]).map(|c| c.1), None);
    }
}
