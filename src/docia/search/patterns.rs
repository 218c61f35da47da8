//! Domain patterns recognised in normalized queries.
//!
//! Each pattern runs over the normalized query; every matched substring is then looked up
//! verbatim in fragment normalized text by the pattern-boost stage.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatternKind {
    LongNumericId,
    PlateCode,
    Phone,
    PersonalId,
    AddressPrefix,
}

// Safe expect: the patterns are compile-time constants covered by tests.
#[allow(clippy::expect_used)]
static PATTERNS: Lazy<Vec<(PatternKind, Regex)>> = Lazy::new(|| {
    [
        (PatternKind::LongNumericId, r"\b\d{7,10}\b"),
        (PatternKind::PlateCode, r"\b[a-z]{1,3}\d{3,4}[a-z]{0,3}\b"),
        (PatternKind::Phone, r"\b\d{8,12}\b"),
        (PatternKind::PersonalId, r"\b\d{8}\b"),
        (
            PatternKind::AddressPrefix,
            r"\b(?:calle|av|avenida|ruta|camino)\s+\w+",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("domain pattern is valid")))
    .collect()
});

/// Distinct substrings of `normalized_query` matched by any domain pattern, in pattern
/// order then position order.
pub(crate) fn pattern_matches(normalized_query: &str) -> Vec<(PatternKind, String)> {
    let mut out: Vec<(PatternKind, String)> = Vec::new();
    for (kind, regex) in PATTERNS.iter() {
        for found in regex.find_iter(normalized_query) {
            let text = found.as_str();
            if !out.iter().any(|(_, seen)| seen == text) {
                out.push((*kind, text.to_string()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::normalize_text;

    fn matched(query: &str) -> Vec<String> {
        pattern_matches(&normalize_text(query))
            .into_iter()
            .map(|(_, text)| text)
            .collect()
    }

    #[test]
    fn dotted_identity_number_matches_as_one_token() {
        let found = pattern_matches(&normalize_text("cédula 3.456.789-2"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], (PatternKind::LongNumericId, "34567892".to_string()));
    }

    #[test]
    fn plate_and_address_are_detected() {
        assert_eq!(matched("auto SBC 1234, calle Rivera"), vec!["sbc1234", "calle rivera"]);
        assert_eq!(matched("Avenida Italia"), vec!["avenida italia"]);
    }

    #[test]
    fn long_phone_without_id_shape() {
        assert_eq!(matched("llamar al 099 123 456 78"), vec!["09912345678"]);
    }

    #[test]
    fn plain_words_match_nothing() {
        assert!(matched("informe anual de gestión").is_empty());
        assert!(matched("123456").is_empty());
    }
}
