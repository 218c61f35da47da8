//! Text canonicalization used for embedding input and every literal comparison.
//!
//! `normalize_text` is pure and idempotent. The passes run in a fixed order:
//! lowercase, strip combining marks, collapse whitespace, join digit groups split by a
//! single separator, then merge plate-like letter/digit tokens. Whitespace is collapsed
//! before the digit and plate passes so a second application finds nothing left to do.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

// Safe expect: the pattern is a compile-time constant covered by tests.
#[allow(clippy::expect_used)]
static PLATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([a-z]{1,3})[ \-]?([0-9]{3,4})(?:[ \-]?([a-z]{1,3}))?\b")
        .expect("plate token pattern is valid")
});

/// Canonicalize `text` for comparison and embedding.
///
/// Dotted or dashed identifiers (`3.456.789-2`), spaced phone numbers (`099 123 456`)
/// and plates (`CA-1234-AX`) all collapse into single alphanumeric tokens; runs of
/// 7–10 digits are left intact as one token.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lowered = text.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let collapsed = collapse_whitespace(&stripped);
    let joined = join_digit_groups(&collapsed);
    merge_plate_tokens(&joined).into_owned()
}

/// True when the normalized `query` occurs inside the normalized `text`.
#[must_use]
pub fn has_literal_match(query: &str, text: &str) -> bool {
    let needle = normalize_text(query);
    !needle.is_empty() && contains(&normalize_text(text), &needle)
}

/// Substring test on already-normalized strings.
#[must_use]
pub(crate) fn contains(haystack: &str, needle: &str) -> bool {
    memchr::memmem::find(haystack.as_bytes(), needle.as_bytes()).is_some()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop a single `.`, `-` or space whose neighbours in the input are both digits.
fn join_digit_groups(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (idx, &c) in chars.iter().enumerate() {
        if matches!(c, '.' | '-' | ' ') && idx > 0 && idx + 1 < chars.len() {
            let before = chars[idx - 1];
            let after = chars[idx + 1];
            if before.is_ascii_digit() && after.is_ascii_digit() {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn merge_plate_tokens(text: &str) -> Cow<'_, str> {
    PLATE_TOKEN.replace_all(text, |caps: &Captures<'_>| {
        let mut merged = String::with_capacity(10);
        merged.push_str(&caps[1]);
        merged.push_str(&caps[2]);
        if let Some(suffix) = caps.get(3) {
            merged.push_str(suffix.as_str());
        }
        merged
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_diacritics() {
        assert_eq!(normalize_text("Artículo ÚNICO de la Nación"), "articulo unico de la nacion");
        assert_eq!(normalize_text("Peñarol"), "penarol");
    }

    #[test]
    fn collapses_digit_separators() {
        assert_eq!(normalize_text("3.456.789-2"), "34567892");
        assert_eq!(normalize_text("CI 1.234.567-8 vigente"), "ci 12345678 vigente");
        assert_eq!(normalize_text("tel 099 123 456"), "tel 099123456");
        assert_eq!(normalize_text("2 4 0 0 1 2 3 4"), "24001234");
    }

    #[test]
    fn keeps_separators_not_between_digits() {
        assert_eq!(normalize_text("fin. 2024"), "fin. 2024");
        assert_eq!(normalize_text("1 . 2"), "1 . 2");
        assert_eq!(normalize_text("a-b"), "a-b");
    }

    #[test]
    fn merges_plate_like_codes() {
        assert_eq!(normalize_text("Matrícula CA-1234-AX"), "matricula ca1234ax");
        assert_eq!(normalize_text("sbc 1234"), "sbc1234");
        assert_eq!(normalize_text("abc 123 defg"), "abc123 defg");
        assert_eq!(normalize_text("abcd 123"), "abcd 123");
    }

    #[test]
    fn preserves_long_digit_runs() {
        assert_eq!(normalize_text("expediente 2023004512"), "expediente 2023004512");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_text("  calle\t\n 18   de julio "), "calle 18 de julio");
        assert_eq!(normalize_text("1  2"), "12");
        assert_eq!(normalize_text("a 123  b"), "a123b");
    }

    #[test]
    fn empty_and_blank_inputs() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \t "), "");
        assert_eq!(normalize_text("\u{301}"), "");
    }

    #[test]
    fn normalization_is_idempotent_on_known_cases() {
        let samples = [
            "3.456.789-2",
            "Matrícula CA 1234 AX y SBC-4567",
            "a 1234 b 5678 c",
            "ab-12-34",
            "1. 2",
            "Ruta 5 km 23.500",
            "x  123   y",
            "İstanbul ÇAĞ",
        ];
        for sample in samples {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn normalization_is_idempotent_on_random_text() {
        const ALPHABET: &[char] = &[
            'a', 'b', 'c', 'x', 'A', 'Z', '0', '1', '2', '7', '9', '.', '-', ' ', ' ', '\n', '?',
            'á', 'É', 'ñ', 'ü', '\u{301}',
        ];
        let mut rng = fastrand::Rng::with_seed(0x00d0_c1a0);
        for _ in 0..5_000 {
            let len = rng.usize(0..32);
            let sample: String = (0..len)
                .map(|_| ALPHABET[rng.usize(0..ALPHABET.len())])
                .collect();
            let once = normalize_text(&sample);
            assert_eq!(normalize_text(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn literal_match_compares_normalized_forms() {
        assert!(has_literal_match("CI 3.456.789-2", "constancia ci 34567892 emitida"));
        assert!(has_literal_match("Peñarol", "Club Atlético PEÑAROL"));
        assert!(!has_literal_match("nacional", "Club Atlético Peñarol"));
        assert!(!has_literal_match("   ", "anything"));
    }
}
