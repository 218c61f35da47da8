//! Fragment splitting for indexed documents.
//!
//! Two strategies:
//! - structured: every section marker (e.g. `Artículo 12`) opens a new fragment, and any
//!   text before the first marker becomes a leading fragment;
//! - generic: sentences (ending in `.`, `?` or `!`) are packed greedily into fragments of
//!   at most `max_fragment_chars` characters. A sentence longer than the budget is kept
//!   whole rather than cut.
//!
//! Fragment boundaries never fall inside a sentence or a marker.

use regex::Regex;

use crate::text::{contains, normalize_text};
use crate::types::{SourceDocument, SplitOptions};
use crate::{DociaError, Result};

/// Strategy used to cut a document into fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    Structured,
    Generic,
}

/// Compiled splitting configuration shared by rebuild and incremental add.
#[derive(Debug, Clone)]
pub struct FragmentSplitter {
    max_chars: usize,
    marker: Regex,
    normative_kinds: Vec<String>,
    index_summaries: bool,
}

impl FragmentSplitter {
    pub fn new(options: &SplitOptions) -> Result<Self> {
        if options.max_fragment_chars == 0 {
            return Err(DociaError::InvalidConfig {
                reason: "split.max_fragment_chars must be positive".into(),
            });
        }
        let marker = Regex::new(&options.section_marker).map_err(|err| {
            DociaError::InvalidConfig {
                reason: format!("split.section_marker is not a valid pattern: {err}"),
            }
        })?;
        if marker.is_match("") {
            return Err(DociaError::InvalidConfig {
                reason: "split.section_marker must not match empty text".into(),
            });
        }
        let normative_kinds = options
            .normative_kinds
            .iter()
            .map(|kind| normalize_text(kind))
            .filter(|kind| !kind.is_empty())
            .collect();
        Ok(Self {
            max_chars: options.max_fragment_chars,
            marker,
            normative_kinds,
            index_summaries: options.index_summaries,
        })
    }

    /// Structured mode for normative document kinds (codes, laws, regulations).
    #[must_use]
    pub fn mode_for_kind(&self, kind: Option<&str>) -> SplitMode {
        let Some(kind) = kind else {
            return SplitMode::Generic;
        };
        let kind = normalize_text(kind);
        if self
            .normative_kinds
            .iter()
            .any(|normative| contains(&kind, normative))
        {
            SplitMode::Structured
        } else {
            SplitMode::Generic
        }
    }

    #[must_use]
    pub fn split(&self, text: &str, mode: SplitMode) -> Vec<String> {
        match mode {
            SplitMode::Structured => split_structured(text, &self.marker),
            SplitMode::Generic => split_generic(text, self.max_chars),
        }
    }

    /// Fragment texts for one document, in index order.
    ///
    /// Documents without extracted text produce nothing. With `index_summaries`, the
    /// subject and description follow the body fragments as standalone fragments.
    #[must_use]
    pub fn split_document(&self, document: &SourceDocument) -> Vec<String> {
        let body = document
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let Some(body) = body else {
            return Vec::new();
        };

        let mut fragments = self.split(body, self.mode_for_kind(document.kind.as_deref()));
        if self.index_summaries {
            for summary in [&document.subject, &document.description] {
                if let Some(summary) = summary.as_deref().map(str::trim) {
                    if !summary.is_empty() {
                        fragments.push(summary.to_string());
                    }
                }
            }
        }
        fragments
    }
}

/// Split on section markers. Each fragment starts at a marker, except a leading fragment
/// holding whatever precedes the first one.
#[must_use]
pub fn split_structured(text: &str, marker: &Regex) -> Vec<String> {
    let starts: Vec<usize> = marker.find_iter(text).map(|m| m.start()).collect();
    let mut fragments = Vec::with_capacity(starts.len() + 1);

    let leading_end = starts.first().copied().unwrap_or(text.len());
    push_trimmed(&mut fragments, &text[..leading_end]);

    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(text.len());
        push_trimmed(&mut fragments, &text[start..end]);
    }
    fragments
}

/// Pack sentences greedily into fragments of at most `max_chars` characters.
#[must_use]
pub fn split_generic(text: &str, max_chars: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for sentence in sentences(text.trim()) {
        let sentence_chars = sentence.chars().count();
        let joined_chars = if current.is_empty() {
            sentence_chars
        } else {
            current_chars + 1 + sentence_chars
        };

        if joined_chars <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            current_chars = joined_chars;
        } else {
            push_trimmed(&mut fragments, &current);
            current = sentence.to_string();
            current_chars = sentence_chars;
        }
    }
    push_trimmed(&mut fragments, &current);
    fragments
}

/// Sentences end after `.`, `?` or `!` when followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut prev: Option<char> = None;
    let mut boundary: Option<usize> = None;

    for (idx, c) in text.char_indices() {
        if c.is_whitespace() {
            if boundary.is_none() && matches!(prev, Some('.' | '?' | '!')) {
                boundary = Some(idx);
            }
        } else if let Some(end) = boundary.take() {
            out.push(&text[start..end]);
            start = idx;
        }
        prev = Some(c);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn push_trimmed(fragments: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_SECTION_MARKER;
    use crate::types::DocumentId;

    fn splitter(max_chars: usize) -> FragmentSplitter {
        FragmentSplitter::new(&SplitOptions {
            max_fragment_chars: max_chars,
            ..SplitOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn generic_packs_sentences_under_budget() {
        let text = "Uno dos tres. Cuatro cinco seis? Siete ocho nueve! Diez.";
        let fragments = split_generic(text, 30);
        assert_eq!(
            fragments,
            vec![
                "Uno dos tres.".to_string(),
                "Cuatro cinco seis?".to_string(),
                "Siete ocho nueve! Diez.".to_string(),
            ]
        );
        for fragment in &fragments {
            assert!(fragment.chars().count() <= 30);
        }
    }

    #[test]
    fn generic_keeps_oversized_sentence_whole() {
        let long = "palabra ".repeat(50);
        let text = format!("Corta. {}fin. Otra corta.", long);
        let fragments = split_generic(&text, 40);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], "Corta.");
        assert!(fragments[1].ends_with("fin."));
        assert!(fragments[1].chars().count() > 40);
        assert_eq!(fragments[2], "Otra corta.");
    }

    #[test]
    fn generic_only_breaks_after_terminal_punctuation() {
        let text = "v1.2 is out. Dr.Smith said so";
        let fragments = split_generic(text, 5);
        assert_eq!(fragments, vec!["v1.2 is out.", "Dr.Smith said so"]);
    }

    #[test]
    fn generic_yields_one_fragment_for_text_without_punctuation() {
        assert_eq!(split_generic("sin puntuacion final", 1200), vec!["sin puntuacion final"]);
        assert!(split_generic("   \n ", 1200).is_empty());
    }

    #[test]
    fn structured_splits_on_markers_with_leading_text() {
        let marker = Regex::new(DEFAULT_SECTION_MARKER).unwrap();
        let text = "Preámbulo general. Artículo 1 Primera regla. Artículo 2 Segunda regla.";
        let fragments = split_structured(text, &marker);
        assert_eq!(
            fragments,
            vec!["Preámbulo general.", "Artículo 1 Primera regla.", "Artículo 2 Segunda regla."]
        );
    }

    #[test]
    fn structured_without_markers_is_single_fragment() {
        let marker = Regex::new(DEFAULT_SECTION_MARKER).unwrap();
        assert_eq!(split_structured("  texto libre  ", &marker), vec!["texto libre"]);
        assert!(split_structured("   ", &marker).is_empty());
    }

    #[test]
    fn structured_large_document_starts_each_fragment_at_marker() {
        let marker = Regex::new(DEFAULT_SECTION_MARKER).unwrap();
        let mut text = String::new();
        let mut article = 1;
        while text.chars().count() < 9_000 {
            text.push_str(&format!(
                "Artículo {article} El organismo competente dispondrá las medidas necesarias. "
            ));
            article += 1;
        }
        let fragments = split_structured(&text, &marker);
        assert_eq!(fragments.len(), article - 1);
        for fragment in &fragments {
            assert!(!fragment.is_empty());
            assert!(marker.find(fragment).is_some_and(|m| m.start() == 0));
        }
    }

    #[test]
    fn mode_follows_document_kind() {
        let splitter = splitter(1200);
        assert_eq!(splitter.mode_for_kind(Some("Código Penal")), SplitMode::Structured);
        assert_eq!(splitter.mode_for_kind(Some("LEY")), SplitMode::Structured);
        assert_eq!(splitter.mode_for_kind(Some("Normativa interna")), SplitMode::Structured);
        assert_eq!(splitter.mode_for_kind(Some("Informe")), SplitMode::Generic);
        assert_eq!(splitter.mode_for_kind(None), SplitMode::Generic);
    }

    #[test]
    fn document_without_text_has_no_fragments() {
        let splitter = splitter(1200);
        let document = SourceDocument::new(DocumentId(9), "   ");
        assert!(splitter.split_document(&document).is_empty());
    }

    #[test]
    fn summaries_are_appended_when_enabled() {
        let splitter = FragmentSplitter::new(&SplitOptions {
            index_summaries: true,
            ..SplitOptions::default()
        })
        .unwrap();
        let mut document = SourceDocument::new(DocumentId(1), "Cuerpo del informe.");
        document.subject = Some("Asunto relevante".into());
        document.description = Some("  ".into());
        assert_eq!(
            splitter.split_document(&document),
            vec!["Cuerpo del informe.", "Asunto relevante"]
        );
    }

    #[test]
    fn invalid_marker_is_a_config_error() {
        let err = FragmentSplitter::new(&SplitOptions {
            section_marker: "(".into(),
            ..SplitOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, DociaError::InvalidConfig { .. }));
    }

    #[test]
    fn marker_matching_empty_text_is_rejected() {
        for pattern in [r"\s*", "", "(?i)(art[ií]culo)?"] {
            let err = FragmentSplitter::new(&SplitOptions {
                section_marker: pattern.into(),
                ..SplitOptions::default()
            })
            .unwrap_err();
            assert!(
                matches!(err, DociaError::InvalidConfig { ref reason } if reason.contains("empty")),
                "pattern {pattern:?} gave {err:?}"
            );
        }
    }
}
