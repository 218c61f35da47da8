//! Positional fragment records stored next to the vector index.

use serde::{Deserialize, Serialize};

use super::common::DocumentId;
use super::document::SourceDocument;
use crate::text::normalize_text;

/// One indexed unit of a document's text.
///
/// Copies the document metadata it needs at build time; it is a stale-tolerant projection,
/// not a live reference. `normalized_text` is always `normalize_text(text)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub(crate) position: usize,
    pub text: String,
    normalized_text: String,
    pub document_id: DocumentId,
    #[serde(default)]
    pub department_code: Option<String>,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub subject: Option<String>,
}

impl FragmentRecord {
    /// Build a record for `text` carrying the metadata of `document`.
    #[must_use]
    pub fn from_document(position: usize, text: String, document: &SourceDocument) -> Self {
        let normalized_text = normalize_text(&text);
        Self {
            position,
            text,
            normalized_text,
            document_id: document.id,
            department_code: document.department_code.clone(),
            reviewed: document.reviewed,
            subject: document.subject.clone(),
        }
    }

    /// Slot of this fragment in both the vector index and the fragment store.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    pub(crate) fn has_consistent_normalization(&self) -> bool {
        self.normalized_text == normalize_text(&self.text)
    }

    /// Recompute `normalized_text`; returns true if the stored value was stale.
    pub(crate) fn renormalize(&mut self) -> bool {
        let fresh = normalize_text(&self.text);
        if fresh == self.normalized_text {
            return false;
        }
        self.normalized_text = fresh;
        true
    }
}
