//! Source documents and the catalog seam the index reads them through.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::common::DocumentId;
use crate::{DociaError, Result};

/// A document as supplied by the external catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: DocumentId,
    /// Extracted body text; documents without it are not indexed.
    #[serde(default)]
    pub text: Option<String>,
    /// Document type label (`"Ley"`, `"Informe"`, ...). Drives the split mode.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub department_code: Option<String>,
    /// Whether the document has been cleared for retrieval.
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceDocument {
    #[must_use]
    pub fn new(id: DocumentId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_department(mut self, code: impl Into<String>) -> Self {
        self.department_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn reviewed(mut self, reviewed: bool) -> Self {
        self.reviewed = reviewed;
        self
    }
}

/// Read access to the external document catalog.
pub trait DocumentSource: Send + Sync {
    /// Every document, in catalog order. Used by full rebuilds.
    fn load_all(&self) -> Result<Vec<SourceDocument>>;

    fn load(&self, id: DocumentId) -> Result<Option<SourceDocument>>;

    /// Liveness check used at read time to skip fragments of vanished documents.
    fn exists(&self, id: DocumentId) -> Result<bool> {
        Ok(self.load(id)?.is_some())
    }
}

/// In-process catalog keyed by document id.
#[derive(Debug, Default)]
pub struct MemoryDocumentSource {
    documents: RwLock<BTreeMap<DocumentId, SourceDocument>>,
}

impl MemoryDocumentSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, document: SourceDocument) -> Result<()> {
        let mut documents = self.documents.write().map_err(|_| DociaError::Lock {
            reason: "document source lock poisoned".into(),
        })?;
        documents.insert(document.id, document);
        Ok(())
    }

    pub fn delete(&self, id: DocumentId) -> Result<Option<SourceDocument>> {
        let mut documents = self.documents.write().map_err(|_| DociaError::Lock {
            reason: "document source lock poisoned".into(),
        })?;
        Ok(documents.remove(&id))
    }
}

impl FromIterator<SourceDocument> for MemoryDocumentSource {
    fn from_iter<I: IntoIterator<Item = SourceDocument>>(iter: I) -> Self {
        Self {
            documents: RwLock::new(iter.into_iter().map(|doc| (doc.id, doc)).collect()),
        }
    }
}

impl DocumentSource for MemoryDocumentSource {
    fn load_all(&self) -> Result<Vec<SourceDocument>> {
        let documents = self.documents.read().map_err(|_| DociaError::Lock {
            reason: "document source lock poisoned".into(),
        })?;
        Ok(documents.values().cloned().collect())
    }

    fn load(&self, id: DocumentId) -> Result<Option<SourceDocument>> {
        let documents = self.documents.read().map_err(|_| DociaError::Lock {
            reason: "document source lock poisoned".into(),
        })?;
        Ok(documents.get(&id).cloned())
    }

    fn exists(&self, id: DocumentId) -> Result<bool> {
        let documents = self.documents.read().map_err(|_| DociaError::Lock {
            reason: "document source lock poisoned".into(),
        })?;
        Ok(documents.contains_key(&id))
    }
}
