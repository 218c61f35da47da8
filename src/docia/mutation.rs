//! Index maintenance: full rebuild, incremental add, remove-by-document and the document
//! lifecycle hooks.
//!
//! Every mutation holds the writer mutex, builds a complete next generation off to the
//! side and only then publishes it. A failure at any step (source, embedding, I/O) leaves
//! the served generation and the artifacts as they were.

use std::sync::Arc;

use tracing::instrument;

use super::lifecycle::{Docia, IndexGeneration};
use crate::embed::{EmbedControl, embed_texts};
use crate::text::normalize_text;
use crate::types::{DocumentId, MutationOptions, MutationReport, SourceDocument};
use crate::Result;

/// A document split and embedded, ready to append.
struct PreparedDocument<'a> {
    document: &'a SourceDocument,
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl Docia {
    /// Re-split and re-embed every document of the attached source.
    #[instrument(skip_all)]
    pub fn rebuild(&self, options: &MutationOptions) -> Result<MutationReport> {
        let documents = self.document_source()?.load_all()?;
        self.rebuild_from(&documents, options)
    }

    /// Replace the whole index with fragments of `documents`.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn rebuild_from(
        &self,
        documents: &[SourceDocument],
        options: &MutationOptions,
    ) -> Result<MutationReport> {
        let _writer = self.writer()?;
        let (previous_generation, previous_len) = match self.snapshot() {
            Ok(current) => (current.generation(), current.len()),
            Err(err) => {
                tracing::warn!(error = %err, "rebuilding without a readable previous generation");
                (0, 0)
            }
        };

        let control = self.embed_control(options);
        let refs: Vec<&SourceDocument> = documents.iter().collect();
        let prepared = self.prepare(&refs, &control)?;

        let mut next = IndexGeneration::empty(
            previous_generation + 1,
            self.embedder.model_name(),
            self.embedder.dimension(),
        );
        let added = append_prepared(&mut next, prepared)?;
        let published = self.publish(next)?;

        tracing::info!(
            generation = published.generation(),
            documents = documents.len(),
            fragments = added,
            "rebuilt index"
        );
        Ok(MutationReport {
            generation: published.generation(),
            added,
            removed: previous_len,
            total_fragments: published.len(),
        })
    }

    /// Load `id` from the attached source and append its fragments.
    #[instrument(skip(self, options))]
    pub fn add_document(&self, id: DocumentId, options: &MutationOptions) -> Result<MutationReport> {
        match self.document_source()?.load(id)? {
            Some(document) => self.add(&document, options),
            None => {
                tracing::warn!(document_id = %id, "document not found in source; nothing added");
                self.unchanged()
            }
        }
    }

    /// Split, embed and append one document.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub fn add(&self, document: &SourceDocument, options: &MutationOptions) -> Result<MutationReport> {
        let _writer = self.writer()?;
        let base = self.snapshot()?;
        let control = self.embed_control(options);
        let prepared = self.prepare(&[document], &control)?;
        if prepared.is_empty() {
            tracing::warn!(document_id = %document.id, "document has no indexable text; nothing added");
            return Ok(report_unchanged(&base));
        }

        let mut next = IndexGeneration::clone(&base);
        next.generation = base.generation() + 1;
        let added = append_prepared(&mut next, prepared)?;
        let published = self.publish(next)?;
        Ok(MutationReport {
            generation: published.generation(),
            added,
            removed: 0,
            total_fragments: published.len(),
        })
    }

    /// Drop every fragment of `id`, re-packing the remaining vectors without re-embedding.
    #[instrument(skip(self))]
    pub fn remove_document(&self, id: DocumentId) -> Result<MutationReport> {
        let _writer = self.writer()?;
        let base = self.snapshot()?;
        if !base.store().contains_document(id) {
            tracing::debug!(document_id = %id, "no fragments to remove");
            return Ok(report_unchanged(&base));
        }

        let (mut next, removed) = base.without_document(id)?;
        next.generation = base.generation() + 1;
        let published = self.publish(next)?;
        Ok(MutationReport {
            generation: published.generation(),
            added: 0,
            removed,
            total_fragments: published.len(),
        })
    }

    /// Hook for a created or edited document: replace its fragments in one mutation.
    ///
    /// A document that no longer exists in the source only has its fragments removed.
    #[instrument(skip(self, options))]
    pub fn on_document_saved(
        &self,
        id: DocumentId,
        options: &MutationOptions,
    ) -> Result<MutationReport> {
        let document = self.document_source()?.load(id)?;

        let _writer = self.writer()?;
        let base = self.snapshot()?;
        let control = self.embed_control(options);
        let prepared = match &document {
            Some(document) => self.prepare(&[document], &control)?,
            None => Vec::new(),
        };
        if document.as_ref().is_some_and(|_| prepared.is_empty()) {
            tracing::warn!(document_id = %id, "saved document has no indexable text");
        }

        let (mut next, removed) = if base.store().contains_document(id) {
            base.without_document(id)?
        } else {
            (IndexGeneration::clone(&base), 0)
        };
        if removed == 0 && prepared.is_empty() {
            return Ok(report_unchanged(&base));
        }

        next.generation = base.generation() + 1;
        let added = append_prepared(&mut next, prepared)?;
        let published = self.publish(next)?;
        Ok(MutationReport {
            generation: published.generation(),
            added,
            removed,
            total_fragments: published.len(),
        })
    }

    /// Hook for a deleted document.
    pub fn on_document_deleted(&self, id: DocumentId) -> Result<MutationReport> {
        self.remove_document(id)
    }

    /// Split every document and embed all fragments in bounded batches.
    fn prepare<'a>(
        &self,
        documents: &[&'a SourceDocument],
        control: &EmbedControl,
    ) -> Result<Vec<PreparedDocument<'a>>> {
        let mut split: Vec<(&'a SourceDocument, Vec<String>)> = Vec::with_capacity(documents.len());
        for &document in documents {
            let texts = self.splitter.split_document(document);
            if texts.is_empty() {
                tracing::debug!(document_id = %document.id, "skipping document without text");
                continue;
            }
            split.push((document, texts));
        }

        let normalized: Vec<String> = split
            .iter()
            .flat_map(|(_, texts)| texts.iter().map(|text| normalize_text(text)))
            .collect();
        let mut vectors = embed_texts(&self.embedder, &normalized, control)?.into_iter();

        let mut prepared = Vec::with_capacity(split.len());
        for (document, texts) in split {
            let document_vectors: Vec<Vec<f32>> = vectors.by_ref().take(texts.len()).collect();
            prepared.push(PreparedDocument {
                document,
                texts,
                vectors: document_vectors,
            });
        }
        Ok(prepared)
    }

    fn unchanged(&self) -> Result<MutationReport> {
        Ok(report_unchanged(&self.snapshot()?))
    }
}

fn append_prepared(next: &mut IndexGeneration, prepared: Vec<PreparedDocument<'_>>) -> Result<usize> {
    let mut added = 0usize;
    for PreparedDocument {
        document,
        texts,
        vectors,
    } in prepared
    {
        added += next.append(document, texts, &vectors)?;
    }
    Ok(added)
}

fn report_unchanged(base: &Arc<IndexGeneration>) -> MutationReport {
    MutationReport {
        generation: base.generation(),
        added: 0,
        removed: 0,
        total_fragments: base.len(),
    }
}
