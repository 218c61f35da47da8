//! Lifecycle of a [`Docia`] handle and the index generations it serves.
//!
//! Responsibilities:
//! - Own the injected embedder, document source and compiled splitter.
//! - Lazily load the persisted artifact pair on first use and cache it as an immutable
//!   generation shared by readers through `Arc`.
//! - Notice artifacts rewritten by another process and reload them.
//! - Publish new generations built by mutations: persist first, then swap.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::chunks::FragmentSplitter;
use crate::embed::{EmbedControl, Embedder};
use crate::io::artifacts::{read_artifacts, write_artifacts};
use crate::io::{ArtifactPaths, ArtifactStamp};
use crate::store::FragmentStore;
use crate::types::{
    DocumentId, DocumentSource, EngineConfig, FragmentRecord, MutationOptions, SourceDocument,
};
use crate::vec::VecIndex;
use crate::{DociaError, Result};

/// One immutable version of the index: vectors and fragments aligned slot for slot.
#[derive(Debug, Clone)]
pub struct IndexGeneration {
    pub(crate) generation: u64,
    pub(crate) model_name: String,
    pub(crate) vectors: VecIndex,
    pub(crate) store: FragmentStore,
}

impl IndexGeneration {
    pub(crate) fn empty(generation: u64, model_name: &str, dimension: usize) -> Self {
        Self {
            generation,
            model_name: model_name.to_string(),
            vectors: VecIndex::new(dimension),
            store: FragmentStore::new(),
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[must_use]
    pub fn vectors(&self) -> &VecIndex {
        &self.vectors
    }

    #[must_use]
    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    #[must_use]
    pub fn fragment(&self, position: usize) -> Option<&FragmentRecord> {
        self.store.get(position)
    }

    /// Fragments of `document_id`, in index order.
    pub fn fragments_of(&self, document_id: DocumentId) -> impl Iterator<Item = &FragmentRecord> {
        self.store
            .iter()
            .filter(move |record| record.document_id == document_id)
    }

    /// Append a document's fragments together with their vectors.
    pub(crate) fn append(
        &mut self,
        document: &SourceDocument,
        texts: Vec<String>,
        vectors: &[Vec<f32>],
    ) -> Result<usize> {
        if texts.len() != vectors.len() {
            return Err(DociaError::InvalidIndex {
                reason: format!(
                    "{} fragments for {} vectors in document {}",
                    texts.len(),
                    vectors.len(),
                    document.id
                ),
            });
        }
        let added = texts.len();
        self.vectors.add(vectors)?;
        self.store.append(document, texts);
        self.ensure_aligned()?;
        Ok(added)
    }

    /// Copy of this generation without `document_id`, survivors renumbered from zero and
    /// their stored vectors re-packed unchanged.
    pub(crate) fn without_document(&self, document_id: DocumentId) -> Result<(Self, usize)> {
        let mut next = Self::empty(self.generation, &self.model_name, self.dimension());
        let mut removed = 0usize;
        for record in self.store.iter() {
            if record.document_id == document_id {
                removed += 1;
                continue;
            }
            let vector =
                self.vectors
                    .vector(record.position())
                    .ok_or_else(|| DociaError::InvalidIndex {
                        reason: format!("no vector stored for fragment {}", record.position()),
                    })?;
            next.vectors.push(vector)?;
            next.store.push_renumbered(record.clone());
        }
        next.ensure_aligned()?;
        Ok((next, removed))
    }

    pub(crate) fn ensure_aligned(&self) -> Result<()> {
        if self.vectors.len() != self.store.len() {
            return Err(DociaError::InvalidIndex {
                reason: format!(
                    "{} vectors but {} fragments",
                    self.vectors.len(),
                    self.store.len()
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SnapshotState {
    current: Option<Arc<IndexGeneration>>,
    stamp: ArtifactStamp,
}

/// Shared retrieval index over document fragments.
///
/// `Docia` is `Send + Sync`; share it behind an `Arc`. Retrievals work on an immutable
/// snapshot and never block on mutations, which are serialized by an internal mutex.
pub struct Docia {
    pub(crate) config: EngineConfig,
    pub(crate) splitter: FragmentSplitter,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) source: Option<Arc<dyn DocumentSource>>,
    pub(crate) paths: Option<ArtifactPaths>,
    snapshot: RwLock<SnapshotState>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for Docia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Docia")
            .field("storage_dir", &self.config.storage_dir)
            .field("model", &self.embedder.model_name())
            .field("dimension", &self.embedder.dimension())
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

impl Docia {
    /// Open a handle over `config.storage_dir`, or an in-memory index when it is unset.
    ///
    /// Nothing is read until the first retrieval or mutation.
    pub fn open(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() == 0 {
            return Err(DociaError::InvalidConfig {
                reason: format!("embedder {} reports dimension 0", embedder.model_name()),
            });
        }
        let splitter = FragmentSplitter::new(&config.split)?;
        let paths = config
            .storage_dir
            .as_ref()
            .map(|dir| ArtifactPaths::new(dir.clone()));
        tracing::info!(
            storage_dir = ?config.storage_dir,
            model = embedder.model_name(),
            dimension = embedder.dimension(),
            "opened docia handle"
        );
        Ok(Self {
            config,
            splitter,
            embedder,
            source: None,
            paths,
            snapshot: RwLock::new(SnapshotState::default()),
            writer: Mutex::new(()),
        })
    }

    /// Memory-only handle with default configuration.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::open(EngineConfig::default(), embedder)
    }

    /// Attach the document catalog used by rebuilds, hooks and liveness checks.
    #[must_use]
    pub fn with_document_source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[must_use]
    pub fn storage_dir(&self) -> Option<&Path> {
        self.paths.as_ref().map(|paths| paths.dir.as_path())
    }

    /// The generation currently served, loading it on first use.
    ///
    /// Persisted indexes that were never built fail with `IndexNotInitialized`.
    pub fn snapshot(&self) -> Result<Arc<IndexGeneration>> {
        {
            let state = self.read_state()?;
            if let Some(current) = &state.current {
                if !self.artifacts_changed(&state) {
                    return Ok(Arc::clone(current));
                }
            }
        }

        // Load under the write lock so a slow load cannot replace a newer generation.
        let mut state = self.write_state()?;
        if let Some(current) = &state.current {
            if !self.artifacts_changed(&state) {
                return Ok(Arc::clone(current));
            }
            tracing::info!(
                generation = current.generation,
                "index artifacts changed on disk; reloading"
            );
        }
        let (generation, stamp) = self.load_generation()?;
        state.current = Some(Arc::clone(&generation));
        state.stamp = stamp;
        Ok(generation)
    }

    /// Generation number currently served.
    pub fn generation(&self) -> Result<u64> {
        Ok(self.snapshot()?.generation)
    }

    /// Number of indexed fragments.
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    /// Drop the cached generation; the next access reloads the artifacts.
    ///
    /// In-memory handles have nothing to reload from and keep their generation.
    pub fn invalidate(&self) -> Result<()> {
        if self.paths.is_none() {
            tracing::debug!("invalidate ignored for in-memory index");
            return Ok(());
        }
        let mut state = self.write_state()?;
        state.current = None;
        state.stamp = ArtifactStamp::default();
        tracing::debug!("invalidated cached index generation");
        Ok(())
    }

    /// Discard the cache and load the artifacts now.
    pub fn reload(&self) -> Result<Arc<IndexGeneration>> {
        self.invalidate()?;
        self.snapshot()
    }

    fn artifacts_changed(&self, state: &SnapshotState) -> bool {
        match &self.paths {
            Some(paths) if self.config.detect_external_changes => paths.stamp() != state.stamp,
            _ => false,
        }
    }

    fn load_generation(&self) -> Result<(Arc<IndexGeneration>, ArtifactStamp)> {
        let Some(paths) = &self.paths else {
            let empty = IndexGeneration::empty(
                0,
                self.embedder.model_name(),
                self.embedder.dimension(),
            );
            return Ok((Arc::new(empty), ArtifactStamp::default()));
        };

        let loaded = read_artifacts(paths)?;
        if loaded.model_name != self.embedder.model_name() {
            return Err(DociaError::ModelMismatch {
                expected: loaded.model_name,
                actual: self.embedder.model_name().to_string(),
            });
        }
        if loaded.vectors.dimension() != self.embedder.dimension() {
            return Err(DociaError::VecDimensionMismatch {
                expected: loaded.vectors.dimension(),
                actual: self.embedder.dimension(),
            });
        }
        let generation = IndexGeneration {
            generation: loaded.generation,
            model_name: loaded.model_name,
            vectors: loaded.vectors,
            store: loaded.store,
        };
        generation.ensure_aligned()?;
        tracing::info!(
            generation = generation.generation,
            fragments = generation.len(),
            "loaded index generation"
        );
        Ok((Arc::new(generation), loaded.stamp))
    }

    /// Persist `next` (when storage-backed) and make it the served generation.
    ///
    /// Callers hold the writer guard. On error the previous generation stays in place.
    pub(crate) fn publish(&self, next: IndexGeneration) -> Result<Arc<IndexGeneration>> {
        next.ensure_aligned()?;
        let stamp = match &self.paths {
            Some(paths) => write_artifacts(
                paths,
                next.generation,
                &next.model_name,
                &next.vectors,
                &next.store,
            )?,
            None => ArtifactStamp::default(),
        };
        let next = Arc::new(next);
        let mut state = self.write_state()?;
        state.current = Some(Arc::clone(&next));
        state.stamp = stamp;
        tracing::info!(
            generation = next.generation,
            fragments = next.len(),
            "published index generation"
        );
        Ok(next)
    }

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer.lock().map_err(|_| DociaError::Lock {
            reason: "index writer mutex poisoned".into(),
        })
    }

    pub(crate) fn document_source(&self) -> Result<&Arc<dyn DocumentSource>> {
        self.source
            .as_ref()
            .ok_or(DociaError::DocumentSourceUnavailable)
    }

    pub(crate) fn embed_control(&self, options: &MutationOptions) -> EmbedControl {
        EmbedControl {
            batch_size: self.config.embed_batch_size,
            timeout: options.timeout.or_else(|| self.config.embed_timeout()),
            cancel: options.cancel.clone(),
        }
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, SnapshotState>> {
        self.snapshot.read().map_err(|_| DociaError::Lock {
            reason: "index snapshot lock poisoned".into(),
        })
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, SnapshotState>> {
        self.snapshot.write().map_err(|_| DociaError::Lock {
            reason: "index snapshot lock poisoned".into(),
        })
    }
}
