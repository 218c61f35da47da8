//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use docia_core::{
    Docia, DociaError, DocumentId, Embedder, EngineConfig, HashEmbedder, MemoryDocumentSource,
    Result, SourceDocument,
};

/// Maps texts to fixed directions: the first rule whose needle occurs in the (normalized)
/// text wins, otherwise the fallback vector is used.
#[derive(Debug, Clone)]
pub struct RuleEmbedder {
    rules: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
}

impl RuleEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    pub fn rule(mut self, needle: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.fallback.len());
        self.rules.push((needle.to_string(), vector));
        self
    }
}

impl Embedder for RuleEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                self.rules
                    .iter()
                    .find(|(needle, _)| text.contains(needle.as_str()))
                    .map_or_else(|| self.fallback.clone(), |(_, vector)| vector.clone())
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }

    fn model_name(&self) -> &str {
        "rule-test"
    }
}

const HEALTHY: u8 = 0;
const FAILING: u8 = 1;
const SLOW: u8 = 2;

/// `HashEmbedder` that can be switched into failing or slow behavior at runtime while
/// keeping the same model identity.
#[derive(Debug)]
pub struct SwitchableEmbedder {
    inner: HashEmbedder,
    mode: AtomicU8,
    delay: Duration,
}

impl SwitchableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimension),
            mode: AtomicU8::new(HEALTHY),
            delay: Duration::from_millis(400),
        }
    }

    pub fn set_healthy(&self) {
        self.mode.store(HEALTHY, Ordering::SeqCst);
    }

    pub fn set_failing(&self) {
        self.mode.store(FAILING, Ordering::SeqCst);
    }

    pub fn set_slow(&self) {
        self.mode.store(SLOW, Ordering::SeqCst);
    }
}

impl Embedder for SwitchableEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.mode.load(Ordering::SeqCst) {
            FAILING => Err(DociaError::Embedding {
                reason: "provider unavailable".into(),
            }),
            SLOW => {
                std::thread::sleep(self.delay);
                self.inner.embed_batch(texts)
            }
            _ => self.inner.embed_batch(texts),
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// A small catalog of reviewed documents spread over two departments.
pub fn sample_documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(
            DocumentId(1),
            "Informe de tránsito en la ruta 5. Se relevaron tres siniestros en el mes.",
        )
        .with_department("OPS")
        .with_subject("Tránsito")
        .reviewed(true),
        SourceDocument::new(
            DocumentId(2),
            "Artículo 1 El personal tiene derecho a licencia anual. \
             Artículo 2 La licencia se solicita con treinta días de anticipación.",
        )
        .with_kind("Ley")
        .with_department("RRHH")
        .reviewed(true),
        SourceDocument::new(
            DocumentId(3),
            "Expediente del ciudadano con cédula 3.456.789-2 archivado en mesa de entrada.",
        )
        .reviewed(true),
    ]
}

pub fn memory_source(documents: Vec<SourceDocument>) -> Arc<MemoryDocumentSource> {
    Arc::new(documents.into_iter().collect())
}

/// Storage-backed handle over `dir`.
pub fn open_in(dir: &std::path::Path, embedder: Arc<dyn Embedder>) -> Docia {
    let config = EngineConfig::builder()
        .storage_dir(dir)
        .build()
        .unwrap();
    Docia::open(config, embedder).unwrap()
}
