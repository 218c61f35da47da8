//! Embedding seam: the provider trait, a deterministic hashing provider, and the batched
//! driver that validates and L2-normalizes whatever a provider returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::constants::DEFAULT_EMBED_BATCH_SIZE;
use crate::text::normalize_text;
use crate::{DociaError, Result};

/// Text embedding provider injected into [`crate::Docia`].
///
/// Vectors need not be normalized; the core normalizes them and rejects zero vectors.
pub trait Embedder: Send + Sync {
    /// Embed `texts` in order, one vector per input.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    /// Identifier persisted with the index; a different model cannot serve it.
    fn model_name(&self) -> &str;
}

/// Cooperative cancellation flag shared between a caller and a running mutation or query.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits applied while embedding a mutation's fragments.
#[derive(Debug, Clone)]
pub struct EmbedControl {
    pub batch_size: usize,
    /// Deadline per batch. Without one the provider is called on the current thread.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for EmbedControl {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            timeout: None,
            cancel: None,
        }
    }
}

impl EmbedControl {
    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(DociaError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Embed `texts` batch by batch and return unit vectors in input order.
///
/// Cancellation is checked before every batch. When a batch exceeds the deadline its
/// worker thread is abandoned and `EmbeddingTimeout` is returned.
pub fn embed_texts(
    embedder: &Arc<dyn Embedder>,
    texts: &[String],
    control: &EmbedControl,
) -> Result<Vec<Vec<f32>>> {
    let dimension = embedder.dimension();
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(control.batch_size.max(1)) {
        control.check_cancelled()?;
        let raw = match control.timeout {
            Some(timeout) => embed_with_deadline(embedder, batch.to_vec(), timeout)?,
            None => embedder.embed_batch(batch)?,
        };
        if raw.len() != batch.len() {
            return Err(DociaError::Embedding {
                reason: format!(
                    "provider returned {} vectors for {} texts",
                    raw.len(),
                    batch.len()
                ),
            });
        }
        for mut vector in raw {
            check_dimension(dimension, &vector)?;
            if !l2_normalize(&mut vector) {
                return Err(DociaError::Embedding {
                    reason: "provider returned a zero or non-finite vector".into(),
                });
            }
            vectors.push(vector);
        }
    }
    control.check_cancelled()?;
    tracing::debug!(
        texts = texts.len(),
        dimension,
        model = embedder.model_name(),
        "embedded fragment batch"
    );
    Ok(vectors)
}

/// Embed a normalized query into a unit vector.
///
/// The call honors the deadline and cancellation token of `control` like any fragment
/// batch; `batch_size` is ignored.
pub fn embed_query(
    embedder: &Arc<dyn Embedder>,
    normalized_query: &str,
    control: &EmbedControl,
) -> Result<Vec<f32>> {
    control.check_cancelled()?;
    let batch = vec![normalized_query.to_string()];
    let mut raw = match control.timeout {
        Some(timeout) => embed_with_deadline(embedder, batch, timeout)?,
        None => embedder.embed_batch(&batch)?,
    };
    control.check_cancelled()?;
    if raw.len() != 1 {
        return Err(DociaError::Embedding {
            reason: format!("provider returned {} vectors for one query", raw.len()),
        });
    }
    let mut vector = raw.swap_remove(0);
    check_dimension(embedder.dimension(), &vector)?;
    if !l2_normalize(&mut vector) {
        return Err(DociaError::InvalidQuery {
            reason: "query embedding has zero norm".into(),
        });
    }
    Ok(vector)
}

fn embed_with_deadline(
    embedder: &Arc<dyn Embedder>,
    batch: Vec<String>,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker = Arc::clone(embedder);
    let started = Instant::now();
    thread::Builder::new()
        .name("docia-embed".into())
        .spawn(move || {
            // The receiver is gone once the caller timed out.
            let _ = tx.send(worker.embed_batch(&batch));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(elapsed_ms, "embedding batch exceeded its deadline");
            Err(DociaError::EmbeddingTimeout { elapsed_ms })
        }
        Err(RecvTimeoutError::Disconnected) => Err(DociaError::Embedding {
            reason: "embedding worker exited without a result".into(),
        }),
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(DociaError::VecDimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Scale `vector` to unit length. Returns false for zero or non-finite input.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return false;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

/// Deterministic feature-hashing embedder.
///
/// Hashes normalized word tokens and their character trigrams into fixed buckets. Needs no
/// model files, so it serves as an offline fallback and as a reproducible test provider.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("hash-fnv1a-{dimension}"),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in feature.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let normalized = normalize_text(text);
        let mut counts: HashMap<String, f32> = HashMap::new();
        for token in normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            *counts.entry(token.to_string()).or_default() += 1.0;
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    *counts.entry(format!("#{trigram}")).or_default() += 0.5;
                }
            }
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, weight) in &counts {
            vector[self.bucket(feature)] += weight;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
