//! Engine configuration and per-mutation options.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunks::FragmentSplitter;
use crate::constants::{
    DEFAULT_EMBED_BATCH_SIZE, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    DEFAULT_MAX_FRAGMENT_CHARS, DEFAULT_NORMATIVE_KINDS, DEFAULT_SECTION_MARKER, DEFAULT_TOP_K,
};
use crate::embed::CancelToken;
use crate::{DociaError, Result};

fn default_true() -> bool {
    true
}

fn default_embed_batch_size() -> usize {
    DEFAULT_EMBED_BATCH_SIZE
}

/// How documents are cut into fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Character budget for generic-mode fragments.
    pub max_fragment_chars: usize,
    /// Regex whose matches open a new fragment in structured mode.
    pub section_marker: String,
    /// Document kinds (compared normalized, by substring) that use structured mode.
    pub normative_kinds: Vec<String>,
    /// Also index each document's subject and description as fragments.
    pub index_summaries: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_fragment_chars: DEFAULT_MAX_FRAGMENT_CHARS,
            section_marker: DEFAULT_SECTION_MARKER.to_string(),
            normative_kinds: DEFAULT_NORMATIVE_KINDS
                .iter()
                .map(|kind| (*kind).to_string())
                .collect(),
            index_summaries: false,
        }
    }
}

/// Defaults applied to requests built through [`crate::Docia::request`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalDefaults {
    pub top_k: usize,
    pub high_threshold: f32,
    pub low_threshold: f32,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
        }
    }
}

/// Top-level configuration of a [`crate::Docia`] handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the paired artifacts. `None` keeps the index in memory only.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default)]
    pub split: SplitOptions,
    #[serde(default)]
    pub retrieval: RetrievalDefaults,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    /// Per-batch embedding deadline. `None` waits indefinitely.
    #[serde(default)]
    pub embed_timeout_ms: Option<u64>,
    /// Reload when the artifacts change underneath this process.
    #[serde(default = "default_true")]
    pub detect_external_changes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            split: SplitOptions::default(),
            retrieval: RetrievalDefaults::default(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            embed_timeout_ms: None,
            detect_external_changes: true,
        }
    }
}

impl EngineConfig {
    /// Start a fluent builder for `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs_err::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    #[must_use]
    pub fn embed_timeout(&self) -> Option<Duration> {
        self.embed_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        let RetrievalDefaults {
            top_k,
            high_threshold,
            low_threshold,
        } = self.retrieval;
        if top_k == 0 {
            return Err(invalid("retrieval.top_k must be positive"));
        }
        for (name, value) in [("high_threshold", high_threshold), ("low_threshold", low_threshold)]
        {
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                return Err(invalid(format!(
                    "retrieval.{name} must lie in [-1, 1], got {value}"
                )));
            }
        }
        if low_threshold > high_threshold {
            return Err(invalid(format!(
                "retrieval.low_threshold ({low_threshold}) exceeds high_threshold ({high_threshold})"
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(invalid("embed_batch_size must be positive"));
        }
        if self.embed_timeout_ms == Some(0) {
            return Err(invalid("embed_timeout_ms must be positive when set"));
        }
        FragmentSplitter::new(&self.split)?;
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> DociaError {
    DociaError::InvalidConfig {
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inner.storage_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn max_fragment_chars(mut self, max: usize) -> Self {
        self.inner.split.max_fragment_chars = max;
        self
    }

    #[must_use]
    pub fn section_marker(mut self, pattern: impl Into<String>) -> Self {
        self.inner.split.section_marker = pattern.into();
        self
    }

    #[must_use]
    pub fn normative_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.split.normative_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn index_summaries(mut self, enabled: bool) -> Self {
        self.inner.split.index_summaries = enabled;
        self
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.inner.retrieval.top_k = top_k;
        self
    }

    #[must_use]
    pub fn thresholds(mut self, high: f32, low: f32) -> Self {
        self.inner.retrieval.high_threshold = high;
        self.inner.retrieval.low_threshold = low;
        self
    }

    #[must_use]
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.inner.embed_batch_size = size;
        self
    }

    #[must_use]
    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.inner.embed_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn detect_external_changes(mut self, enabled: bool) -> Self {
        self.inner.detect_external_changes = enabled;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// Per-call controls for mutations that embed text.
#[derive(Debug, Clone, Default)]
pub struct MutationOptions {
    /// Overrides `EngineConfig::embed_timeout_ms` for this call.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl MutationOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
