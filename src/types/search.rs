//! Retrieval request/response types exposed by the core library.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::acl::{AclFilterStats, Requester};
use super::common::DocumentId;
use crate::constants::{DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD, DEFAULT_TOP_K};
use crate::embed::CancelToken;

/// Stage of the retrieval cascade, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Semantic,
    LowConfidence,
    ExactPhrase,
    Keyword,
    PatternBoost,
}

impl RetrievalStage {
    pub const ALL: [Self; 5] = [
        Self::Semantic,
        Self::LowConfidence,
        Self::ExactPhrase,
        Self::Keyword,
        Self::PatternBoost,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::LowConfidence => "low_confidence",
            Self::ExactPhrase => "exact_phrase",
            Self::Keyword => "keyword",
            Self::PatternBoost => "pattern_boost",
        }
    }
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval request accepted by [`crate::Docia::retrieve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    /// Free-text query as typed by the user.
    pub query: String,
    pub requester: Requester,
    /// Nearest neighbours requested from the vector index.
    pub top_k: usize,
    /// Minimum similarity for the semantic stage.
    pub high_threshold: f32,
    /// Minimum similarity for the low-confidence fallback.
    pub low_threshold: f32,
    /// Deadline for the query embedding; falls back to the handle's configured timeout.
    #[serde(skip)]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl RetrieveRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, requester: Requester) -> Self {
        Self {
            query: query.into(),
            requester,
            top_k: DEFAULT_TOP_K,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            timeout: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, high: f32, low: f32) -> Self {
        self.high_threshold = high;
        self.low_threshold = low;
        self
    }

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

/// One ranked fragment returned to the caller.
///
/// The "no information found" placeholder is the only candidate without a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub score: f32,
    /// The normalized query occurs verbatim in this fragment's normalized text.
    pub literal_match: bool,
    /// Stage that first produced the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<RetrievalStage>,
}

impl Candidate {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.document_id.is_none()
    }
}

/// What one stage of the cascade did for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: RetrievalStage,
    pub ran: bool,
    /// New candidates inserted by this stage.
    pub produced: usize,
    /// Existing candidates whose score this stage raised.
    #[serde(default)]
    pub boosted: usize,
}

/// Ordered retrieval result with per-stage diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
    /// Query echoed back for clients.
    pub query: String,
    /// Index generation the request was served from.
    pub generation: u64,
    /// Milliseconds spent satisfying the request.
    pub elapsed_ms: u128,
    /// Candidates by descending score; never empty.
    pub candidates: Vec<Candidate>,
    pub stages: Vec<StageReport>,
    pub acl: AclFilterStats,
}

impl RetrieveResponse {
    /// True when the response only holds the placeholder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.iter().all(Candidate::is_placeholder)
    }

    #[must_use]
    pub fn stage(&self, stage: RetrievalStage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }
}
