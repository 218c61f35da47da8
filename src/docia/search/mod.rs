//! Retrieval orchestration for `Docia`.
//!
//! A request runs through a fixed cascade of stages (semantic, low-confidence fallback,
//! exact phrase, keyword fallback, pattern boost) over one immutable index generation.
//! Invariants: refuses empty queries, never returns two candidates with the same
//! `(document, text)`, never returns an empty list, and never mutates the index.

mod helpers;
mod patterns;
mod stages;

use std::collections::HashMap;
use std::time::Instant;

use helpers::{no_information_candidate, sort_by_score};
use stages::{CandidateSet, StageContext, cascade};

use crate::docia::lifecycle::Docia;
use crate::embed::{EmbedControl, embed_query};
use crate::text::normalize_text;
use crate::types::{
    Candidate, DocumentId, Requester, RetrieveRequest, RetrieveResponse, StageReport,
};
use crate::{DociaError, Result};

impl Docia {
    /// A request carrying this handle's configured retrieval defaults.
    #[must_use]
    pub fn request(&self, query: impl Into<String>, requester: Requester) -> RetrieveRequest {
        let defaults = self.config.retrieval;
        RetrieveRequest::new(query, requester)
            .with_top_k(defaults.top_k)
            .with_thresholds(defaults.high_threshold, defaults.low_threshold)
    }

    pub fn retrieve(&self, request: &RetrieveRequest) -> Result<RetrieveResponse> {
        let start_time = Instant::now();
        validate_request(request)?;
        let normalized_query = normalize_text(&request.query);
        if normalized_query.is_empty() {
            return Err(DociaError::InvalidQuery {
                reason: "query is empty after normalization".into(),
            });
        }

        let generation = self.snapshot()?;
        let control = EmbedControl {
            batch_size: 1,
            timeout: request.timeout.or_else(|| self.config.embed_timeout()),
            cancel: request.cancel.clone(),
        };
        let query_vector = embed_query(&self.embedder, &normalized_query, &control)?;
        let semantic_hits = generation.vectors().search(&query_vector, request.top_k)?;

        let ctx = StageContext::new(&generation, request, &normalized_query, &semantic_hits);
        let mut accumulated = CandidateSet::default();
        let mut stages = Vec::with_capacity(5);
        for stage in cascade() {
            let kind = stage.kind();
            if !stage.applies(&ctx, &accumulated) {
                stages.push(StageReport {
                    stage: kind,
                    ran: false,
                    produced: 0,
                    boosted: 0,
                });
                continue;
            }
            let found = stage.run(&ctx, &accumulated);
            let (produced, boosted) = accumulated.merge(stage.merge_policy(), found);
            tracing::debug!(stage = %kind, produced, boosted, "retrieval stage finished");
            stages.push(StageReport {
                stage: kind,
                ran: true,
                produced,
                boosted,
            });
        }

        let mut candidates = self.drop_vanished(accumulated.into_candidates())?;
        sort_by_score(&mut candidates);
        if candidates.is_empty() {
            candidates.push(no_information_candidate());
        }

        let elapsed_ms = start_time.elapsed().as_millis();
        tracing::debug!(
            generation = generation.generation(),
            candidates = candidates.len(),
            elapsed_ms,
            "retrieval finished"
        );
        Ok(RetrieveResponse {
            query: request.query.clone(),
            generation: generation.generation(),
            elapsed_ms,
            candidates,
            stages,
            acl: ctx.acl.get(),
        })
    }

    /// Skip candidates whose document no longer exists in the attached source.
    fn drop_vanished(&self, candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let Some(source) = &self.source else {
            return Ok(candidates);
        };
        let mut alive: HashMap<DocumentId, bool> = HashMap::new();
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Some(id) = candidate.document_id else {
                continue;
            };
            let exists = match alive.get(&id) {
                Some(exists) => *exists,
                None => {
                    let exists = source.exists(id)?;
                    alive.insert(id, exists);
                    exists
                }
            };
            if exists {
                kept.push(candidate);
            } else {
                tracing::debug!(document_id = %id, "skipping fragment of vanished document");
            }
        }
        Ok(kept)
    }
}

fn validate_request(request: &RetrieveRequest) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(DociaError::InvalidQuery {
            reason: "query is empty".into(),
        });
    }
    if request.top_k == 0 {
        return Err(DociaError::InvalidQuery {
            reason: "top_k must be positive".into(),
        });
    }
    if !request.high_threshold.is_finite() || !request.low_threshold.is_finite() {
        return Err(DociaError::InvalidQuery {
            reason: "similarity thresholds must be finite".into(),
        });
    }
    if request.timeout.is_some_and(|timeout| timeout.is_zero()) {
        return Err(DociaError::InvalidQuery {
            reason: "embedding timeout must be positive when set".into(),
        });
    }
    Ok(())
}
