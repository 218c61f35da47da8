use std::collections::HashMap;

use crate::constants::NO_INFORMATION_TEXT;
use crate::types::{Candidate, DocumentId, RetrieveResponse};

/// Synthetic candidate returned when the cascade produced nothing.
pub(crate) fn no_information_candidate() -> Candidate {
    Candidate {
        document_id: None,
        position: None,
        text: NO_INFORMATION_TEXT.to_string(),
        department_code: None,
        subject: None,
        score: 0.0,
        literal_match: false,
        origin: None,
    }
}

/// Stable descending sort; equal scores keep stage order, then insertion order.
pub(crate) fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

impl RetrieveResponse {
    /// The best `max_per_document` candidates of each document, still in global score order.
    #[must_use]
    pub fn limit_per_document(&self, max_per_document: usize) -> Vec<Candidate> {
        let mut taken: HashMap<Option<DocumentId>, usize> = HashMap::new();
        self.candidates
            .iter()
            .filter(|candidate| {
                let count = taken.entry(candidate.document_id).or_default();
                *count += 1;
                *count <= max_per_document
            })
            .cloned()
            .collect()
    }

    /// Candidates for building an answer context: every literal match first (by score),
    /// then at most `max_unmatched` of the rest. The placeholder is never included.
    #[must_use]
    pub fn context_candidates(&self, max_unmatched: usize) -> Vec<Candidate> {
        let (mut matched, mut unmatched): (Vec<Candidate>, Vec<Candidate>) = self
            .candidates
            .iter()
            .filter(|candidate| !candidate.is_placeholder())
            .cloned()
            .partition(|candidate| candidate.literal_match);
        sort_by_score(&mut matched);
        sort_by_score(&mut unmatched);
        unmatched.truncate(max_unmatched);
        matched.extend(unmatched);
        matched
    }

    /// Candidates whose raw text contains the raw query (case-insensitive) first, each
    /// group by descending score. No normalization is applied on either side.
    #[must_use]
    pub fn rerank_by_containment(&self) -> Vec<Candidate> {
        let query = self.query.to_lowercase();
        let mut keyed: Vec<(bool, Candidate)> = self
            .candidates
            .iter()
            .map(|candidate| {
                let missing = !candidate.text.to_lowercase().contains(&query);
                (missing, candidate.clone())
            })
            .collect();
        keyed.sort_by(|(a_missing, a), (b_missing, b)| {
            a_missing
                .cmp(b_missing)
                .then_with(|| b.score.total_cmp(&a.score))
        });
        keyed.into_iter().map(|(_, candidate)| candidate).collect()
    }
}
