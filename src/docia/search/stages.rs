//! The five retrieval stages and the candidate accumulator they feed.
//!
//! Stages run in a fixed order. Each decides from the request and what has accumulated so
//! far whether it applies, then returns candidates that are merged by `(document, text)`:
//! the first stage to produce a key keeps it, except pattern boost which adds its score.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use super::patterns::pattern_matches;
use crate::constants::{
    EXACT_PHRASE_MIN_WORDS, EXACT_PHRASE_SCORE, KEYWORD_FALLBACK_MIN_CANDIDATES, KEYWORD_SCORE,
    PATTERN_BOOST_SCORE,
};
use crate::docia::acl::{AclDecision, evaluate_fragment};
use crate::docia::lifecycle::IndexGeneration;
use crate::text::{contains, normalize_text};
use crate::types::{
    AclFilterStats, Candidate, DocumentId, FragmentRecord, RetrievalStage, RetrieveRequest,
};
use crate::vec::VecSearchHit;

/// Inputs shared by every stage of one retrieval.
pub(crate) struct StageContext<'a> {
    pub generation: &'a IndexGeneration,
    pub request: &'a RetrieveRequest,
    pub normalized_query: &'a str,
    /// Nearest neighbours of the query embedding, best first.
    pub semantic_hits: &'a [VecSearchHit],
    pub acl: Cell<AclFilterStats>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        generation: &'a IndexGeneration,
        request: &'a RetrieveRequest,
        normalized_query: &'a str,
        semantic_hits: &'a [VecSearchHit],
    ) -> Self {
        Self {
            generation,
            request,
            normalized_query,
            semantic_hits,
            acl: Cell::new(AclFilterStats::default()),
        }
    }

    fn candidate(&self, record: &FragmentRecord, score: f32, origin: RetrievalStage) -> Candidate {
        Candidate {
            document_id: Some(record.document_id),
            position: Some(record.position()),
            text: record.text.clone(),
            department_code: record.department_code.clone(),
            subject: record.subject.clone(),
            score,
            literal_match: !self.normalized_query.is_empty()
                && contains(record.normalized_text(), self.normalized_query),
            origin: Some(origin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergePolicy {
    /// Insert only keys not seen yet.
    FirstWins,
    /// Add the score to an existing key, at most once per stage, or insert it.
    Additive,
}

pub(crate) trait Stage {
    fn kind(&self) -> RetrievalStage;

    fn applies(&self, ctx: &StageContext<'_>, accumulated: &CandidateSet) -> bool;

    fn run(&self, ctx: &StageContext<'_>, accumulated: &CandidateSet) -> Vec<Candidate>;

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::FirstWins
    }
}

/// Similarity at or above the high threshold, access filter applied.
pub(crate) struct SemanticStage;

impl Stage for SemanticStage {
    fn kind(&self) -> RetrievalStage {
        RetrievalStage::Semantic
    }

    fn applies(&self, _ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> bool {
        true
    }

    fn run(&self, ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> Vec<Candidate> {
        let mut stats = ctx.acl.get();
        let mut found = Vec::new();
        for hit in ctx.semantic_hits {
            if hit.score < ctx.request.high_threshold {
                continue;
            }
            let Some(record) = ctx.generation.fragment(hit.position) else {
                continue;
            };
            let decision = evaluate_fragment(record, &ctx.request.requester);
            stats.record(decision);
            if decision == AclDecision::Allow {
                found.push(ctx.candidate(record, hit.score, self.kind()));
            }
        }
        ctx.acl.set(stats);
        found
    }
}

/// Similarity at or above the low threshold when the semantic stage found nothing.
///
/// The access filter is not applied here, so restricted or unreviewed fragments can reach
/// a requester through this stage.
pub(crate) struct LowConfidenceStage;

impl Stage for LowConfidenceStage {
    fn kind(&self) -> RetrievalStage {
        RetrievalStage::LowConfidence
    }

    fn applies(&self, _ctx: &StageContext<'_>, accumulated: &CandidateSet) -> bool {
        accumulated.produced_by(RetrievalStage::Semantic) == 0
    }

    fn run(&self, ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> Vec<Candidate> {
        ctx.semantic_hits
            .iter()
            .filter(|hit| hit.score >= ctx.request.low_threshold)
            .filter_map(|hit| {
                let record = ctx.generation.fragment(hit.position)?;
                Some(ctx.candidate(record, hit.score, self.kind()))
            })
            .collect()
    }
}

/// Fragments containing the whole normalized query, for multi-word queries.
pub(crate) struct ExactPhraseStage;

impl Stage for ExactPhraseStage {
    fn kind(&self) -> RetrievalStage {
        RetrievalStage::ExactPhrase
    }

    fn applies(&self, ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> bool {
        ctx.request.query.split_whitespace().count() >= EXACT_PHRASE_MIN_WORDS
    }

    fn run(&self, ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> Vec<Candidate> {
        if ctx.normalized_query.is_empty() {
            return Vec::new();
        }
        ctx.generation
            .store()
            .iter()
            .filter(|record| contains(record.normalized_text(), ctx.normalized_query))
            .map(|record| ctx.candidate(record, EXACT_PHRASE_SCORE, self.kind()))
            .collect()
    }
}

/// Fragments containing any query word, while few candidates have accumulated.
pub(crate) struct KeywordStage;

impl Stage for KeywordStage {
    fn kind(&self) -> RetrievalStage {
        RetrievalStage::Keyword
    }

    fn applies(&self, _ctx: &StageContext<'_>, accumulated: &CandidateSet) -> bool {
        accumulated.len() < KEYWORD_FALLBACK_MIN_CANDIDATES
    }

    fn run(&self, ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> Vec<Candidate> {
        let mut words: Vec<String> = Vec::new();
        for word in ctx.request.query.split_whitespace() {
            let word = normalize_text(word);
            if !word.is_empty() && !words.contains(&word) {
                words.push(word);
            }
        }
        if words.is_empty() {
            return Vec::new();
        }
        ctx.generation
            .store()
            .iter()
            .filter(|record| {
                words
                    .iter()
                    .any(|word| contains(record.normalized_text(), word))
            })
            .map(|record| ctx.candidate(record, KEYWORD_SCORE, self.kind()))
            .collect()
    }
}

/// Fragments sharing a domain pattern (ids, plates, phones, addresses) with the query.
pub(crate) struct PatternBoostStage;

impl Stage for PatternBoostStage {
    fn kind(&self) -> RetrievalStage {
        RetrievalStage::PatternBoost
    }

    fn applies(&self, _ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> bool {
        true
    }

    fn run(&self, ctx: &StageContext<'_>, _accumulated: &CandidateSet) -> Vec<Candidate> {
        let matches = pattern_matches(ctx.normalized_query);
        if matches.is_empty() {
            return Vec::new();
        }
        tracing::debug!(
            patterns = ?matches.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
            "query matched domain patterns"
        );
        ctx.generation
            .store()
            .iter()
            .filter(|record| {
                matches
                    .iter()
                    .any(|(_, needle)| contains(record.normalized_text(), needle))
            })
            .map(|record| ctx.candidate(record, PATTERN_BOOST_SCORE, self.kind()))
            .collect()
    }

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::Additive
    }
}

/// Stages in execution order.
pub(crate) fn cascade() -> [&'static dyn Stage; 5] {
    [
        &SemanticStage,
        &LowConfidenceStage,
        &ExactPhraseStage,
        &KeywordStage,
        &PatternBoostStage,
    ]
}

type CandidateKey = (Option<DocumentId>, String);

/// Candidates keyed by `(document, text)` in insertion order.
#[derive(Debug, Default)]
pub(crate) struct CandidateSet {
    candidates: Vec<Candidate>,
    slots: HashMap<CandidateKey, usize>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn produced_by(&self, stage: RetrievalStage) -> usize {
        self.candidates
            .iter()
            .filter(|candidate| candidate.origin == Some(stage))
            .count()
    }

    /// Merge one stage's output; returns `(inserted, boosted)`.
    pub fn merge(&mut self, policy: MergePolicy, found: Vec<Candidate>) -> (usize, usize) {
        let mut inserted = 0usize;
        let mut boosted = 0usize;
        let mut touched: HashSet<CandidateKey> = HashSet::new();

        for candidate in found {
            let key = (candidate.document_id, candidate.text.clone());
            if !touched.insert(key.clone()) {
                continue;
            }
            match self.slots.get(&key) {
                Some(&slot) => {
                    if policy == MergePolicy::Additive {
                        self.candidates[slot].score += candidate.score;
                        boosted += 1;
                    }
                }
                None => {
                    self.slots.insert(key, self.candidates.len());
                    self.candidates.push(candidate);
                    inserted += 1;
                }
            }
        }
        (inserted, boosted)
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Requester, SourceDocument};

    fn generation() -> IndexGeneration {
        let mut generation = IndexGeneration::empty(1, "m", 2);
        let public = SourceDocument::new(DocumentId(1), "x").reviewed(true);
        let restricted = SourceDocument::new(DocumentId(2), "x")
            .with_department("DEP1")
            .reviewed(false);
        generation
            .append(
                &public,
                vec![
                    "Informe de tránsito en Ruta 5.".into(),
                    "Cédula 3.456.789-2 registrada.".into(),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        generation
            .append(&restricted, vec!["Informe reservado.".into()], &[vec![0.8, 0.6]])
            .unwrap();
        generation
    }

    fn hits() -> Vec<VecSearchHit> {
        vec![
            VecSearchHit {
                position: 2,
                score: 0.9,
            },
            VecSearchHit {
                position: 0,
                score: 0.5,
            },
        ]
    }

    #[test]
    fn semantic_stage_filters_and_counts() {
        let generation = generation();
        let request = RetrieveRequest::new("informe", Requester::department("DEP1"));
        let hits = hits();
        let ctx = StageContext::new(&generation, &request, "informe", &hits);
        let found = SemanticStage.run(&ctx, &CandidateSet::default());
        assert!(found.is_empty());
        assert_eq!(ctx.acl.get().denied_unreviewed, 1);
    }

    #[test]
    fn low_confidence_stage_ignores_access_rules() {
        let generation = generation();
        let request = RetrieveRequest::new("informe", Requester::department("DEP1"));
        let hits = hits();
        let ctx = StageContext::new(&generation, &request, "informe", &hits);
        let accumulated = CandidateSet::default();
        assert!(LowConfidenceStage.applies(&ctx, &accumulated));
        let found = LowConfidenceStage.run(&ctx, &accumulated);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "Informe reservado.");
    }

    #[test]
    fn exact_phrase_requires_two_words() {
        let generation = generation();
        let request = RetrieveRequest::new("Ruta 5", Requester::general());
        let ctx = StageContext::new(&generation, &request, "ruta 5", &[]);
        assert!(ExactPhraseStage.applies(&ctx, &CandidateSet::default()));
        let found = ExactPhraseStage.run(&ctx, &CandidateSet::default());
        assert_eq!(found.len(), 1);
        assert!((found[0].score - EXACT_PHRASE_SCORE).abs() < f32::EPSILON);
        assert!(found[0].literal_match);

        let single = RetrieveRequest::new("ruta", Requester::general());
        let ctx = StageContext::new(&generation, &single, "ruta", &[]);
        assert!(!ExactPhraseStage.applies(&ctx, &CandidateSet::default()));
    }

    #[test]
    fn keyword_stage_matches_any_word() {
        let generation = generation();
        let request = RetrieveRequest::new("informe ¿reservado?", Requester::general());
        let ctx = StageContext::new(&generation, &request, "informe ¿reservado?", &[]);
        let found = KeywordStage.run(&ctx, &CandidateSet::default());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| (c.score - KEYWORD_SCORE).abs() < f32::EPSILON));
    }

    #[test]
    fn pattern_boost_finds_identity_number() {
        let generation = generation();
        let request = RetrieveRequest::new("3.456.789-2", Requester::general());
        let ctx = StageContext::new(&generation, &request, "34567892", &[]);
        let found = PatternBoostStage.run(&ctx, &CandidateSet::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "Cédula 3.456.789-2 registrada.");
        assert!((found[0].score - PATTERN_BOOST_SCORE).abs() < f32::EPSILON);
    }

    #[test]
    fn first_stage_wins_and_boost_applies_once() {
        let generation = generation();
        let request = RetrieveRequest::new("q", Requester::general());
        let ctx = StageContext::new(&generation, &request, "q", &[]);
        let record = generation.fragment(0).unwrap();

        let mut set = CandidateSet::default();
        let first = ctx.candidate(record, 0.8, RetrievalStage::Semantic);
        assert_eq!(set.merge(MergePolicy::FirstWins, vec![first]), (1, 0));

        let later = ctx.candidate(record, EXACT_PHRASE_SCORE, RetrievalStage::ExactPhrase);
        assert_eq!(set.merge(MergePolicy::FirstWins, vec![later]), (0, 0));

        let boost = ctx.candidate(record, PATTERN_BOOST_SCORE, RetrievalStage::PatternBoost);
        assert_eq!(
            set.merge(MergePolicy::Additive, vec![boost.clone(), boost]),
            (0, 1)
        );

        let candidates = set.into_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, Some(RetrievalStage::Semantic));
        assert!((candidates[0].score - 3.8).abs() < 1e-5);
    }
}
